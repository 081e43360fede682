/// Source of the random component mixed into every refresh secret.
pub trait NonceSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), NonceError>;
}

#[derive(Debug, thiserror::Error)]
#[error("entropy source failed: {0}")]
pub struct NonceError(pub String);
