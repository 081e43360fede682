use crate::domain_model::*;
use crate::domain_port::NonceError;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("signing error: {0}")]
    Signing(String),
    #[error("secret derivation error: {0}")]
    Derivation(String),
    #[error("entropy error: {0}")]
    Entropy(String),
}

impl From<NonceError> for GenerationError {
    fn from(err: NonceError) -> Self {
        GenerationError::Entropy(err.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
}

#[async_trait::async_trait]
pub trait TokenSigner: Send + Sync {
    async fn sign_access(
        &self,
        subject: &Subject,
        issued_at: DateTime<Utc>,
    ) -> Result<(AccessToken, DateTime<Utc>), GenerationError>;

    async fn verify_access(&self, token: &AccessToken) -> Result<AccessClaims, VerifyError>;
}

/// Turns a subject plus a fresh nonce into the hex secret of a refresh value.
#[async_trait::async_trait]
pub trait SecretDeriver: Send + Sync {
    async fn derive(&self, subject: &Subject, nonce: &[u8]) -> Result<String, GenerationError>;
}

/// Builds one access/refresh pair per issuance or rotation event.
#[async_trait::async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, subject: &Subject) -> Result<CredentialPair, GenerationError>;
}
