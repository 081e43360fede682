use super::{GenerationError, VerifyError};
use crate::domain_model::*;
use crate::domain_port::RefreshStoreError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),
    /// Unknown, already used, or expired. Deliberately not distinguished.
    #[error("refresh token not found")]
    NotFound,
    /// The store failed transiently. During a rotation the outcome is unknown: the
    /// old value may already be consumed, in which case a client retry with it
    /// reports `NotFound` even though a new value was committed.
    #[error("storage failed: {0}")]
    StorageFailed(#[from] RefreshStoreError),
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] VerifyError),
}

impl From<SubjectError> for SessionError {
    fn from(err: SubjectError) -> Self {
        SessionError::BadRequest(err.to_string())
    }
}

impl From<RefreshTokenError> for SessionError {
    fn from(err: RefreshTokenError) -> Self {
        SessionError::BadRequest(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    async fn new_session(&self, subject: &str) -> Result<CredentialPair, SessionError>;
    async fn refresh_session(&self, presented: &str) -> Result<CredentialPair, SessionError>;
    async fn revoke_session(&self, presented: &str) -> Result<(), SessionError>;
    async fn verify_access(&self, token: &AccessToken) -> Result<AccessClaims, SessionError>;
}
