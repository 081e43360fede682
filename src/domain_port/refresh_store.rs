use crate::domain_model::*;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(SlotId),
    /// A live record already holds this value; nothing was written.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    Rotated { slot: SlotId, generation: u64 },
    /// Never existed or already rotated away.
    NotFound,
    /// Still physically present but past `expires_at`.
    Expired,
    /// The candidate value is already live; the old value was left untouched.
    Duplicate,
}

/// A transient failure. For `check_and_rotate` the outcome is unknown: the
/// write may or may not have been applied.
#[derive(Debug, thiserror::Error)]
pub enum RefreshStoreError {
    #[error("store error: {0}")]
    Store(String),
    #[error("store operation timed out")]
    Timeout,
}

#[async_trait::async_trait]
pub trait RefreshStore: Send + Sync {
    /// Atomically create a record for `token` unless a live one already exists.
    async fn insert_new(
        &self,
        subject: &Subject,
        token: &RefreshToken,
        ttl: Duration,
    ) -> Result<InsertOutcome, RefreshStoreError>;

    /// Atomically replace the live record holding `old` with `new`, keeping its slot.
    /// Concurrent calls presenting the same `old` are linearised: at most one rotates.
    async fn check_and_rotate(
        &self,
        old: &RefreshToken,
        new: &RefreshToken,
        ttl: Duration,
    ) -> Result<RotationOutcome, RefreshStoreError>;

    /// Delete the record holding `token`. Returns whether a live record was removed.
    async fn revoke(&self, token: &RefreshToken) -> Result<bool, RefreshStoreError>;

    /// Physically remove expired records. Correctness never depends on this running.
    async fn purge_expired(&self) -> Result<u64, RefreshStoreError>;

    async fn find_live(&self, token: &RefreshToken)
    -> Result<Option<RefreshRecord>, RefreshStoreError>;
}
