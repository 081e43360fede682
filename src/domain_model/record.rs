use super::{RefreshToken, Subject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an outstanding refresh credential; survives rotations.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SlotId(pub uuid::Uuid);

impl SlotId {
    pub fn new() -> Self {
        SlotId(uuid::Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SlotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(SlotId)
    }
}

#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub slot: SlotId,
    pub subject: Subject,
    pub token_value: RefreshToken,
    /// Number of rotations this slot has gone through.
    pub generation: u64,
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
