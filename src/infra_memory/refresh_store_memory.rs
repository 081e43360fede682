use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;

/// Process-local refresh store keyed by token value.
///
/// No shard guard is ever held across a second map operation. The linearisation
/// point of a rotation is the `remove_if` on the old value.
pub struct MemoryRefreshStore {
    records: DashMap<String, RefreshRecord>,
    clock: Arc<dyn Clock>,
}

impl MemoryRefreshStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MemoryRefreshStore {
            records: DashMap::new(),
            clock,
        }
    }

    /// Records physically held, live or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, RefreshStoreError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| RefreshStoreError::Store(e.to_string()))?;
        Ok(now + ttl)
    }
}

#[async_trait::async_trait]
impl RefreshStore for MemoryRefreshStore {
    async fn insert_new(
        &self,
        subject: &Subject,
        token: &RefreshToken,
        ttl: Duration,
    ) -> Result<InsertOutcome, RefreshStoreError> {
        let now = self.clock.now();
        let record = RefreshRecord {
            slot: SlotId::new(),
            subject: subject.clone(),
            token_value: token.clone(),
            generation: 0,
            expires_at: Self::expiry(now, ttl)?,
        };
        let slot = record.slot;

        let outcome = match self.records.entry(token.as_str().to_string()) {
            Entry::Occupied(e) if e.get().is_live_at(now) => InsertOutcome::Duplicate,
            Entry::Occupied(mut e) => {
                e.insert(record);
                InsertOutcome::Inserted(slot)
            }
            Entry::Vacant(e) => {
                e.insert(record);
                InsertOutcome::Inserted(slot)
            }
        };
        Ok(outcome)
    }

    async fn check_and_rotate(
        &self,
        old: &RefreshToken,
        new: &RefreshToken,
        ttl: Duration,
    ) -> Result<RotationOutcome, RefreshStoreError> {
        let now = self.clock.now();
        let expires_at = Self::expiry(now, ttl)?;

        if self
            .records
            .get(new.as_str())
            .is_some_and(|r| r.is_live_at(now))
        {
            return Ok(RotationOutcome::Duplicate);
        }

        let Some((old_key, current)) = self
            .records
            .remove_if(old.as_str(), |_, r| r.is_live_at(now))
        else {
            // Drop an expired leftover while we are here.
            let expired = self
                .records
                .remove_if(old.as_str(), |_, r| !r.is_live_at(now))
                .is_some();
            return Ok(if expired {
                RotationOutcome::Expired
            } else {
                RotationOutcome::NotFound
            });
        };

        let rotated = RefreshRecord {
            token_value: new.clone(),
            expires_at,
            generation: current.generation + 1,
            ..current.clone()
        };
        let (slot, generation) = (rotated.slot, rotated.generation);

        let collided = match self.records.entry(new.as_str().to_string()) {
            Entry::Occupied(e) if e.get().is_live_at(now) => true,
            Entry::Occupied(mut e) => {
                e.insert(rotated);
                false
            }
            Entry::Vacant(e) => {
                e.insert(rotated);
                false
            }
        };
        if collided {
            self.records.insert(old_key, current);
            return Ok(RotationOutcome::Duplicate);
        }

        Ok(RotationOutcome::Rotated { slot, generation })
    }

    async fn revoke(&self, token: &RefreshToken) -> Result<bool, RefreshStoreError> {
        let now = self.clock.now();
        Ok(self
            .records
            .remove(token.as_str())
            .is_some_and(|(_, r)| r.is_live_at(now)))
    }

    async fn purge_expired(&self) -> Result<u64, RefreshStoreError> {
        let now = self.clock.now();
        let mut purged = 0u64;
        self.records.retain(|_, r| {
            let live = r.is_live_at(now);
            if !live {
                purged += 1;
            }
            live
        });
        Ok(purged)
    }

    async fn find_live(
        &self,
        token: &RefreshToken,
    ) -> Result<Option<RefreshRecord>, RefreshStoreError> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(token.as_str())
            .filter(|r| r.is_live_at(now))
            .map(|r| r.value().clone()))
    }
}
