use crate::domain_model::*;
use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const REFRESH_INSERT: &str = include_str!("refresh_insert.lua");
const REFRESH_ROTATE: &str = include_str!("refresh_rotate.lua");
const REFRESH_REVOKE: &str = include_str!("refresh_revoke.lua");

/// One hash per live token value: `slot`, `sub`, `gen`, `exp` (unix ms).
/// Redis drops the key itself at `exp`; the scripts also compare `exp` with the
/// caller's clock so an unexpired-but-stale key is never rotated.
pub struct RedisRefreshStore {
    conn: ConnectionManager,
    prefix: String,
    clock: Arc<dyn Clock>,
    insert: Script,
    rotate: Script,
    revoke_script: Script,
}

impl RedisRefreshStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        RedisRefreshStore {
            conn,
            prefix: prefix.into(),
            clock,
            insert: Script::new(REFRESH_INSERT),
            rotate: Script::new(REFRESH_ROTATE),
            revoke_script: Script::new(REFRESH_REVOKE),
        }
    }

    fn key(&self, token: &RefreshToken) -> String {
        format!("{}:{}", self.prefix, token.as_str())
    }

    fn window(&self, ttl: Duration) -> (i64, i64) {
        expiry_window(self.clock.now().timestamp_millis(), ttl)
    }

    fn store_err(e: redis::RedisError) -> RefreshStoreError {
        if e.is_timeout() {
            RefreshStoreError::Timeout
        } else {
            RefreshStoreError::Store(e.to_string())
        }
    }

    fn parse_record(
        token: &RefreshToken,
        fields: &HashMap<String, String>,
    ) -> Result<RefreshRecord, RefreshStoreError> {
        let field = |name: &str| {
            fields
                .get(name)
                .ok_or_else(|| RefreshStoreError::Store(format!("record is missing `{name}`")))
        };
        let corrupt = |e: &dyn std::fmt::Display| RefreshStoreError::Store(e.to_string());

        let slot = field("slot")?.parse::<SlotId>().map_err(|e| corrupt(&e))?;
        let subject = Subject::parse(field("sub")?).map_err(|e| corrupt(&e))?;
        let generation = field("gen")?.parse::<u64>().map_err(|e| corrupt(&e))?;
        let exp_ms = field("exp")?.parse::<i64>().map_err(|e| corrupt(&e))?;
        let expires_at = chrono::DateTime::from_timestamp_millis(exp_ms)
            .ok_or_else(|| RefreshStoreError::Store("expiry out of range".to_string()))?;

        Ok(RefreshRecord {
            slot,
            subject,
            token_value: token.clone(),
            generation,
            expires_at,
        })
    }
}

fn expiry_window(now_ms: i64, ttl: Duration) -> (i64, i64) {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    (now_ms, now_ms.saturating_add(ttl_ms))
}

/// Maps the reply of `refresh_rotate.lua`.
fn rotation_outcome(
    status: i64,
    generation: i64,
    slot: &str,
) -> Result<RotationOutcome, RefreshStoreError> {
    match status {
        1 => {
            let slot = slot
                .parse::<SlotId>()
                .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
            let generation = u64::try_from(generation)
                .map_err(|e| RefreshStoreError::Store(e.to_string()))?;
            Ok(RotationOutcome::Rotated { slot, generation })
        }
        0 => Ok(RotationOutcome::NotFound),
        -1 => Ok(RotationOutcome::Expired),
        -2 => Ok(RotationOutcome::Duplicate),
        other => Err(RefreshStoreError::Store(format!(
            "unknown rotate script status {other}"
        ))),
    }
}

#[async_trait::async_trait]
impl RefreshStore for RedisRefreshStore {
    async fn insert_new(
        &self,
        subject: &Subject,
        token: &RefreshToken,
        ttl: Duration,
    ) -> Result<InsertOutcome, RefreshStoreError> {
        let key = self.key(token);
        let slot = SlotId::new();
        let (now_ms, exp_ms) = self.window(ttl);
        let mut conn = self.conn.clone();

        let inserted: i64 = self
            .insert
            .key(&key)
            .arg(slot.to_string())
            .arg(subject.as_str())
            .arg(now_ms)
            .arg(exp_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::store_err)?;

        Ok(match inserted {
            1 => InsertOutcome::Inserted(slot),
            _ => InsertOutcome::Duplicate,
        })
    }

    async fn check_and_rotate(
        &self,
        old: &RefreshToken,
        new: &RefreshToken,
        ttl: Duration,
    ) -> Result<RotationOutcome, RefreshStoreError> {
        let (now_ms, exp_ms) = self.window(ttl);
        let mut conn = self.conn.clone();

        let (status, generation, slot): (i64, i64, String) = self
            .rotate
            .key(self.key(old))
            .key(self.key(new))
            .arg(now_ms)
            .arg(exp_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::store_err)?;

        rotation_outcome(status, generation, &slot)
    }

    async fn revoke(&self, token: &RefreshToken) -> Result<bool, RefreshStoreError> {
        let now_ms = self.clock.now().timestamp_millis();
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .revoke_script
            .key(self.key(token))
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::store_err)?;
        Ok(removed == 1)
    }

    async fn purge_expired(&self) -> Result<u64, RefreshStoreError> {
        // Keys carry PEXPIREAT; Redis evicts them itself.
        Ok(0)
    }

    async fn find_live(
        &self,
        token: &RefreshToken,
    ) -> Result<Option<RefreshRecord>, RefreshStoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.key(token))
            .await
            .map_err(Self::store_err)?;
        if fields.is_empty() {
            return Ok(None);
        }
        let record = Self::parse_record(token, &fields)?;
        Ok(record.is_live_at(self.clock.now()).then_some(record))
    }
}
