use super::util::{is_dup_key, store_err};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS refresh_token (
    slot_id     BINARY(16)      NOT NULL PRIMARY KEY,
    subject     VARCHAR(255)    NOT NULL,
    token_value VARCHAR(512)    NOT NULL,
    generation  BIGINT UNSIGNED NOT NULL DEFAULT 0,
    expires_at  DATETIME(6)     NOT NULL,
    UNIQUE KEY uq_refresh_token_value (token_value),
    KEY ix_refresh_token_expires_at (expires_at)
)
"#;

/// Refresh store on a single InnoDB table. A rotation is one conditional UPDATE
/// on the unique `token_value`; the row lock serialises concurrent rotations and
/// the loser re-evaluates the predicate and matches nothing.
pub struct MySqlRefreshStore {
    pool: MySqlPool,
    clock: Arc<dyn Clock>,
}

impl MySqlRefreshStore {
    pub fn new(pool: MySqlPool, clock: Arc<dyn Clock>) -> Self {
        MySqlRefreshStore { pool, clock }
    }

    pub async fn ensure_schema(&self) -> Result<(), RefreshStoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    fn window(&self, ttl: Duration) -> Result<(DateTime<Utc>, DateTime<Utc>), RefreshStoreError> {
        let now = self.clock.now();
        let ttl =
            chrono::Duration::from_std(ttl).map_err(|e| RefreshStoreError::Store(e.to_string()))?;
        Ok((now, now + ttl))
    }

    #[inline]
    fn slot_from_bytes(id: &[u8]) -> Result<SlotId, RefreshStoreError> {
        Ok(SlotId(
            Uuid::from_slice(id).map_err(|e| RefreshStoreError::Store(e.to_string()))?,
        ))
    }

    fn row_to_record(token: &RefreshToken, row: MySqlRow) -> Result<RefreshRecord, RefreshStoreError> {
        let slot_bytes: Vec<u8> = row.try_get("slot_id").map_err(store_err)?;
        let subject: String = row.try_get("subject").map_err(store_err)?;
        let generation: u64 = row.try_get("generation").map_err(store_err)?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(store_err)?;

        Ok(RefreshRecord {
            slot: Self::slot_from_bytes(&slot_bytes)?,
            subject: Subject::parse(&subject)
                .map_err(|e| RefreshStoreError::Store(e.to_string()))?,
            token_value: token.clone(),
            generation,
            expires_at,
        })
    }

    async fn insert_row(
        &self,
        slot: SlotId,
        subject: &Subject,
        token: &RefreshToken,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RefreshStoreError> {
        let inserted = sqlx::query(
            r#"
INSERT INTO refresh_token (slot_id, subject, token_value, generation, expires_at)
VALUES (?, ?, ?, 0, ?)
"#,
        )
        .bind(slot.0.as_bytes().as_slice())
        .bind(subject.as_str())
        .bind(token.as_str())
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(true),
            Err(e) if is_dup_key(&e) => Ok(false),
            Err(e) => Err(store_err(e)),
        }
    }

    /// Drops an expired row holding `token`, in its own statement.
    async fn clear_expired(
        &self,
        token: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, RefreshStoreError> {
        let done = sqlx::query(
            r#"
DELETE FROM refresh_token
WHERE token_value = ? AND expires_at <= ?
"#,
        )
        .bind(token.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(done.rows_affected() > 0)
    }

    /// One rotation attempt. `None` means `new` is held by another row.
    ///
    /// The transaction only touches the row of `old` and the unique index entry of
    /// `new`; no gap lock is taken ahead of the UPDATE.
    async fn rotate_once(
        &self,
        old: &RefreshToken,
        new: &RefreshToken,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<RotationOutcome>, RefreshStoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let updated = sqlx::query(
            r#"
UPDATE refresh_token
SET token_value = ?, expires_at = ?, generation = generation + 1
WHERE token_value = ? AND expires_at > ?
"#,
        )
        .bind(new.as_str())
        .bind(expires_at)
        .bind(old.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await;

        let rows = match updated {
            Ok(done) => done.rows_affected(),
            Err(e) if is_dup_key(&e) => {
                tx.rollback().await.map_err(store_err)?;
                return Ok(None);
            }
            Err(e) => return Err(store_err(e)),
        };

        if rows == 0 {
            tx.commit().await.map_err(store_err)?;
            return Ok(Some(if self.clear_expired(old, now).await? {
                RotationOutcome::Expired
            } else {
                RotationOutcome::NotFound
            }));
        }

        let row = sqlx::query(
            r#"
SELECT slot_id, generation
FROM refresh_token
WHERE token_value = ?
"#,
        )
        .bind(new.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;
        let slot_bytes: Vec<u8> = row.try_get("slot_id").map_err(store_err)?;
        let generation: u64 = row.try_get("generation").map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        Ok(Some(RotationOutcome::Rotated {
            slot: Self::slot_from_bytes(&slot_bytes)?,
            generation,
        }))
    }
}

#[async_trait::async_trait]
impl RefreshStore for MySqlRefreshStore {
    async fn insert_new(
        &self,
        subject: &Subject,
        token: &RefreshToken,
        ttl: Duration,
    ) -> Result<InsertOutcome, RefreshStoreError> {
        let (now, expires_at) = self.window(ttl)?;
        let slot = SlotId::new();

        if self.insert_row(slot, subject, token, expires_at).await? {
            return Ok(InsertOutcome::Inserted(slot));
        }
        // The value is taken. An expired leftover is cleared once and the insert retried.
        if self.clear_expired(token, now).await?
            && self.insert_row(slot, subject, token, expires_at).await?
        {
            return Ok(InsertOutcome::Inserted(slot));
        }
        Ok(InsertOutcome::Duplicate)
    }

    async fn check_and_rotate(
        &self,
        old: &RefreshToken,
        new: &RefreshToken,
        ttl: Duration,
    ) -> Result<RotationOutcome, RefreshStoreError> {
        let (now, expires_at) = self.window(ttl)?;

        if let Some(outcome) = self.rotate_once(old, new, now, expires_at).await? {
            return Ok(outcome);
        }
        if self.clear_expired(new, now).await? {
            if let Some(outcome) = self.rotate_once(old, new, now, expires_at).await? {
                return Ok(outcome);
            }
        }
        Ok(RotationOutcome::Duplicate)
    }

    async fn revoke(&self, token: &RefreshToken) -> Result<bool, RefreshStoreError> {
        let now = self.clock.now();
        let done = sqlx::query(
            r#"
DELETE FROM refresh_token
WHERE token_value = ? AND expires_at > ?
"#,
        )
        .bind(token.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(done.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64, RefreshStoreError> {
        let now = self.clock.now();
        let done = sqlx::query(
            r#"
DELETE FROM refresh_token
WHERE expires_at <= ?
"#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(done.rows_affected())
    }

    async fn find_live(
        &self,
        token: &RefreshToken,
    ) -> Result<Option<RefreshRecord>, RefreshStoreError> {
        let now = self.clock.now();
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT slot_id, subject, generation, expires_at
FROM refresh_token
WHERE token_value = ? AND expires_at > ?
"#,
        )
        .bind(token.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row_opt.map(|row| Self::row_to_record(token, row)).transpose()
    }
}
