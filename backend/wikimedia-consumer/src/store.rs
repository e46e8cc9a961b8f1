//! Persistence gateway: one row per consumed message, payload stored verbatim.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::debug;

use crate::error::AppResult;

/// Result of a save. `Duplicate` can only occur with content-hash
/// deduplication enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(i64),
    Duplicate,
}

/// Storage seam for the consumer loop.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save(&self, payload: &str) -> AppResult<SaveOutcome>;
}

/// SHA-256 hex digest of the payload, used as the dedup key.
pub fn content_hash(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// Postgres-backed store.
pub struct PgEventStore {
    pool: PgPool,
    dedupe_by_content_hash: bool,
}

impl PgEventStore {
    pub fn new(pool: PgPool, dedupe_by_content_hash: bool) -> Self {
        Self {
            pool,
            dedupe_by_content_hash,
        }
    }

}

#[async_trait]
impl EventStore for PgEventStore {
    async fn save(&self, payload: &str) -> AppResult<SaveOutcome> {
        if self.dedupe_by_content_hash {
            let hash = content_hash(payload);
            let id: Option<i64> = sqlx::query_scalar(
                "INSERT INTO wikimedia_events (raw_event, content_hash) VALUES ($1, $2) \
                 ON CONFLICT (content_hash) DO NOTHING RETURNING id",
            )
            .bind(payload)
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?;

            match id {
                Some(id) => Ok(SaveOutcome::Saved(id)),
                None => {
                    debug!(hash = %hash, "duplicate payload skipped");
                    Ok(SaveOutcome::Duplicate)
                }
            }
        } else {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO wikimedia_events (raw_event) VALUES ($1) RETURNING id",
            )
            .bind(payload)
            .fetch_one(&self.pool)
            .await?;
            Ok(SaveOutcome::Saved(id))
        }
    }
}
