use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::{NewOutboxRecord, OutboxRecord};

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown outbox status: {0}")]
    UnknownStatus(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable outbox storage, with an explicit transaction handle.
///
/// The request path uses `begin`/`insert`/`commit`: outbox rows land in the
/// same transaction as the business mutation (callers run their entity
/// writes against the same `Tx`), so either both exist or neither does.
///
/// The relay path uses `claim_batch` and the `mark_*` transitions. Claims
/// are atomic conditional updates; every `mark_*` is guarded by the claim
/// owner and returns `false` when the claim was lost, so a lost race is a
/// no-op rather than a corrupting write.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, OutboxError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), OutboxError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), OutboxError>;

    /// Stage one outbox row inside the open transaction.
    async fn insert(&self, tx: &mut Self::Tx, record: NewOutboxRecord) -> Result<(), OutboxError>;

    /// Atomically claim up to `limit` attempt-eligible records for
    /// `worker_id`, ordered by insertion. Records claimed by a live worker
    /// are skipped; expired claims are taken over.
    async fn claim_batch(
        &self,
        worker_id: &str,
        limit: usize,
        claim_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxRecord>, OutboxError>;

    /// `pending|failed -> processed`. Returns `false` if `worker_id` no
    /// longer holds the claim.
    async fn mark_processed(
        &self,
        id: i64,
        worker_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError>;

    /// `pending|failed -> failed` with the incremented retry count, the
    /// publish error, and the next backoff deadline.
    async fn mark_failed(
        &self,
        id: i64,
        worker_id: &str,
        retry_count: i32,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError>;

    /// Terminal `-> dead` once the retry budget is exhausted.
    async fn mark_dead(
        &self,
        id: i64,
        worker_id: &str,
        retry_count: i32,
        error: &str,
    ) -> Result<bool, OutboxError>;

    /// Delete processed records with `processed_at` older than `cutoff`.
    /// Returns the number of rows purged.
    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OutboxError>;

    /// Dead-lettered records for operator inspection.
    async fn dead_records(&self, limit: usize) -> Result<Vec<OutboxRecord>, OutboxError>;

    /// Records still awaiting successful publish (pending or failed).
    async fn pending_count(&self) -> Result<u64, OutboxError>;
}
