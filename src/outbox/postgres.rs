use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::record::{NewOutboxRecord, OutboxRecord, OutboxStatus};
use super::store::{OutboxError, OutboxStore};

// ============================================================================
// Postgres Outbox Store
// ============================================================================
//
// Claiming uses FOR UPDATE SKIP LOCKED so concurrent relay workers never
// double-claim a record, and the claimed_by/claimed_until columns make a
// crashed worker's batch reclaimable after the claim deadline.
//
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blog_outbox (
    id            BIGSERIAL PRIMARY KEY,
    event_id      UUID NOT NULL,
    event_type    TEXT NOT NULL,
    aggregate_id  UUID NOT NULL,
    payload       TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    processed_at  TIMESTAMPTZ,
    retry_count   INT NOT NULL DEFAULT 0,
    last_error    TEXT,
    next_retry_at TIMESTAMPTZ,
    claimed_by    TEXT,
    claimed_until TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS blog_outbox_eligible_idx
    ON blog_outbox (status, next_retry_at, id)
    WHERE status IN ('pending', 'failed');
"#;

const RECORD_COLUMNS: &str = "id, event_id, event_type, aggregate_id, payload, created_at, \
     status, processed_at, retry_count, last_error, next_retry_at, claimed_by, claimed_until";

pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the outbox table and its eligibility index.
    pub async fn migrate(&self) -> Result<(), OutboxError> {
        let mut conn = self.pool.acquire().await?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        tracing::info!("Outbox schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_record(row: &PgRow) -> Result<OutboxRecord, OutboxError> {
    let status: String = row.try_get("status")?;
    let status =
        OutboxStatus::parse(&status).ok_or_else(|| OutboxError::UnknownStatus(status.clone()))?;

    Ok(OutboxRecord {
        id: row.try_get("id")?,
        event_id: row.try_get::<Uuid, _>("event_id")?,
        event_type: row.try_get("event_type")?,
        aggregate_id: row.try_get::<Uuid, _>("aggregate_id")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        status,
        processed_at: row.try_get("processed_at")?,
        retry_count: row.try_get("retry_count")?,
        last_error: row.try_get("last_error")?,
        next_retry_at: row.try_get("next_retry_at")?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_until: row.try_get("claimed_until")?,
    })
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, OutboxError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), OutboxError> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), OutboxError> {
        Ok(tx.rollback().await?)
    }

    async fn insert(&self, tx: &mut Self::Tx, record: NewOutboxRecord) -> Result<(), OutboxError> {
        sqlx::query(
            "INSERT INTO blog_outbox (event_id, event_type, aggregate_id, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.event_id)
        .bind(&record.event_type)
        .bind(record.aggregate_id)
        .bind(&record.payload)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn claim_batch(
        &self,
        worker_id: &str,
        limit: usize,
        claim_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxRecord>, OutboxError> {
        let claim_until = now
            + chrono::Duration::from_std(claim_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let sql = format!(
            "WITH eligible AS ( \
                 SELECT id FROM blog_outbox \
                 WHERE ((status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= $3)) \
                        OR (status = 'failed' AND next_retry_at <= $3)) \
                   AND (claimed_until IS NULL OR claimed_until <= $3) \
                 ORDER BY id \
                 LIMIT $4 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE blog_outbox o \
             SET claimed_by = $1, claimed_until = $2 \
             FROM eligible \
             WHERE o.id = eligible.id \
             RETURNING {returning}",
            // `id` would be ambiguous between o and the CTE; qualify all.
            returning = RECORD_COLUMNS
                .split(", ")
                .map(|c| format!("o.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let rows = sqlx::query(&sql)
            .bind(worker_id)
            .bind(claim_until)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        // UPDATE ... RETURNING does not guarantee order; restore insertion order.
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn mark_processed(
        &self,
        id: i64,
        worker_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError> {
        let result = sqlx::query(
            "UPDATE blog_outbox \
             SET status = 'processed', processed_at = $3, claimed_by = NULL, claimed_until = NULL \
             WHERE id = $1 AND claimed_by = $2",
        )
        .bind(id)
        .bind(worker_id)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(
        &self,
        id: i64,
        worker_id: &str,
        retry_count: i32,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError> {
        let result = sqlx::query(
            "UPDATE blog_outbox \
             SET status = 'failed', retry_count = $3, last_error = $4, next_retry_at = $5, \
                 claimed_by = NULL, claimed_until = NULL \
             WHERE id = $1 AND claimed_by = $2",
        )
        .bind(id)
        .bind(worker_id)
        .bind(retry_count)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_dead(
        &self,
        id: i64,
        worker_id: &str,
        retry_count: i32,
        error: &str,
    ) -> Result<bool, OutboxError> {
        let result = sqlx::query(
            "UPDATE blog_outbox \
             SET status = 'dead', retry_count = $3, last_error = $4, next_retry_at = NULL, \
                 claimed_by = NULL, claimed_until = NULL \
             WHERE id = $1 AND claimed_by = $2",
        )
        .bind(id)
        .bind(worker_id)
        .bind(retry_count)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OutboxError> {
        let result = sqlx::query(
            "DELETE FROM blog_outbox WHERE status = 'processed' AND processed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn dead_records(&self, limit: usize) -> Result<Vec<OutboxRecord>, OutboxError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM blog_outbox WHERE status = 'dead' ORDER BY id LIMIT $1"
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn pending_count(&self) -> Result<u64, OutboxError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM blog_outbox WHERE status IN ('pending', 'failed')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

// Database-backed behavior (claiming under real row locks, SKIP LOCKED
// contention, schema migration) is exercised against a live Postgres in
// deployment environments; the in-memory store covers the state machine in
// unit tests.
