use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::record::{NewOutboxRecord, OutboxRecord, OutboxStatus};
use super::store::{OutboxError, OutboxStore};

// ============================================================================
// In-Memory Outbox Store
// ============================================================================
//
// Backs unit tests and the demo binary. Transactions are staged changesets
// applied atomically under one lock at commit, so the atomicity contract is
// identical to the Postgres store: rows from an uncommitted or rolled-back
// transaction are never visible.
//
// ============================================================================

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<i64, OutboxRecord>,
    entities: HashMap<(String, Uuid), serde_json::Value>,
    fail_commits: bool,
}

#[derive(Clone, Default)]
pub struct MemoryOutboxStore {
    inner: Arc<Mutex<Inner>>,
}

/// Staged writes; nothing is visible until commit.
#[derive(Default)]
pub struct MemoryTx {
    outbox: Vec<NewOutboxRecord>,
    entities: Vec<(String, Uuid, serde_json::Value)>,
}

impl MemoryTx {
    /// Stage a business-entity write in the same transaction as the outbox
    /// rows. Stands in for the entity tables a real backend would have.
    pub fn put_entity<T: Serialize>(
        &mut self,
        kind: &str,
        id: Uuid,
        value: &T,
    ) -> Result<(), OutboxError> {
        let value = serde_json::to_value(value)?;
        self.entities.push((kind.to_string(), id, value));
        Ok(())
    }
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail, for transactional-failure tests.
    pub async fn fail_commits(&self, fail: bool) {
        self.inner.lock().await.fail_commits = fail;
    }

    pub async fn entity(&self, kind: &str, id: Uuid) -> Option<serde_json::Value> {
        self.inner
            .lock()
            .await
            .entities
            .get(&(kind.to_string(), id))
            .cloned()
    }

    /// Snapshot of all records in insertion order.
    pub async fn records(&self) -> Vec<OutboxRecord> {
        self.inner.lock().await.records.values().cloned().collect()
    }

    pub async fn record(&self, id: i64) -> Option<OutboxRecord> {
        self.inner.lock().await.records.get(&id).cloned()
    }

    #[cfg(test)]
    pub(crate) async fn mutate_record<F: FnOnce(&mut OutboxRecord)>(&self, id: i64, f: F) {
        if let Some(record) = self.inner.lock().await.records.get_mut(&id) {
            f(record);
        }
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, OutboxError> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), OutboxError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_commits {
            return Err(OutboxError::Unavailable(
                "simulated commit failure".to_string(),
            ));
        }

        for (kind, id, value) in tx.entities {
            inner.entities.insert((kind, id), value);
        }
        for new in tx.outbox {
            inner.next_id += 1;
            let id = inner.next_id;
            inner.records.insert(
                id,
                OutboxRecord {
                    id,
                    event_id: new.event_id,
                    event_type: new.event_type,
                    aggregate_id: new.aggregate_id,
                    payload: new.payload,
                    created_at: new.created_at,
                    status: OutboxStatus::Pending,
                    processed_at: None,
                    retry_count: 0,
                    last_error: None,
                    next_retry_at: None,
                    claimed_by: None,
                    claimed_until: None,
                },
            );
        }
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<(), OutboxError> {
        drop(tx);
        Ok(())
    }

    async fn insert(&self, tx: &mut MemoryTx, record: NewOutboxRecord) -> Result<(), OutboxError> {
        tx.outbox.push(record);
        Ok(())
    }

    async fn claim_batch(
        &self,
        worker_id: &str,
        limit: usize,
        claim_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxRecord>, OutboxError> {
        let mut inner = self.inner.lock().await;
        let claim_until = now
            + chrono::Duration::from_std(claim_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let mut claimed = Vec::new();
        for record in inner.records.values_mut() {
            if claimed.len() >= limit {
                break;
            }
            if record.attempt_eligible(now) && record.claim_free(now) {
                record.claimed_by = Some(worker_id.to_string());
                record.claimed_until = Some(claim_until);
                claimed.push(record.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_processed(
        &self,
        id: i64,
        worker_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(&id) else {
            return Ok(false);
        };
        if record.claimed_by.as_deref() != Some(worker_id) {
            return Ok(false);
        }
        record.status = OutboxStatus::Processed;
        record.processed_at = Some(processed_at);
        record.claimed_by = None;
        record.claimed_until = None;
        Ok(true)
    }

    async fn mark_failed(
        &self,
        id: i64,
        worker_id: &str,
        retry_count: i32,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(&id) else {
            return Ok(false);
        };
        if record.claimed_by.as_deref() != Some(worker_id) {
            return Ok(false);
        }
        record.status = OutboxStatus::Failed;
        record.retry_count = retry_count;
        record.last_error = Some(error.to_string());
        record.next_retry_at = Some(next_retry_at);
        record.claimed_by = None;
        record.claimed_until = None;
        Ok(true)
    }

    async fn mark_dead(
        &self,
        id: i64,
        worker_id: &str,
        retry_count: i32,
        error: &str,
    ) -> Result<bool, OutboxError> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.records.get_mut(&id) else {
            return Ok(false);
        };
        if record.claimed_by.as_deref() != Some(worker_id) {
            return Ok(false);
        }
        record.status = OutboxStatus::Dead;
        record.retry_count = retry_count;
        record.last_error = Some(error.to_string());
        record.next_retry_at = None;
        record.claimed_by = None;
        record.claimed_until = None;
        Ok(true)
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OutboxError> {
        let mut inner = self.inner.lock().await;
        let before = inner.records.len();
        inner.records.retain(|_, r| {
            !(r.status == OutboxStatus::Processed
                && r.processed_at.map(|at| at < cutoff).unwrap_or(false))
        });
        Ok((before - inner.records.len()) as u64)
    }

    async fn dead_records(&self, limit: usize) -> Result<Vec<OutboxRecord>, OutboxError> {
        Ok(self
            .inner
            .lock()
            .await
            .records
            .values()
            .filter(|r| r.status == OutboxStatus::Dead)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn pending_count(&self) -> Result<u64, OutboxError> {
        Ok(self
            .inner
            .lock()
            .await
            .records
            .values()
            .filter(|r| matches!(r.status, OutboxStatus::Pending | OutboxStatus::Failed))
            .count() as u64)
    }
}
