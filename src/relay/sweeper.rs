use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::metrics::Metrics;
use crate::outbox::{OutboxError, OutboxStore};

// ============================================================================
// Retention Sweeper
// ============================================================================
//
// Deletes processed records older than the retention window so the outbox
// table stays bounded. Pending, failed, and dead records are never touched:
// pending/failed are still in flight, dead ones are the operator's evidence.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct SweeperConfig {
    /// How long processed records are kept before deletion.
    pub retention: Duration,
    /// Delay between sweeps.
    pub sweep_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

pub struct RetentionSweeper<S: OutboxStore> {
    store: Arc<S>,
    config: SweeperConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<S: OutboxStore> RetentionSweeper<S> {
    pub fn new(store: Arc<S>, config: SweeperConfig) -> Self {
        Self {
            store,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Delete processed records past the retention window; returns how many
    /// were removed.
    pub async fn sweep_once(&self) -> Result<u64, OutboxError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention)
                .unwrap_or_else(|_| chrono::Duration::days(7));

        let purged = self.store.purge_processed_before(cutoff).await?;
        if purged > 0 {
            if let Some(m) = &self.metrics {
                m.records_purged.inc_by(purged);
            }
            tracing::info!(purged, cutoff = %cutoff, "🧹 Purged processed outbox records");
        }
        Ok(purged)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            retention_secs = self.config.retention.as_secs(),
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "Retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.sweep_interval) => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Retention sweep failed");
                    }
                }
            }
        }

        tracing::info!("Retention sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::{MemoryOutboxStore, NewOutboxRecord, OutboxStatus};
    use uuid::Uuid;

    async fn seed(store: &MemoryOutboxStore, count: usize) {
        let mut tx = store.begin().await.unwrap();
        for _ in 0..count {
            store
                .insert(
                    &mut tx,
                    NewOutboxRecord {
                        event_id: Uuid::new_v4(),
                        event_type: "CategoryCreated".to_string(),
                        aggregate_id: Uuid::new_v4(),
                        payload: "{}".to_string(),
                        created_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
        store.commit(tx).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_processed_records() {
        let store = Arc::new(MemoryOutboxStore::new());
        seed(&store, 4).await;
        let now = Utc::now();

        // 1: processed, past retention. 2: processed, recent. 3: dead, old.
        // 4: pending. Only record 1 may go.
        store
            .mutate_record(1, |r| {
                r.status = OutboxStatus::Processed;
                r.processed_at = Some(now - chrono::Duration::days(8));
            })
            .await;
        store
            .mutate_record(2, |r| {
                r.status = OutboxStatus::Processed;
                r.processed_at = Some(now - chrono::Duration::hours(1));
            })
            .await;
        store
            .mutate_record(3, |r| {
                r.status = OutboxStatus::Dead;
                r.created_at = now - chrono::Duration::days(30);
            })
            .await;

        let metrics = Arc::new(Metrics::new().unwrap());
        let sweeper = RetentionSweeper::new(store.clone(), SweeperConfig::default())
            .with_metrics(metrics.clone());

        let purged = sweeper.sweep_once().await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(metrics.records_purged.get(), 1);

        let remaining: Vec<i64> = store.records().await.iter().map(|r| r.id).collect();
        assert_eq!(remaining, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn sweep_with_nothing_expired_is_a_no_op() {
        let store = Arc::new(MemoryOutboxStore::new());
        seed(&store, 2).await;

        let sweeper = RetentionSweeper::new(store.clone(), SweeperConfig::default());
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert_eq!(store.records().await.len(), 2);
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let store = Arc::new(MemoryOutboxStore::new());
        let sweeper = Arc::new(RetentionSweeper::new(
            store,
            SweeperConfig {
                retention: Duration::from_secs(1),
                sweep_interval: Duration::from_millis(5),
            },
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(25)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
