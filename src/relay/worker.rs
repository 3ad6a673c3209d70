use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::messaging::{topic_for, MessageBroker};
use crate::metrics::Metrics;
use crate::outbox::{OutboxError, OutboxRecord, OutboxStore};

use super::backoff::{backoff_delay, with_jitter};

// ============================================================================
// Relay Worker
// ============================================================================
//
// Drains the outbox store to the broker with at-least-once delivery:
//
//   pending -> (publish attempt) -> processed
//          \-> failed(retry_count+1, next_retry_at = now + backoff)
//              -> eligible again once next_retry_at passes
//              -> dead once the retry budget is exhausted
//
// Each batch is claimed atomically so concurrent worker instances never
// process the same record, and no store lock is held across the publish
// call. The poll loop is a plain long-lived task with its own shutdown
// signal.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Identifies this worker instance in claim markers.
    pub worker_id: String,
    /// Max records fetched per poll.
    pub batch_size: usize,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Failed attempts before a record is dead-lettered.
    pub max_retry_count: u32,
    /// Exponential backoff parameters.
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// How long a claim is valid before an abandoned record becomes
    /// eligible again.
    pub claim_timeout: Duration,
    /// Bound on each publish attempt; a timeout counts as a failure.
    pub publish_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("relay-{}", Uuid::new_v4()),
            batch_size: 50,
            poll_interval: Duration::from_secs(1),
            max_retry_count: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            claim_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of one poll iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    pub dead: usize,
}

pub struct RelayWorker<S: OutboxStore, B: MessageBroker> {
    store: Arc<S>,
    broker: Arc<B>,
    config: RelayConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<S: OutboxStore, B: MessageBroker> RelayWorker<S, B> {
    pub fn new(store: Arc<S>, broker: Arc<B>, config: RelayConfig) -> Self {
        Self {
            store,
            broker,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Claim one batch and relay it. Per-record publish failures are
    /// recorded on the record, not returned; only store access errors
    /// escape.
    pub async fn drain_once(&self) -> Result<DrainStats, OutboxError> {
        let now = Utc::now();
        let batch = self
            .store
            .claim_batch(
                &self.config.worker_id,
                self.config.batch_size,
                self.config.claim_timeout,
                now,
            )
            .await?;

        let mut stats = DrainStats {
            claimed: batch.len(),
            ..DrainStats::default()
        };

        for record in batch {
            self.relay_record(record, &mut stats).await?;
        }
        Ok(stats)
    }

    async fn relay_record(
        &self,
        record: OutboxRecord,
        stats: &mut DrainStats,
    ) -> Result<(), OutboxError> {
        let topic = topic_for(&record.event_type);
        // Key by aggregate so a partitioned broker preserves per-aggregate
        // order.
        let key = record.aggregate_id.to_string();

        let attempt = match record.envelope() {
            Ok(envelope) => match serde_json::to_string(&envelope) {
                Ok(wire) => {
                    match tokio::time::timeout(
                        self.config.publish_timeout,
                        self.broker.publish(&topic, &key, &wire),
                    )
                    .await
                    {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!(
                            "publish timed out after {:?}",
                            self.config.publish_timeout
                        )),
                    }
                }
                Err(e) => Err(format!("envelope serialization failed: {e}")),
            },
            Err(e) => Err(format!("stored payload is not valid JSON: {e}")),
        };

        match attempt {
            Ok(()) => {
                let updated = self
                    .store
                    .mark_processed(record.id, &self.config.worker_id, Utc::now())
                    .await?;
                if updated {
                    stats.published += 1;
                    if let Some(m) = &self.metrics {
                        m.records_published
                            .with_label_values(&[record.event_type.as_str()])
                            .inc();
                    }
                    tracing::info!(
                        record_id = record.id,
                        event_id = %record.event_id,
                        event_type = %record.event_type,
                        topic = %topic,
                        "✅ Relayed outbox record"
                    );
                } else {
                    // Lost the claim mid-flight; the other holder owns the
                    // outcome now. At-least-once makes the extra publish
                    // harmless.
                    tracing::warn!(
                        record_id = record.id,
                        "Claim lost before mark_processed; skipping"
                    );
                }
            }
            Err(error) => {
                let retry_count = record.retry_count.saturating_add(1);
                if retry_count as u32 > self.config.max_retry_count {
                    let updated = self
                        .store
                        .mark_dead(record.id, &self.config.worker_id, retry_count, &error)
                        .await?;
                    if updated {
                        stats.dead += 1;
                        if let Some(m) = &self.metrics {
                            m.records_dead
                                .with_label_values(&[record.event_type.as_str()])
                                .inc();
                        }
                        tracing::error!(
                            record_id = record.id,
                            event_id = %record.event_id,
                            event_type = %record.event_type,
                            retry_count,
                            error = %error,
                            "💀 Retry budget exhausted; record dead-lettered"
                        );
                    }
                } else {
                    let delay = with_jitter(backoff_delay(
                        self.config.backoff_base,
                        self.config.backoff_max,
                        record.retry_count as u32,
                    ));
                    let next_retry_at = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(60));

                    let updated = self
                        .store
                        .mark_failed(
                            record.id,
                            &self.config.worker_id,
                            retry_count,
                            &error,
                            next_retry_at,
                        )
                        .await?;
                    if updated {
                        stats.failed += 1;
                        if let Some(m) = &self.metrics {
                            m.records_failed
                                .with_label_values(&[record.event_type.as_str()])
                                .inc();
                        }
                        tracing::warn!(
                            record_id = record.id,
                            event_type = %record.event_type,
                            retry_count,
                            next_retry_at = %next_retry_at,
                            error = %error,
                            "Publish failed; retry scheduled"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Poll loop. Runs until the shutdown channel fires; in-flight records
    /// of the current batch finish (or time out) before the loop exits, and
    /// anything still claimed simply becomes eligible again once the claim
    /// expires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "🔄 Relay worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.drain_once().await {
                        Ok(stats) if stats.claimed > 0 => {
                            tracing::debug!(
                                claimed = stats.claimed,
                                published = stats.published,
                                failed = stats.failed,
                                dead = stats.dead,
                                "Drained outbox batch"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Outbox drain failed");
                        }
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "Relay worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::{ActivityLogConsumer, Consumer};
    use crate::domain::category::Category;
    use crate::messaging::InMemoryBroker;
    use crate::outbox::{MemoryOutboxStore, NewOutboxRecord, OutboxStatus};
    use crate::uow::{Session, UnitOfWork};

    fn test_config(max_retry_count: u32) -> RelayConfig {
        RelayConfig {
            worker_id: "relay-test".to_string(),
            batch_size: 50,
            poll_interval: Duration::from_millis(10),
            max_retry_count,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(4),
            claim_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(1),
        }
    }

    async fn seed_record(store: &MemoryOutboxStore, event_type: &str) -> i64 {
        let mut tx = store.begin().await.unwrap();
        store
            .insert(
                &mut tx,
                NewOutboxRecord {
                    event_id: Uuid::new_v4(),
                    event_type: event_type.to_string(),
                    aggregate_id: Uuid::new_v4(),
                    payload: r#"{"name":"Docker"}"#.to_string(),
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        store.commit(tx).await.unwrap();
        store.records().await.last().unwrap().id
    }

    /// Drain until nothing is eligible anymore, waiting out the (tiny) test
    /// backoff between rounds.
    async fn drain_until_settled<B: MessageBroker>(
        worker: &RelayWorker<MemoryOutboxStore, B>,
        rounds: usize,
    ) -> DrainStats {
        let mut total = DrainStats::default();
        for _ in 0..rounds {
            let stats = worker.drain_once().await.unwrap();
            total.claimed += stats.claimed;
            total.published += stats.published;
            total.failed += stats.failed;
            total.dead += stats.dead;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        total
    }

    #[tokio::test]
    async fn happy_path_marks_the_record_processed() {
        let store = Arc::new(MemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let id = seed_record(&store, "CategoryCreated").await;

        let worker = RelayWorker::new(store.clone(), broker.clone(), test_config(5));
        let stats = worker.drain_once().await.unwrap();

        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.published, 1);

        let record = store.record(id).await.unwrap();
        assert_eq!(record.status, OutboxStatus::Processed);
        assert!(record.processed_at.is_some());

        let published = broker.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "blog.events.category-created");
    }

    #[tokio::test]
    async fn at_least_once_with_transient_broker_failures() {
        let store = Arc::new(MemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let id = seed_record(&store, "CategoryCreated").await;

        // Fail twice, then succeed: exactly one publish, retry_count == 2.
        broker.fail_next(2).await;
        let worker = RelayWorker::new(store.clone(), broker.clone(), test_config(5));

        let total = drain_until_settled(&worker, 6).await;
        assert_eq!(total.published, 1);
        assert_eq!(total.failed, 2);
        assert_eq!(total.dead, 0);

        let record = store.record(id).await.unwrap();
        assert_eq!(record.status, OutboxStatus::Processed);
        assert_eq!(record.retry_count, 2);
        assert_eq!(broker.published().await.len(), 1);
    }

    #[tokio::test]
    async fn retry_count_is_monotone_and_errors_are_recorded() {
        let store = Arc::new(MemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let id = seed_record(&store, "CategoryCreated").await;

        broker.fail_next(u32::MAX).await;
        let worker = RelayWorker::new(store.clone(), broker.clone(), test_config(5));

        let mut last_retry = 0;
        for _ in 0..3 {
            worker.drain_once().await.unwrap();
            let record = store.record(id).await.unwrap();
            assert!(record.retry_count >= last_retry);
            last_retry = record.retry_count;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let record = store.record(id).await.unwrap();
        assert_eq!(record.retry_count, 3);
        assert_eq!(
            record.last_error.as_deref(),
            Some("Broker unavailable: injected broker failure")
        );
        assert!(record.next_retry_at.is_some());
    }

    #[tokio::test]
    async fn exhausted_retry_budget_dead_letters_the_record() {
        let store = Arc::new(MemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let id = seed_record(&store, "CategoryCreated").await;

        broker.fail_next(u32::MAX).await;
        // max_retry_count = 2: attempts 1 and 2 fail, attempt 3 kills it.
        let worker = RelayWorker::new(store.clone(), broker.clone(), test_config(2));

        let total = drain_until_settled(&worker, 8).await;
        assert_eq!(total.failed, 2);
        assert_eq!(total.dead, 1);

        let record = store.record(id).await.unwrap();
        assert_eq!(record.status, OutboxStatus::Dead);
        assert_eq!(record.retry_count, 3);

        // Dead records are never claimed again.
        let stats = worker.drain_once().await.unwrap();
        assert_eq!(stats.claimed, 0);
        assert_eq!(store.dead_records(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_payload_goes_through_the_failure_path() {
        let store = Arc::new(MemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());

        let mut tx = store.begin().await.unwrap();
        store
            .insert(
                &mut tx,
                NewOutboxRecord {
                    event_id: Uuid::new_v4(),
                    event_type: "CategoryCreated".to_string(),
                    aggregate_id: Uuid::new_v4(),
                    payload: "not json at all".to_string(),
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        store.commit(tx).await.unwrap();

        let worker = RelayWorker::new(store.clone(), broker.clone(), test_config(5));
        let stats = worker.drain_once().await.unwrap();

        assert_eq!(stats.failed, 1);
        assert!(broker.published().await.is_empty());
        let record = store.record(1).await.unwrap();
        assert!(record
            .last_error
            .as_deref()
            .unwrap()
            .contains("not valid JSON"));
    }

    #[tokio::test]
    async fn two_workers_never_publish_the_same_record_twice() {
        let store = Arc::new(MemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        for _ in 0..20 {
            seed_record(&store, "CategoryCreated").await;
        }

        let mut config_a = test_config(5);
        config_a.worker_id = "relay-a".to_string();
        let mut config_b = test_config(5);
        config_b.worker_id = "relay-b".to_string();

        let worker_a = RelayWorker::new(store.clone(), broker.clone(), config_a);
        let worker_b = RelayWorker::new(store.clone(), broker.clone(), config_b);

        let (a, b) = tokio::join!(worker_a.drain_once(), worker_b.drain_once());
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(a.published + b.published, 20);
        assert_eq!(broker.published().await.len(), 20);
        for record in store.records().await {
            assert_eq!(record.status, OutboxStatus::Processed);
        }
    }

    #[tokio::test]
    async fn run_loop_drains_and_shuts_down() {
        let store = Arc::new(MemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        seed_record(&store, "CategoryCreated").await;

        let worker = Arc::new(RelayWorker::new(
            store.clone(),
            broker.clone(),
            test_config(5),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(
            store.record(1).await.unwrap().status,
            OutboxStatus::Processed
        );
    }

    #[tokio::test]
    async fn full_pipeline_from_business_operation_to_activity_log() {
        // End to end: create category "Docker", run the relay once, find
        // the activity-log entry downstream.
        let store = Arc::new(MemoryOutboxStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let activity = Arc::new(ActivityLogConsumer::new());
        broker
            .subscribe(
                "blog.events.category-created",
                activity.clone() as Arc<dyn Consumer>,
            )
            .await;

        let mut category = Category::create("Docker").unwrap();
        let category_id = category.id();
        let row = serde_json::json!({ "name": category.name() });

        let uow = UnitOfWork::new(store.as_ref());
        let mut session = Session::new();
        session.track(&mut category);
        uow.commit(&mut session, move |tx| {
            Box::pin(async move {
                tx.put_entity("category", category_id, &row)?;
                Ok(())
            })
        })
        .await
        .unwrap();

        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "CategoryCreated");
        assert_eq!(records[0].status, OutboxStatus::Pending);

        let worker = RelayWorker::new(store.clone(), broker.clone(), test_config(5));
        let stats = worker.drain_once().await.unwrap();
        assert_eq!(stats.published, 1);

        assert_eq!(
            store.record(records[0].id).await.unwrap().status,
            OutboxStatus::Processed
        );

        let entries = activity.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "category_created");
        assert_eq!(entries[0].aggregate_id, category_id);
    }
}
