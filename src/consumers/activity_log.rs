use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::EventEnvelope;

use super::{snake_case, Consumer, ProcessedEvents};

/// One row in the activity log.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub event_id: Uuid,
    pub action: String,
    pub aggregate_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// Persists one activity-log row per domain event. Redelivered envelopes
/// are recognized by event_id and ignored.
#[derive(Default)]
pub struct ActivityLogConsumer {
    processed: ProcessedEvents,
    entries: Mutex<Vec<ActivityEntry>>,
}

impl ActivityLogConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl Consumer for ActivityLogConsumer {
    fn name(&self) -> &'static str {
        "activity-log"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        if !self.processed.first_delivery(envelope.event_id).await {
            tracing::debug!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                "Duplicate delivery ignored"
            );
            return Ok(());
        }

        let entry = ActivityEntry {
            event_id: envelope.event_id,
            action: snake_case(&envelope.event_type),
            aggregate_id: envelope.aggregate_id,
            occurred_at: envelope.occurred_at,
            recorded_at: Utc::now(),
        };
        tracing::info!(
            action = %entry.action,
            aggregate_id = %entry.aggregate_id,
            "Recorded activity"
        );
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
