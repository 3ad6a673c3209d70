use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::EventEnvelope;

use super::{Consumer, ProcessedEvents};

/// A notification queued for delivery to subscribers.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event_id: Uuid,
    pub subject: String,
    pub aggregate_id: Uuid,
    pub queued_at: DateTime<Utc>,
}

/// Queues one subscriber notification per relayed event, deduplicating on
/// event_id like every consumer behind the broker must.
#[derive(Default)]
pub struct NotificationConsumer {
    processed: ProcessedEvents,
    queued: Mutex<Vec<Notification>>,
}

impl NotificationConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queued(&self) -> Vec<Notification> {
        self.queued.lock().await.clone()
    }
}

fn subject_for(envelope: &EventEnvelope) -> String {
    match envelope.event_type.as_str() {
        "CategoryCreated" => format!(
            "New category: {}",
            envelope.payload["data"]["name"]
                .as_str()
                .or_else(|| envelope.payload["name"].as_str())
                .unwrap_or("?")
        ),
        "PostPublished" => format!(
            "New post: {}",
            envelope.payload["data"]["title"]
                .as_str()
                .or_else(|| envelope.payload["title"].as_str())
                .unwrap_or("?")
        ),
        other => other.to_string(),
    }
}

#[async_trait]
impl Consumer for NotificationConsumer {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        if !self.processed.first_delivery(envelope.event_id).await {
            tracing::debug!(
                event_id = %envelope.event_id,
                "Duplicate delivery ignored"
            );
            return Ok(());
        }

        let notification = Notification {
            event_id: envelope.event_id,
            subject: subject_for(envelope),
            aggregate_id: envelope.aggregate_id,
            queued_at: Utc::now(),
        };
        tracing::info!(
            subject = %notification.subject,
            aggregate_id = %notification.aggregate_id,
            "Queued notification"
        );
        self.queued.lock().await.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_envelopes_queue_one_notification() {
        let consumer = NotificationConsumer::new();
        let env = EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: "CategoryCreated".to_string(),
            aggregate_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "name": "Docker" }),
        };

        consumer.handle(&env).await.unwrap();
        consumer.handle(&env).await.unwrap();

        let queued = consumer.queued().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].subject, "New category: Docker");
    }
}
