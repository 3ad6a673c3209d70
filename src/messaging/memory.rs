use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::consumers::Consumer;
use crate::events::EventEnvelope;

use super::broker::{BrokerError, MessageBroker};

/// A message accepted by the in-memory broker.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

#[derive(Default)]
struct Inner {
    published: Vec<PublishedMessage>,
    fail_next: u32,
    consumers: HashMap<String, Vec<Arc<dyn Consumer>>>,
}

/// In-memory broker for tests and the demo binary.
///
/// Delivers synchronously to subscribed consumers on publish. A consumer
/// failure fails the publish, which is exactly what pushes the record back
/// onto the relay's retry schedule; `fail_next` simulates broker outages.
#[derive(Default)]
pub struct InMemoryBroker {
    inner: Mutex<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, topic: &str, consumer: Arc<dyn Consumer>) {
        self.inner
            .lock()
            .await
            .consumers
            .entry(topic.to_string())
            .or_default()
            .push(consumer);
    }

    /// Fail the next `n` publish attempts with a transient error.
    pub async fn fail_next(&self, n: u32) {
        self.inner.lock().await.fail_next = n;
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.inner.lock().await.published.clone()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BrokerError> {
        // Consumers run outside the lock; no shared state is held across
        // their handlers.
        let consumers = {
            let mut inner = self.inner.lock().await;
            if inner.fail_next > 0 {
                inner.fail_next -= 1;
                return Err(BrokerError::Unavailable(
                    "injected broker failure".to_string(),
                ));
            }
            inner.published.push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                payload: payload.to_string(),
            });
            inner.consumers.get(topic).cloned().unwrap_or_default()
        };

        if consumers.is_empty() {
            return Ok(());
        }

        let envelope: EventEnvelope = serde_json::from_str(payload)
            .map_err(|e| BrokerError::Rejected(format!("malformed envelope: {e}")))?;

        for consumer in consumers {
            consumer
                .handle(&envelope)
                .await
                .map_err(BrokerError::Consumer)?;
        }
        Ok(())
    }
}
