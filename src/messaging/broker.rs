use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Publish rejected: {0}")]
    Rejected(String),

    #[error("Consumer failed: {0}")]
    Consumer(#[source] anyhow::Error),
}

/// Publish side of the broker. Consume/redelivery is the broker's own
/// machinery and is not modeled here.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BrokerError>;
}

/// Stable topic naming convention: `blog.events.<kebab-case event type>`,
/// e.g. "CategoryCreated" -> "blog.events.category-created".
pub fn topic_for(event_type: &str) -> String {
    let mut topic = String::from("blog.events.");
    for (i, c) in event_type.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                topic.push('-');
            }
            topic.extend(c.to_lowercase());
        } else {
            topic.push(c);
        }
    }
    topic
}
