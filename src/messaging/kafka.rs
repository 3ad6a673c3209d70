use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
};

use super::broker::{BrokerError, MessageBroker};

pub struct KafkaBroker {
    producer: FutureProducer,
}

impl KafkaBroker {
    pub fn new(brokers: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| BrokerError::Unavailable(format!("producer creation failed: {e}")))?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl MessageBroker for KafkaBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BrokerError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        self.producer
            .send(
                record,
                rdkafka::util::Timeout::After(std::time::Duration::from_secs(5)),
            )
            .await
            .map_err(|(e, _)| BrokerError::Unavailable(format!("kafka send error: {e}")))?;

        tracing::debug!(
            topic = %topic,
            key = %key,
            "Published to Kafka"
        );
        Ok(())
    }
}
