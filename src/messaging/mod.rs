// ============================================================================
// Messaging - Broker Seam
// ============================================================================
//
// Thin publish interface to the external broker. The relay worker only ever
// sees the `MessageBroker` trait; the Kafka adapter is feature-gated so the
// crate builds without librdkafka, and the in-memory broker backs tests and
// the demo binary.
//
// ============================================================================

mod broker;
#[cfg(feature = "kafka")]
mod kafka;
mod memory;

pub use broker::{topic_for, BrokerError, MessageBroker};
#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;
pub use memory::{InMemoryBroker, PublishedMessage};
