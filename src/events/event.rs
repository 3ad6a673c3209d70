use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::envelope::EventEnvelope;

// ============================================================================
// Domain Event Trait + Pending Event Capture
// ============================================================================

/// How an event leaves the transaction that raised it.
///
/// `Relay` events are written to the outbox in the same transaction as the
/// business mutation and published to the broker by the relay worker.
/// `Local` events never cross the process boundary; they are handed to the
/// in-process dispatcher once the transaction has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Relay,
    Local,
}

/// Implemented by every domain event type.
///
/// Classification is an explicit method per event type rather than an
/// attribute or registry lookup, so the routing of each event is readable at
/// its definition site.
pub trait DomainEvent: Serialize + Send + Sync + 'static {
    /// Stable event type name, e.g. "CategoryCreated".
    fn event_type(&self) -> &'static str;

    /// Whether this event must be relayed to other processes.
    fn delivery(&self) -> Delivery;
}

/// Object-safe view of a domain event, so aggregates can hold heterogeneous
/// pending lists. Serialization is deferred to commit time.
trait ErasedEvent: Send + Sync {
    fn event_type(&self) -> &'static str;
    fn delivery(&self) -> Delivery;
    fn payload(&self) -> Result<serde_json::Value, serde_json::Error>;
}

impl<E: DomainEvent> ErasedEvent for E {
    fn event_type(&self) -> &'static str {
        DomainEvent::event_type(self)
    }

    fn delivery(&self) -> Delivery {
        DomainEvent::delivery(self)
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// An event raised by an aggregate and not yet committed.
///
/// Owned exclusively by the aggregate until the unit of work drains it;
/// never mutated after creation.
pub struct PendingEvent {
    aggregate_id: Uuid,
    occurred_at: DateTime<Utc>,
    event: Box<dyn ErasedEvent>,
}

impl PendingEvent {
    pub fn new<E: DomainEvent>(aggregate_id: Uuid, event: E) -> Self {
        Self {
            aggregate_id,
            occurred_at: Utc::now(),
            event: Box::new(event),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    pub fn delivery(&self) -> Delivery {
        self.event.delivery()
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Serialize into the wire envelope. A failure here aborts the whole
    /// unit-of-work commit.
    pub fn to_envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        Ok(EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: self.event.event_type().to_string(),
            aggregate_id: self.aggregate_id,
            occurred_at: self.occurred_at,
            payload: self.event.payload()?,
        })
    }
}

impl std::fmt::Debug for PendingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingEvent")
            .field("event_type", &self.event.event_type())
            .field("aggregate_id", &self.aggregate_id)
            .field("occurred_at", &self.occurred_at)
            .finish()
    }
}

/// Capture contract implemented by aggregates.
///
/// Aggregates record events and nothing else; draining and clearing is the
/// unit of work's job, and clearing only happens after a successful commit.
pub trait EventSource {
    fn pending_events(&self) -> &[PendingEvent];
    fn clear_events(&mut self);
}
