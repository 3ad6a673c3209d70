// ============================================================================
// Domain Event Core
// ============================================================================
//
// Generic event infrastructure shared by every aggregate:
// - DomainEvent trait with explicit relay/local classification
// - PendingEvent: type-erased events accumulated on aggregates
// - EventEnvelope: the broker-facing wire shape
// - LocalDispatcher: synchronous in-process delivery after commit
//
// Domain-specific event types live in src/domain/.
//
// ============================================================================

mod dispatcher;
mod envelope;
mod event;

pub use dispatcher::LocalDispatcher;
pub use envelope::EventEnvelope;
pub use event::{Delivery, DomainEvent, EventSource, PendingEvent};
