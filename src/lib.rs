//! Transactional outbox and domain-event relay for the blog platform.
//!
//! Business operations commit entity changes and their domain events in one
//! transaction ([`uow::UnitOfWork`] + [`outbox::OutboxStore`]); a background
//! [`relay::RelayWorker`] drains committed events to the message broker with
//! at-least-once delivery, retry backoff, and dead-lettering. Consumers
//! deduplicate on the envelope's `event_id`.

pub mod consumers;
pub mod domain;
pub mod events;
pub mod messaging;
pub mod metrics;
pub mod outbox;
pub mod relay;
pub mod uow;
