// ============================================================================
// Transactional Outbox
// ============================================================================
//
// Durable record of relay-required events, inserted in the same transaction
// as the business mutation they describe and drained asynchronously by the
// relay worker. The request path only ever inserts; status transitions are
// the relay worker's alone.
//
// ============================================================================

mod memory;
mod postgres;
mod record;
mod store;

pub use memory::{MemoryOutboxStore, MemoryTx};
pub use postgres::PgOutboxStore;
pub use record::{NewOutboxRecord, OutboxRecord, OutboxStatus};
pub use store::{OutboxError, OutboxStore};
