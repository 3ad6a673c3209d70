// ============================================================================
// Relay Worker
// ============================================================================
//
// Background drain of the outbox store to the message broker: bounded
// claimed batches, per-attempt publish timeout, exponential backoff with
// jitter, dead-lettering past the retry budget, and a low-frequency
// retention sweep for processed records.
//
// ============================================================================

mod backoff;
mod sweeper;
mod worker;

pub use backoff::backoff_delay;
pub use sweeper::{RetentionSweeper, SweeperConfig};
pub use worker::{DrainStats, RelayConfig, RelayWorker};
