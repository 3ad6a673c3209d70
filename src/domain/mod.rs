// ============================================================================
// Domain Layer - Blog Aggregates
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Events
// - Errors
// - Aggregate implementation
//
// Aggregates record pending domain events during a business operation; they
// never publish anything themselves. The unit of work drains the pending
// lists at commit time.
//
// ============================================================================

pub mod category;
pub mod post;
