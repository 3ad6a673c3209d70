use std::time::Duration;

use rand::Rng;

/// Exponential backoff: `base * 2^retry_count`, capped at `max`.
///
/// Deterministic so the schedule is testable; jitter is added separately by
/// the worker.
pub fn backoff_delay(base: Duration, max: Duration, retry_count: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry_count);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Up to 10% additive jitter, so the doubling schedule stays monotone while
/// concurrent workers spread their retries.
pub(crate) fn with_jitter(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 10;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}
