//! Miscellaneous helper utilities.

use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// `min(base * 2^attempt, cap)`, saturating instead of overflowing.
pub fn backoff_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.checked_mul(multiplier).unwrap_or(cap).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(3);
        let delays: Vec<u128> = (0..5)
            .map(|a| backoff_delay(base, a, cap).as_millis())
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 3000, 3000]);
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let cap = Duration::from_secs(60);
        assert_eq!(backoff_delay(Duration::from_secs(1), 200, cap), cap);
    }
}
