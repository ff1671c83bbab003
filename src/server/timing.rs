//! Time sources used by the heartbeat flow: the wall clock and the
//! human-looking random pauses taken before talking to the validator.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;

/// Source of "now" in epoch milliseconds (UTC).
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Chooses how long to pause inside an inclusive millisecond window.
pub trait Jitter: Send + Sync {
    fn delay(&self, min_ms: u64, max_ms: u64) -> Duration;
}

/// Uniformly distributed pause in `[min_ms, max_ms]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn delay(&self, min_ms: u64, max_ms: u64) -> Duration {
        if min_ms >= max_ms {
            return Duration::from_millis(min_ms);
        }
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(min_ms..=max_ms))
    }
}

/// Never pauses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn delay(&self, _min_ms: u64, _max_ms: u64) -> Duration {
        Duration::ZERO
    }
}

/// Sleep for whatever the jitter source picks.
pub(crate) async fn pause(jitter: &dyn Jitter, min_ms: u64, max_ms: u64) {
    let wait = jitter.delay(min_ms, max_ms);
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_jitter_stays_inside_the_window() {
        let jitter = RandomJitter;
        for _ in 0..500 {
            let wait = jitter.delay(750, 3000).as_millis();
            assert!((750..=3000).contains(&wait), "{wait} ms out of range");
        }
    }

    #[test]
    fn degenerate_window_returns_its_lower_bound() {
        assert_eq!(RandomJitter.delay(200, 200), Duration::from_millis(200));
    }

    #[test]
    fn no_jitter_is_zero() {
        assert_eq!(NoJitter.delay(750, 3000), Duration::ZERO);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[tokio::test]
    async fn pause_without_jitter_returns_immediately() {
        let started = std::time::Instant::now();
        pause(&NoJitter, 750, 3000).await;
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
