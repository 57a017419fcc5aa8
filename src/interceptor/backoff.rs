//! Delay between deadlock retries.

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::InterceptorConfig;

/// Chooses how long to sleep before retrying after a deadlock.
pub trait Backoff: Send + Sync {
    /// Delay after failed attempt number `attempt` (zero-based).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Random delay of up to `attempt` milliseconds plus sub-millisecond jitter.
pub struct RandomBackoff {
    rng: Mutex<StdRng>,
    max_jitter_nanos: u32,
}

impl RandomBackoff {
    pub fn new(config: &InterceptorConfig) -> Self {
        let rng = match config.backoff_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            max_jitter_nanos: config.max_backoff_jitter_nanos,
        }
    }
}

impl Backoff for RandomBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let mut rng = self.rng.lock();
        let millis = rng.gen_range(0..=u64::from(attempt));
        let nanos = rng.gen_range(0..u64::from(self.max_jitter_nanos.max(1)));
        Duration::from_millis(millis) + Duration::from_nanos(nanos)
    }
}

/// Retries immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_bounded_by_attempt() {
        let backoff = RandomBackoff::new(&InterceptorConfig::default());
        for attempt in 0..5 {
            for _ in 0..50 {
                let delay = backoff.delay(attempt);
                assert!(delay < Duration::from_millis(u64::from(attempt) + 1));
            }
        }
    }

    #[test]
    fn test_seeded_backoff_is_deterministic() {
        let config = InterceptorConfig::default().with_backoff_seed(7);
        let a = RandomBackoff::new(&config);
        let b = RandomBackoff::new(&config);

        let first: Vec<_> = (0..5).map(|i| a.delay(i)).collect();
        let second: Vec<_> = (0..5).map(|i| b.delay(i)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_backoff() {
        assert_eq!(NoBackoff.delay(4), Duration::ZERO);
    }
}
