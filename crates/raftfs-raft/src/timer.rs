//! Soft timers driven by measured wall-clock deltas

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raftfs_core::{ProcessId, RaftConfig};
use std::time::Duration;

/// Countdown decremented by the elapsed time of each loop iteration
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SoftTimer {
    remaining: Duration,
}

impl SoftTimer {
    pub fn new(timeout: Duration) -> Self {
        Self { remaining: timeout }
    }

    pub fn advance(&mut self, delta: Duration) {
        self.remaining = self.remaining.saturating_sub(delta);
    }

    pub fn expired(&self) -> bool {
        self.remaining.is_zero()
    }

    pub fn reset(&mut self, timeout: Duration) {
        self.remaining = timeout;
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }
}

/// Per-server generator of randomized election timeouts
#[derive(Debug)]
pub struct ElectionTimeout {
    rng: StdRng,
    min: Duration,
    max: Duration,
}

impl ElectionTimeout {
    /// Seeded from `config.rng_seed` mixed with the server id, or from entropy
    pub fn new(config: &RaftConfig, id: ProcessId) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            min: config.election_timeout_min,
            max: config.election_timeout_max,
        }
    }

    /// Draw a timeout uniformly in `[min, max]`
    pub fn next(&mut self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(self.rng.gen_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_timer() {
        let mut timer = SoftTimer::new(Duration::from_millis(30));
        timer.advance(Duration::from_millis(20));
        assert!(!timer.expired());
        timer.advance(Duration::from_millis(20));
        assert!(timer.expired());
        assert_eq!(timer.remaining(), Duration::ZERO);

        timer.reset(Duration::from_millis(5));
        assert!(!timer.expired());
    }

    #[test]
    fn test_election_timeout_range_and_seed() {
        let config = RaftConfig {
            rng_seed: Some(42),
            ..RaftConfig::default()
        };
        let mut a = ElectionTimeout::new(&config, ProcessId::new(1));
        let mut b = ElectionTimeout::new(&config, ProcessId::new(1));
        for _ in 0..100 {
            let timeout = a.next();
            assert!(timeout >= config.election_timeout_min);
            assert!(timeout <= config.election_timeout_max);
            assert_eq!(timeout, b.next());
        }
    }
}
