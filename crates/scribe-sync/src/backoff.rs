//! Exponential backoff with jitter, shared by every sync service (spec
//! §4.6): `reconnectBackoff * 2^(attempt-1)`, capped at
//! `max_attempts` (default 10). A successful reconnect resets the
//! attempt counter (spec §8 invariant 6).

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_SECS: u64 = 1;
const MAX_DELAY_SECS: u64 = 300;
const JITTER_FRACTION: f64 = 0.10;

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_secs: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_secs: DEFAULT_BASE_SECS, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

impl ReconnectPolicy {
    pub fn new(base_secs: u64, max_attempts: u32) -> Self {
        Self { base_secs, max_attempts }
    }

    /// Whether `attempt` (1-indexed) is still within budget.
    pub fn within_budget(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay to wait before `attempt` (1-indexed), including ±10% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20); // guard against overflow on u64 shift
        let base = self.base_secs.saturating_mul(1u64 << exp).min(MAX_DELAY_SECS);
        let jitter = jitter_secs(base);
        Duration::from_secs(base + jitter)
    }
}

fn jitter_secs(base_secs: u64) -> u64 {
    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max_jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_up_to_cap() {
        let policy = ReconnectPolicy::new(1, 10);
        let d1 = policy.delay_for_attempt(1).as_secs();
        let d2 = policy.delay_for_attempt(2).as_secs();
        let d3 = policy.delay_for_attempt(3).as_secs();
        assert!((1..=1).contains(&d1) || d1 == 1); // base * 2^0 + jitter(0) == 1
        assert!(d2 >= 2 && d2 <= 3);
        assert!(d3 >= 4 && d3 <= 5);
    }

    #[test]
    fn within_budget_respects_max_attempts() {
        let policy = ReconnectPolicy::new(1, 3);
        assert!(policy.within_budget(3));
        assert!(!policy.within_budget(4));
    }
}
