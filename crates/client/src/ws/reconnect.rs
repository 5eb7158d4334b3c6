//! Exponential backoff for automatic reconnects.

use std::time::Duration;

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        // `as` saturates, so overflowing products land on the cap
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }
}

/// A scheduled reconnect: which attempt it is (1-based) and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPlan {
    pub attempt: u32,
    pub delay: Duration,
}

/// Attempt bookkeeping between successful opens.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Attempts scheduled since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts
    }

    /// Plan the next attempt, or `None` once `max_attempts` is reached.
    pub fn next_attempt(&mut self) -> Option<ReconnectPlan> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.config.delay_for_attempt(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        Some(ReconnectPlan {
            attempt: self.attempts,
            delay,
        })
    }

    /// Called on every successful open
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_monotonically_up_to_the_cap() {
        let config = ReconnectConfig::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = config.delay_for_attempt(attempt);
            assert!(delay >= previous, "attempt {} shrank the delay", attempt);
            assert!(delay <= Duration::from_millis(config.max_delay_ms));
            previous = delay;
        }
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_millis(30000));
    }

    #[test]
    fn default_schedule() {
        let config = ReconnectConfig::default();
        let delays: Vec<u128> = (0..6).map(|a| config.delay_for_attempt(a).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000]);
    }

    #[test]
    fn policy_stops_after_max_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let plans: Vec<ReconnectPlan> = std::iter::from_fn(|| policy.next_attempt()).collect();
        assert_eq!(plans.len(), 5);
        assert_eq!(plans[0].attempt, 1);
        assert_eq!(plans[0].delay, Duration::from_millis(1000));
        assert_eq!(plans[4].attempt, 5);
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_attempt(), None);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert!(policy.next_attempt().is_some());
    }

    #[test]
    fn zero_max_attempts_retries_forever() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        });
        for _ in 0..100 {
            assert!(policy.next_attempt().is_some());
        }
    }
}
