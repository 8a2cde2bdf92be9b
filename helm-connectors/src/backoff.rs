//! Exponential backoff for the websocket reconnect loop.
//!
//! Jittered exponential delay with an optional retry cap, trimmed to what
//! the order-update stream needs: it never runs out of retries in
//! steady-state operation, it just needs a delay sequence that backs off
//! under a flaky connection and resets once a connection holds.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters. The defaults mirror `xbot/connector/backpack_ws.py`'s
/// flat 3s reconnect delay at the low end, but add jitter and a ceiling so a
/// venue outage doesn't turn into a reconnect storm.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: Option<usize>,
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: None,
            jitter_factor: 0.2,
        }
    }
}

/// Stateful cursor over a `BackoffConfig`: each `next_delay()` call advances
/// the current delay and returns `None` once `max_retries` is exceeded.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_attempt: usize,
    current_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_attempt: 0,
            current_delay,
        }
    }

    /// Returns the delay to wait before the next reconnect attempt, or
    /// `None` if `max_retries` has been exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_retries {
            if self.current_attempt >= max {
                return None;
            }
        }
        self.current_attempt += 1;
        let delay = self.jittered(self.current_delay);
        let scaled = self.current_delay.mul_f64(self.config.multiplier);
        self.current_delay = scaled.min(self.config.max_delay);
        Some(delay)
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(-self.config.jitter_factor..=self.config.jitter_factor);
        let factor = (1.0 + jitter).max(0.0);
        base.mul_f64(factor)
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.current_delay = self.config.initial_delay;
    }

    pub fn attempt_number(&self) -> usize {
        self.current_attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_up_to_max() {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig {
            jitter_factor: 0.0,
            ..BackoffConfig::default()
        });
        let first = backoff.next_delay().unwrap();
        let second = backoff.next_delay().unwrap();
        let third = backoff.next_delay().unwrap();
        assert!(second >= first);
        assert!(third >= second);
        assert!(third <= Duration::from_secs(30));
    }

    #[test]
    fn reset_returns_to_initial_delay() {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig {
            jitter_factor: 0.0,
            ..BackoffConfig::default()
        });
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt_number(), 0);
        let delay = backoff.next_delay().unwrap();
        assert_eq!(delay, Duration::from_millis(500));
    }

    #[test]
    fn max_retries_exhausts() {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig {
            max_retries: Some(2),
            jitter_factor: 0.0,
            ..BackoffConfig::default()
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
    }
}
