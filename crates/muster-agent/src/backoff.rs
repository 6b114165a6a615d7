//! Exponential backoff for reconnection

use std::time::Duration;

use muster_core::config::BackoffConfig;

/// Exponential backoff with jitter for reconnection attempts
pub struct ExponentialBackoff {
    /// Current delay
    current: Duration,
    /// Initial delay, restored on reset
    initial: Duration,
    /// Maximum delay
    max: Duration,
    /// Multiplier
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Create a new backoff with custom parameters
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            current: initial,
            initial,
            max,
            multiplier,
            jitter,
        }
    }

    /// Get the next delay and advance the backoff.
    ///
    /// Jitter is additive on top of the base delay, up to `jitter` times
    /// the base, so simultaneous reconnects spread out instead of hammering
    /// the server in lockstep.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = base.mul_f64(self.multiplier).min(self.max);
        base + base.mul_f64(self.jitter * rand::random::<f64>())
    }

    /// Reset the backoff to its initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
