//! Capped exponential backoff for rxlive reconnects.
//!
//! Delays grow as `base × multiplier^attempt`, are capped at `cap`, and are
//! spread by a random ±`jitter` fraction so that many clients dropped by
//! the same server restart don't all come back in the same instant.
//!
//! # Integration
//!
//! The backoff is designed to sit inside a connection actor's
//! `tokio::select!` loop, next to the branches that can cancel a retry:
//!
//! ```ignore
//! tokio::select! {
//!     _ = tokio::time::sleep(backoff.next_delay()) => { /* try to connect again */ }
//!     _ = &mut shutdown => return,
//! }
//! ```
//!
//! The crate holds no timers itself, so dropping the sleep is all it takes
//! to cancel a retry.

use std::time::Duration;

use rand::Rng;
use tracing::{trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for [`Backoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound for any delay, jitter included.
    pub cap: Duration,
    /// Growth factor per attempt. Values below 1.0 are raised to 1.0.
    pub multiplier: f64,
    /// Random spread as a fraction of the nominal delay (0.0–1.0).
    /// 0.2 means each delay lands within ±20% of nominal.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl BackoffConfig {
    /// A config with the given base and cap and default growth/jitter.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            ..Default::default()
        }
    }

    /// Disables jitter, making delays deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Backoff::new`]. Rules:
    /// - `cap` raised to `base` if smaller.
    /// - `multiplier` raised to 1.0 if smaller (or NaN).
    /// - `jitter` clamped to `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        if self.cap < self.base {
            warn!(
                base_ms = self.base.as_millis() as u64,
                cap_ms = self.cap.as_millis() as u64,
                "backoff cap below base, raising cap"
            );
            self.cap = self.base;
        }
        if !(self.multiplier >= 1.0) {
            self.multiplier = 1.0;
        }
        self.jitter = if self.jitter.is_nan() {
            0.0
        } else {
            self.jitter.clamp(0.0, 1.0)
        };
        self
    }

    /// The delay for `attempt` (0-based) before jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.cap.as_secs_f64()))
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Stateful retry timer: each call to [`next_delay`](Self::next_delay)
/// advances one attempt; [`reset`](Self::reset) after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff from config. The config is validated first.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config: config.validated(),
            attempt: 0,
        }
    }

    /// Returns the delay for the current attempt and advances.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.config.nominal_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let delay = if self.config.jitter > 0.0 && !nominal.is_zero() {
            let spread = self.config.jitter;
            let factor = 1.0 + rand::rng().random_range(-spread..=spread);
            Duration::from_secs_f64(
                (nominal.as_secs_f64() * factor).min(self.config.cap.as_secs_f64()),
            )
        } else {
            nominal
        };

        trace!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "backoff delay"
        );
        delay
    }

    /// Starts over from the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// How many delays have been handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The validated configuration.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
