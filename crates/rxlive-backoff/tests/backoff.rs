//! Integration tests for the reconnect backoff.
//!
//! Timer tests use `start_paused` so sleeps resolve instantly and
//! `Instant::elapsed` reports exact virtual durations.

use std::time::Duration;

use rxlive_backoff::{Backoff, BackoffConfig};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

fn deterministic() -> Backoff {
    Backoff::new(BackoffConfig::default().without_jitter())
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

// =========================================================================
// BackoffConfig
// =========================================================================

#[test]
fn test_default_config() {
    let cfg = BackoffConfig::default();
    assert_eq!(cfg.base, secs(1));
    assert_eq!(cfg.cap, secs(30));
    assert_eq!(cfg.multiplier, 2.0);
    assert_eq!(cfg.jitter, 0.2);
}

#[test]
fn test_validated_raises_cap_to_base() {
    let cfg = BackoffConfig::new(secs(10), secs(2)).validated();
    assert_eq!(cfg.cap, secs(10));
}

#[test]
fn test_validated_clamps_jitter_and_multiplier() {
    let cfg = BackoffConfig {
        jitter: 3.0,
        multiplier: 0.5,
        ..Default::default()
    }
    .validated();
    assert_eq!(cfg.jitter, 1.0);
    assert_eq!(cfg.multiplier, 1.0);

    let cfg = BackoffConfig {
        jitter: f64::NAN,
        multiplier: f64::NAN,
        ..Default::default()
    }
    .validated();
    assert_eq!(cfg.jitter, 0.0);
    assert_eq!(cfg.multiplier, 1.0);
}

#[test]
fn test_nominal_delay_doubles_then_caps() {
    let cfg = BackoffConfig::default();
    let delays: Vec<_> = (0..7).map(|n| cfg.nominal_delay(n)).collect();
    assert_eq!(
        delays,
        vec![secs(1), secs(2), secs(4), secs(8), secs(16), secs(30), secs(30)]
    );
}

#[test]
fn test_nominal_delay_survives_huge_attempts() {
    let cfg = BackoffConfig::default();
    assert_eq!(cfg.nominal_delay(u32::MAX), secs(30));
}

#[test]
fn test_zero_base_means_no_delay() {
    let cfg = BackoffConfig::new(Duration::ZERO, secs(30));
    assert_eq!(cfg.nominal_delay(0), Duration::ZERO);
    assert_eq!(cfg.nominal_delay(40), Duration::ZERO);
}

// =========================================================================
// Backoff
// =========================================================================

#[test]
fn test_next_delay_advances_attempts() {
    let mut b = deterministic();
    assert_eq!(b.attempt(), 0);
    assert_eq!(b.next_delay(), secs(1));
    assert_eq!(b.next_delay(), secs(2));
    assert_eq!(b.next_delay(), secs(4));
    assert_eq!(b.attempt(), 3);
}

#[test]
fn test_reset_starts_over() {
    let mut b = deterministic();
    for _ in 0..5 {
        b.next_delay();
    }
    b.reset();
    assert_eq!(b.attempt(), 0);
    assert_eq!(b.next_delay(), secs(1));
}

#[test]
fn test_jitter_stays_within_spread_and_cap() {
    let mut b = Backoff::default();
    for attempt in 0..50u32 {
        let nominal = b.config().nominal_delay(attempt).as_secs_f64();
        let got = b.next_delay().as_secs_f64();
        assert!(got >= nominal * 0.8 - 1e-9, "attempt {attempt}: {got} < {nominal}×0.8");
        assert!(got <= nominal * 1.2 + 1e-9, "attempt {attempt}: {got} > {nominal}×1.2");
        assert!(got <= 30.0 + 1e-9, "attempt {attempt}: {got} above cap");
    }
}

#[test]
fn test_jitter_actually_varies() {
    let mut seen = std::collections::HashSet::new();
    for _ in 0..20 {
        let mut b = Backoff::default();
        seen.insert(b.next_delay().as_nanos());
    }
    assert!(seen.len() > 1, "20 jittered delays were all identical");
}

// =========================================================================
// Driving runtime timers
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_delays_drive_runtime_sleeps() {
    let mut b = deterministic();
    let start = Instant::now();

    tokio::time::sleep(b.next_delay()).await;
    assert_eq!(start.elapsed(), secs(1));

    tokio::time::sleep(b.next_delay()).await;
    assert_eq!(start.elapsed(), secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_retry_still_counts() {
    let mut b = deterministic();
    let start = Instant::now();

    tokio::select! {
        _ = tokio::time::sleep(b.next_delay()) => panic!("retry should lose the race"),
        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
    }

    assert_eq!(start.elapsed(), Duration::from_millis(100));
    assert_eq!(b.attempt(), 1);
    assert_eq!(b.next_delay(), secs(2));
}
