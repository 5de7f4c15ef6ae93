//! Timing tests for the tick scheduler. These use Tokio's paused clock
//! so they are exact and instant.

use std::time::Duration;

use volley_tick::{TickConfig, TickScheduler};

#[tokio::test(start_paused = true)]
async fn test_ticks_fire_at_fixed_rate() {
    let mut scheduler = TickScheduler::new(TickConfig {
        tick_rate_hz: 30,
        initial_jitter_us: 0,
        ..TickConfig::default()
    });

    let start = tokio::time::Instant::now();
    for expected in 1..=30u64 {
        let info = scheduler.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert!((info.dt.as_secs_f64() - 1.0 / 30.0).abs() < 1e-12);
        scheduler.record_tick_end();
    }
    let elapsed = start.elapsed();
    // 30 ticks at 30 Hz is one second on the paused clock.
    assert!((elapsed.as_secs_f64() - 1.0).abs() < 0.01, "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_dt_is_fixed_even_when_late() {
    let mut scheduler = TickScheduler::new(TickConfig {
        tick_rate_hz: 20,
        initial_jitter_us: 0,
        ..TickConfig::default()
    });

    scheduler.wait_for_tick().await;
    scheduler.record_tick_end();

    // Simulate a stall of several tick periods.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let info = scheduler.wait_for_tick().await;
    assert!(info.overrun);
    assert!(info.ticks_skipped >= 2);
    assert!((info.dt.as_secs_f64() - 1.0 / 20.0).abs() < 1e-12);
    scheduler.record_tick_end();

    // After the overrun the cadence recovers.
    let before = tokio::time::Instant::now();
    let info = scheduler.wait_for_tick().await;
    assert!(!info.overrun);
    let gap = before.elapsed();
    assert!((gap.as_secs_f64() - 0.05).abs() < 0.01, "{gap:?}");
}

#[tokio::test(start_paused = true)]
async fn test_metrics_accumulate() {
    let mut scheduler = TickScheduler::new(TickConfig {
        tick_rate_hz: 30,
        initial_jitter_us: 0,
        ..TickConfig::default()
    });
    for _ in 0..5 {
        scheduler.wait_for_tick().await;
        scheduler.record_tick_end();
    }
    let metrics = scheduler.metrics();
    assert_eq!(metrics.total_ticks, 5);
    assert_eq!(scheduler.tick_count(), 5);
}
