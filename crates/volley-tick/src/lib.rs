//! Fixed-timestep scheduler for the global simulation loop.
//!
//! One scheduler drives every room: the driver task awaits
//! [`TickScheduler::wait_for_tick`], advances all playing rooms by the
//! fixed `dt`, then calls [`TickScheduler::record_tick_end`] so budget
//! utilization and timing metrics stay honest. Overruns skip ahead
//! rather than catching up — a death spiral of compensating ticks is
//! worse for a shooter than a dropped frame.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// Lowest supported tick rate.
pub const MIN_TICK_RATE_HZ: u32 = 10;
/// Highest supported tick rate.
pub const MAX_TICK_RATE_HZ: u32 = 60;
/// Default tick rate.
pub const DEFAULT_TICK_RATE_HZ: u32 = 30;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz, clamped to `[10, 60]`.
    pub tick_rate_hz: u32,
    /// Fraction of the tick budget that triggers a warning log.
    pub budget_warn_threshold: f64,
    /// Random jitter (0–max µs) added before the first tick so several
    /// processes started together don't thunder in phase.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            budget_warn_threshold: 0.8,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self { tick_rate_hz, ..Default::default() }
    }

    /// Clamps out-of-range values so the scheduler is always safe to
    /// run.
    pub fn validated(mut self) -> Self {
        if !(MIN_TICK_RATE_HZ..=MAX_TICK_RATE_HZ).contains(&self.tick_rate_hz) {
            warn!(
                rate = self.tick_rate_hz,
                min = MIN_TICK_RATE_HZ,
                max = MAX_TICK_RATE_HZ,
                "tick rate out of range, clamping"
            );
            self.tick_rate_hz = self
                .tick_rate_hz
                .clamp(MIN_TICK_RATE_HZ, MAX_TICK_RATE_HZ);
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz))
    }
}

/// Information about a fired tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number, starting at 1.
    pub tick: u64,
    /// Fixed delta time (always `1 / tick_rate`). Simulation uses this,
    /// not wall-clock elapsed time.
    pub dt: Duration,
    /// Fired noticeably late.
    pub overrun: bool,
    /// Ticks skipped because of the overrun.
    pub ticks_skipped: u64,
}

/// Scheduler timing metrics.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of tick execution time (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Last tick's fraction of budget used. > 1.0 means overrun.
    pub budget_utilization: f64,
}

/// The fixed-timestep scheduler.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Duration,
    tick_count: u64,
    next_tick: TokioInstant,
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let jitter = if config.initial_jitter_us > 0 {
            Duration::from_micros(
                rand::rng().random_range(0..config.initial_jitter_us),
            )
        } else {
            Duration::ZERO
        };
        let next_tick = TokioInstant::now() + tick_duration + jitter;

        debug!(
            rate_hz = config.tick_rate_hz,
            budget_ms = tick_duration.as_secs_f64() * 1000.0,
            "tick scheduler created"
        );

        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Waits until the next tick is due.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        time::sleep_until(self.next_tick).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        // More than 10% late counts as an overrun.
        let late_by = now.saturating_duration_since(self.next_tick);
        let overrun = late_by > self.tick_duration / 10;
        let mut ticks_skipped = 0u64;

        if overrun {
            ticks_skipped = (late_by.as_nanos()
                / self.tick_duration.as_nanos()) as u64;
            if ticks_skipped > 0 {
                warn!(
                    tick = self.tick_count,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "tick overrun, skipping ahead"
                );
            }
            self.metrics.total_overruns += 1;
            self.metrics.total_skipped += ticks_skipped;
            // Reschedule from now, not the missed deadline.
            self.next_tick = now + self.tick_duration;
        } else {
            self.next_tick += self.tick_duration;
        }
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt: self.tick_duration,
            overrun,
            ticks_skipped,
        }
    }

    /// Records that this tick's simulation work finished; drives the
    /// budget warning and the timing metrics.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        let utilization =
            elapsed.as_secs_f64() / self.tick_duration.as_secs_f64();
        self.metrics.budget_utilization = utilization;
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.tick_duration.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick approaching budget limit"
            );
        }

        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_tick_time.as_secs_f64();
        self.metrics.avg_tick_time = Duration::from_secs_f64(
            prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha,
        );
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
