//! # Tick Clock
//!
//! Fixed-timestep pacing for the scheduler.
//!
//! In real-time mode the clock accumulates wall time and reports how many
//! tick intervals elapsed since the previous tick (`ticks_fired`). All of
//! them are consumed at once; the scheduler runs one tick, never a burst of
//! catch-up ticks. In stepped mode ticks run back to back and
//! `ticks_fired` is always 1.

use std::time::{Duration, Instant};

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Number of late ticks (took longer than budget).
    pub late_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn new(budget: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: micros(budget),
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Fixed-timestep tick pacing.
#[derive(Debug)]
pub struct TickClock {
    /// Target tick duration.
    tick_duration: Duration,
    /// Pace against wall time.
    realtime: bool,
    /// Time of the last accumulation.
    last_tick: Instant,
    /// Wall time not yet consumed by a tick.
    accumulator: Duration,
    /// Frame time statistics.
    stats: TickStats,
}

impl TickClock {
    /// Creates a clock for `tick_rate_hz` ticks per second.
    #[must_use]
    pub fn new(tick_rate_hz: u32, realtime: bool) -> Self {
        let tick_duration = Duration::from_nanos(1_000_000_000 / u64::from(tick_rate_hz.max(1)));
        Self {
            tick_duration,
            realtime,
            last_tick: Instant::now(),
            accumulator: Duration::ZERO,
            stats: TickStats::new(tick_duration),
        }
    }

    /// Creates a stepped clock.
    #[must_use]
    pub fn stepped(tick_rate_hz: u32) -> Self {
        Self::new(tick_rate_hz, false)
    }

    /// Returns `true` in real-time mode.
    #[inline]
    #[must_use]
    pub const fn is_realtime(&self) -> bool {
        self.realtime
    }

    /// Target tick duration.
    #[inline]
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Forgets accumulated time, so the next tick is due one full
    /// interval from now.
    pub fn reset(&mut self) {
        self.last_tick = Instant::now();
        self.accumulator = Duration::ZERO;
    }

    fn accumulate(&mut self) {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_tick);
        self.last_tick = now;
    }

    /// Number of whole intervals accumulated, consuming them.
    ///
    /// Returns zero if less than one interval has elapsed.
    pub fn take_fired(&mut self) -> u32 {
        self.accumulate();
        let fired = self.accumulator.as_nanos() / self.tick_duration.as_nanos().max(1);
        let fired = u32::try_from(fired).unwrap_or(u32::MAX);
        if fired > 0 {
            self.accumulator = self.accumulator.saturating_sub(self.tick_duration.saturating_mul(fired));
        }
        fired
    }

    /// Blocks until the next tick is due and returns `ticks_fired`.
    ///
    /// Uses spin-wait for the final microseconds to ensure accuracy.
    pub fn wait_for_tick(&mut self) -> u32 {
        if !self.realtime {
            return 1;
        }
        loop {
            let fired = self.take_fired();
            if fired > 0 {
                return fired;
            }
            let remaining = self.tick_duration.saturating_sub(self.accumulator);
            if remaining > Duration::from_micros(1000) {
                std::thread::sleep(remaining - Duration::from_micros(500));
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Marks the start of a tick.
    #[must_use]
    pub fn begin_tick(&self) -> Instant {
        Instant::now()
    }

    /// Marks the end of a tick and records its duration.
    pub fn end_tick(&mut self, start: Instant) -> Duration {
        let duration = start.elapsed();
        let duration_us = micros(duration);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(duration_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(duration_us);
        // Rolling average
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + duration_us) / 16;

        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
        }
        duration
    }

    /// Returns tick statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::new(self.tick_duration);
    }
}
