//! Host stopwatches and device timing accumulators

use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// Number of host stopwatches owned by one manager.
pub const TIMER_SLOTS: usize = 16;

/// Slot measuring the whole manager lifetime.
pub const TIMER_TOTAL: usize = 0;
/// Slot accumulating program build/load time.
pub const TIMER_BUILD: usize = 1;
/// First slot free for callers.
pub const TIMER_USER: usize = 2;

/// Interval stopwatch accumulating over repeated start/stop pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    elapsed: Duration,
    laps: u64,
}

impl Stopwatch {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stop and return the length of the interval just closed.
    ///
    /// Stopping a watch that is not running returns zero.
    pub fn stop(&mut self) -> Duration {
        match self.started.take() {
            Some(t) => {
                let lap = t.elapsed();
                self.elapsed += lap;
                self.laps += 1;
                lap
            }
            None => Duration::ZERO,
        }
    }

    /// Accumulated time, including the running interval if any.
    pub fn elapsed(&self) -> Duration {
        self.elapsed + self.started.map_or(Duration::ZERO, |t| t.elapsed())
    }

    pub fn laps(&self) -> u64 {
        self.laps
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fixed pool of stopwatches scoped to one manager.
#[derive(Debug, Clone)]
pub struct TimerPool {
    slots: [Stopwatch; TIMER_SLOTS],
}

impl Default for TimerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerPool {
    pub fn new() -> Self {
        Self {
            slots: [Stopwatch::default(); TIMER_SLOTS],
        }
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut Stopwatch> {
        self.slots.get_mut(slot).ok_or(Error::InvalidTimer(slot))
    }

    pub fn start(&mut self, slot: usize) -> Result<()> {
        self.slot_mut(slot)?.start();
        Ok(())
    }

    pub fn stop(&mut self, slot: usize) -> Result<Duration> {
        Ok(self.slot_mut(slot)?.stop())
    }

    pub fn reset(&mut self, slot: usize) -> Result<()> {
        self.slot_mut(slot)?.reset();
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Result<&Stopwatch> {
        self.slots.get(slot).ok_or(Error::InvalidTimer(slot))
    }

    pub fn elapsed(&self, slot: usize) -> Result<Duration> {
        Ok(self.get(slot)?.elapsed())
    }
}

/// Running sums of timed samples (seconds).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingAccumulator {
    pub sum: f64,
    pub sum_sq: f64,
    pub count: u64,
}

impl TimingAccumulator {
    pub fn record(&mut self, seconds: f64) {
        self.sum += seconds;
        self.sum_sq += seconds * seconds;
        self.count += 1;
    }

    pub fn record_duration(&mut self, d: Duration) {
        self.record(d.as_secs_f64());
    }

    pub fn stat(&self) -> TimingStat {
        TimingStat::from_accumulator(self)
    }
}

/// Derived timing figures.
///
/// `mean` is the cumulative sum of the samples, not their average, and
/// `deviation` is `sqrt(|sum_sq - mean^2| / samples)` with no Bessel
/// correction. Reports built on these numbers depend on that definition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingStat {
    pub mean: f64,
    pub deviation: f64,
    pub samples: u64,
}

impl TimingStat {
    pub fn from_accumulator(acc: &TimingAccumulator) -> Self {
        let mean = acc.sum;
        let deviation = if acc.count >= 2 {
            ((acc.sum_sq - mean * mean).abs() / acc.count as f64).sqrt()
        } else {
            0.0
        };
        Self {
            mean,
            deviation,
            samples: acc.count,
        }
    }

    /// Per-sample average, for display next to the cumulative figure.
    pub fn average(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.mean / self.samples as f64
        }
    }
}

/// Elapsed device time of a completed, profiled command in seconds.
///
/// The queue must have been created with profiling enabled.
#[cfg(feature = "opencl")]
pub fn event_elapsed(event: &ocl::core::Event) -> Result<f64> {
    use ocl::core::{ProfilingInfo, ProfilingInfoResult};

    let start = match ocl::core::get_event_profiling_info(event, ProfilingInfo::Start)? {
        ProfilingInfoResult::Start(t) => t,
        other => {
            return Err(Error::ApiCallFailed(format!(
                "unexpected profiling result: {other:?}"
            )));
        }
    };
    let end = match ocl::core::get_event_profiling_info(event, ProfilingInfo::End)? {
        ProfilingInfoResult::End(t) => t,
        other => {
            return Err(Error::ApiCallFailed(format!(
                "unexpected profiling result: {other:?}"
            )));
        }
    };
    Ok(end.saturating_sub(start) as f64 * 1e-9)
}
