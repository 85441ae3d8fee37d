//! Loop progress reporting with an estimated time to completion.

use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Display unit picked from the magnitude of a duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 3600;

    /// Seconds up to 3 minutes, minutes up to 3 hours, hours beyond
    pub fn for_duration(duration: Duration) -> Self {
        let secs = duration.as_secs();
        if secs > 3 * Self::HOUR {
            TimeUnit::Hours
        } else if secs > 3 * Self::MINUTE {
            TimeUnit::Minutes
        } else {
            TimeUnit::Seconds
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "secs",
            TimeUnit::Minutes => "mins",
            TimeUnit::Hours => "hr",
        }
    }

    pub fn convert(&self, duration: Duration) -> f64 {
        let secs = duration.as_secs_f64();
        match self {
            TimeUnit::Seconds => secs,
            TimeUnit::Minutes => secs / Self::MINUTE as f64,
            TimeUnit::Hours => secs / Self::HOUR as f64,
        }
    }
}

/// One progress line worth of data
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub count: usize,
    pub total: usize,
    pub percent: f64,
    pub elapsed: Duration,
    pub estimated_total: Duration,
    pub remaining: Duration,
}

impl ProgressSnapshot {
    /// Remaining time rounded in the unit chosen by the estimated total
    pub fn eta(&self) -> (f64, TimeUnit) {
        let unit = TimeUnit::for_duration(self.estimated_total);
        (unit.convert(self.remaining).round(), unit)
    }
}

#[derive(Debug)]
pub struct ProgressTimer {
    total: usize,
    display_every: usize,
    verbose: bool,
    count: usize,
    started: Instant,
}

impl ProgressTimer {
    /// `prints` is the number of progress lines wanted over `total` ticks.
    pub fn new(total: usize, prints: usize, verbose: bool) -> Self {
        let display_every = if prints == 0 || prints > total {
            1
        } else {
            ((total as f64 / prints as f64).round() as usize).max(1)
        };

        Self {
            total,
            display_every,
            verbose,
            count: 0,
            started: Instant::now(),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record one finished item. Returns the snapshot when a line is due.
    pub fn tick(&mut self) -> Option<ProgressSnapshot> {
        self.count += 1;
        if self.count % self.display_every != 0 {
            return None;
        }

        let snapshot = self.snapshot();
        if self.verbose {
            let (remaining, unit) = snapshot.eta();
            info!(
                percent = snapshot.percent.round(),
                count = snapshot.count,
                total = snapshot.total,
                "{}% @{} ETA: {} {}",
                snapshot.percent.round(),
                snapshot.count,
                remaining,
                unit.label()
            );
        }
        Some(snapshot)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started.elapsed();
        let count = self.count.max(1);
        let average = elapsed.as_secs_f64() / count as f64;
        let estimated_total = Duration::from_secs_f64(average * self.total as f64);
        let percent = if self.total == 0 {
            100.0
        } else {
            self.count as f64 / self.total as f64 * 100.0
        };

        ProgressSnapshot {
            count: self.count,
            total: self.total,
            percent,
            elapsed,
            estimated_total,
            remaining: estimated_total.saturating_sub(elapsed),
        }
    }

    /// Report the total elapsed time and return it
    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        if self.verbose {
            info!(
                elapsed_secs = elapsed.as_secs_f64(),
                items = self.count,
                "Elapsed time: {:.3}s",
                elapsed.as_secs_f64()
            );
        } else {
            debug!(
                elapsed_secs = elapsed.as_secs_f64(),
                items = self.count,
                "Loop finished"
            );
        }
        elapsed
    }
}
