use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

/// Nanoseconds since the owning clock's origin. Only comparable with readings
/// taken from the same clock.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MonotonicReading(u64);

impl MonotonicReading {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[cfg(test)]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn saturating_duration_since(self, earlier: MonotonicReading) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    pub fn saturating_add(self, duration: Duration) -> MonotonicReading {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

pub trait Clock: Send + Sync {
    fn wall_epoch_seconds(&self) -> Result<f64>;
    fn monotonic(&self) -> MonotonicReading;
}

pub struct SystemClock {
    monotonic_anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            monotonic_anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_epoch_seconds(&self) -> Result<f64> {
        system_time_to_epoch_seconds(SystemTime::now())
    }

    fn monotonic(&self) -> MonotonicReading {
        let elapsed = self.monotonic_anchor.elapsed();
        MonotonicReading::from_nanos(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }
}

fn system_time_to_epoch_seconds(system_time: SystemTime) -> Result<f64> {
    let duration = system_time
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?;
    Ok(duration.as_secs_f64())
}

#[cfg(test)]
pub use manual::ManualClock;
