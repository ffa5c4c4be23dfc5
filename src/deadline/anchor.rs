use std::time::Duration;

use anyhow::Result;

use crate::clock::{Clock, MonotonicReading};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArmOutcome {
    Armed(DeadlineAnchor),
    AlreadyExpired,
}

/// Pairs the wall-clock target with a monotonic reading taken at arm time.
/// After arming, remaining time is derived from the monotonic clock only, so
/// wall clock jumps cannot move the countdown.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DeadlineAnchor {
    monotonic_at_arm: MonotonicReading,
    delta_secs_at_arm: i64,
}

impl DeadlineAnchor {
    pub fn arm(target_epoch: f64, clock: &dyn Clock) -> Result<ArmOutcome> {
        let now_epoch = clock.wall_epoch_seconds()?;
        let monotonic_at_arm = clock.monotonic();
        Ok(Self::arm_at(target_epoch, now_epoch, monotonic_at_arm))
    }

    pub fn arm_at(
        target_epoch: f64,
        now_epoch: f64,
        monotonic_at_arm: MonotonicReading,
    ) -> ArmOutcome {
        // Second ceiling: the first one happened at parse time, before startup work.
        let delta = (target_epoch - now_epoch.ceil()).ceil();
        if delta.is_nan() || delta < 1.0 {
            return ArmOutcome::AlreadyExpired;
        }
        ArmOutcome::Armed(Self {
            monotonic_at_arm,
            delta_secs_at_arm: delta.min(i64::MAX as f64) as i64,
        })
    }

    pub fn delta_secs_at_arm(&self) -> i64 {
        self.delta_secs_at_arm
    }

    pub fn delay_at_arm(&self) -> Duration {
        Duration::from_secs(self.delta_secs_at_arm.max(0) as u64)
    }

    pub fn expires_at(&self) -> MonotonicReading {
        self.monotonic_at_arm.saturating_add(self.delay_at_arm())
    }

    pub fn remaining_seconds(&self, now: MonotonicReading) -> i64 {
        let elapsed = now.saturating_duration_since(self.monotonic_at_arm).as_secs();
        let elapsed = i64::try_from(elapsed).unwrap_or(i64::MAX);
        self.delta_secs_at_arm.saturating_sub(elapsed).max(0)
    }
}
