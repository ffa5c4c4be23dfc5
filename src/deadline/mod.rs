pub mod anchor;
pub mod error;
pub mod parser;

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::deadline::error::DeadlineError;

pub const DEFAULT_MIN_DEADLINE_SECS: i64 = 10;
pub const DEFAULT_MAX_DEADLINE_SECS: i64 = 365 * 24 * 3_600;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DeadlineRequest {
    Indefinite,
    ForDuration(String),
    UntilTimestamp(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadlineBounds {
    pub min_secs: i64,
    pub max_secs: i64,
}

impl Default for DeadlineBounds {
    fn default() -> Self {
        Self {
            min_secs: DEFAULT_MIN_DEADLINE_SECS,
            max_secs: DEFAULT_MAX_DEADLINE_SECS,
        }
    }
}

impl DeadlineBounds {
    pub fn check(&self, target_epoch: f64, now_epoch: f64) -> Result<(), DeadlineError> {
        let delta_secs = target_epoch - now_epoch;
        if delta_secs < self.min_secs as f64 || delta_secs > self.max_secs as f64 {
            return Err(DeadlineError::Bounds {
                delta_secs,
                min_secs: self.min_secs,
                max_secs: self.max_secs,
            });
        }
        Ok(())
    }
}

/// Immutable target of a session. `local_display` is kept only for display;
/// all arithmetic goes through `target_epoch`.
#[derive(Debug, Clone, PartialEq)]
pub struct Deadline {
    target_epoch: f64,
    local_display: NaiveDateTime,
}

impl Deadline {
    pub fn target_epoch(&self) -> f64 {
        self.target_epoch
    }

    pub fn local_display(&self) -> NaiveDateTime {
        self.local_display
    }

    /// Bounds are checked on the target before it is converted for display,
    /// so a far-off duration reports `Bounds` rather than a conversion failure.
    pub fn for_duration(
        raw: &str,
        now_epoch: f64,
        bounds: &DeadlineBounds,
    ) -> Result<Self, DeadlineError> {
        Self::for_duration_in_tz(raw, now_epoch, bounds, &Local)
    }

    pub fn for_duration_in_tz<Tz>(
        raw: &str,
        now_epoch: f64,
        bounds: &DeadlineBounds,
        timezone: &Tz,
    ) -> Result<Self, DeadlineError>
    where
        Tz: TimeZone,
    {
        let target_epoch = parser::parse_duration(raw, now_epoch)?;
        bounds.check(target_epoch, now_epoch)?;
        let local_display = timezone
            .timestamp_opt(target_epoch as i64, 0)
            .single()
            .map(|dt| dt.naive_local())
            .ok_or_else(|| DeadlineError::format("duration", raw, "target is out of range"))?;
        Ok(Self {
            target_epoch,
            local_display,
        })
    }

    pub fn until(raw: &str) -> Result<Self, DeadlineError> {
        let (target_epoch, local_display) = parser::parse_until(raw)?;
        Ok(Self {
            target_epoch,
            local_display,
        })
    }

    #[cfg(test)]
    pub fn until_in_tz<Tz>(raw: &str, timezone: &Tz) -> Result<Self, DeadlineError>
    where
        Tz: TimeZone,
    {
        let (target_epoch, local_display) = parser::parse_until_in_tz(raw, timezone)?;
        Ok(Self {
            target_epoch,
            local_display,
        })
    }
}

/// Turns CLI input into a bounds-checked deadline. `Indefinite` yields `None`.
pub fn resolve_request(
    request: &DeadlineRequest,
    now_epoch: f64,
    bounds: &DeadlineBounds,
) -> Result<Option<Deadline>, DeadlineError> {
    let deadline = match request {
        DeadlineRequest::Indefinite => return Ok(None),
        DeadlineRequest::ForDuration(raw) => Deadline::for_duration(raw, now_epoch, bounds)?,
        DeadlineRequest::UntilTimestamp(raw) => {
            let deadline = Deadline::until(raw)?;
            bounds.check(deadline.target_epoch(), now_epoch)?;
            deadline
        }
    };
    Ok(Some(deadline))
}
