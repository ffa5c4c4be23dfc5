use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeadlineError {
    #[error("invalid {what} '{input}': {reason}")]
    Format {
        what: &'static str,
        input: String,
        reason: String,
    },

    #[error("impossible date/time '{input}': {reason}")]
    Calendar { input: String, reason: String },

    #[error(
        "local time '{local}' does not exist (skipped by a daylight saving transition); pick a time outside the gap"
    )]
    NonexistentLocalTime { local: String },

    #[error(
        "local time '{local}' is ambiguous (repeated by a daylight saving transition); pick a time outside the repeated hour"
    )]
    AmbiguousLocalTime { local: String },

    #[error(
        "deadline is {delta_secs:.0}s away, outside the allowed range of {min_secs}s to {max_secs}s"
    )]
    Bounds {
        delta_secs: f64,
        min_secs: i64,
        max_secs: i64,
    },
}

impl DeadlineError {
    pub(crate) fn format(
        what: &'static str,
        input: &str,
        reason: impl Into<String>,
    ) -> DeadlineError {
        DeadlineError::Format {
            what,
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn calendar(input: &str, reason: impl Into<String>) -> DeadlineError {
        DeadlineError::Calendar {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
