use anyhow::{Result, bail};
use tracing::info;

use crate::deadline::Deadline;
use crate::ui::render::format_local_display;

/// Keeps the machine from sleeping while held. `release` must be safe to
/// call more than once.
pub trait SleepInhibitor {
    fn acquire(&mut self, reason: &str) -> Result<()>;
    fn release(&mut self);
}

pub fn status_reason(deadline: Option<&Deadline>) -> String {
    match deadline {
        Some(deadline) => format!(
            "wakeguard: keeping system awake until {}",
            format_local_display(deadline.local_display())
        ),
        None => "wakeguard: keeping system awake indefinitely".to_string(),
    }
}

/// Records the inhibit request in the log; the platform call lives outside
/// this crate.
#[derive(Debug, Default)]
pub struct LoggingInhibitor {
    active: Option<String>,
}

impl LoggingInhibitor {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for LoggingInhibitor {
    fn drop(&mut self) {
        self.release();
    }
}

impl SleepInhibitor for LoggingInhibitor {
    fn acquire(&mut self, reason: &str) -> Result<()> {
        if let Some(current) = &self.active {
            bail!("sleep inhibitor already held: {current}");
        }
        info!(%reason, "sleep inhibitor acquired");
        self.active = Some(reason.to_string());
        Ok(())
    }

    fn release(&mut self) {
        if let Some(reason) = self.active.take() {
            info!(%reason, "sleep inhibitor released");
        }
    }
}
