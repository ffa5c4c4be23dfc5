use std::io::Write;

use chrono::NaiveDateTime;
use tracing::warn;

/// Presentation surface for a session. Everything here runs on the display
/// context only.
pub trait CountdownView {
    fn show_auto_quit_at(&mut self, text: &str);
    fn show_time_remaining(&mut self, text: &str);
    fn show_update_frequency(&mut self, text: &str);
    fn show_status(&mut self, text: &str);

    fn is_visible(&self) -> bool {
        true
    }
}

pub fn format_remaining(remaining_secs: i64) -> String {
    let total = remaining_secs.max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

pub fn format_cadence(interval_ms: u64) -> String {
    let total_secs = interval_ms / 1_000;
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn format_local_display(local: NaiveDateTime) -> String {
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Line-oriented terminal view. Hidden views keep the header and status
/// lines but skip countdown redraws.
pub struct ConsoleView<W: Write> {
    out: W,
    visible: bool,
}

impl<W: Write> ConsoleView<W> {
    pub fn new(out: W, visible: bool) -> Self {
        Self { out, visible }
    }

    fn write_line(&mut self, label: &str, text: &str) {
        let result = writeln!(self.out, "{label}: {text}").and_then(|_| self.out.flush());
        if let Err(err) = result {
            warn!(error = %err, label, "failed to write countdown line");
        }
    }
}

impl<W: Write> CountdownView for ConsoleView<W> {
    fn show_auto_quit_at(&mut self, text: &str) {
        self.write_line("Auto-quit at", text);
    }

    fn show_time_remaining(&mut self, text: &str) {
        self.write_line("Time remaining", text);
    }

    fn show_update_frequency(&mut self, text: &str) {
        self.write_line("Update frequency", text);
    }

    fn show_status(&mut self, text: &str) {
        self.write_line("Status", text);
    }

    fn is_visible(&self) -> bool {
        self.visible
    }
}

#[cfg(test)]
pub use recording::RecordingView;
