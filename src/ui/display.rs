use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};

use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::deadline::anchor::DeadlineAnchor;
use crate::schedule::cadence::CadenceConfig;
use crate::schedule::countdown::{CountdownScheduler, CountdownTick, TickSink};
use crate::ui::render::{CountdownView, format_cadence, format_remaining};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DisplayEvent {
    Expired,
    Quit(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ShutdownReason {
    Expired,
    Quit(String),
}

/// Process-wide "shutting down" flag. Only the first `begin` wins.
#[derive(Debug, Clone, Default)]
pub struct ShutdownGuard {
    shutting_down: Arc<AtomicBool>,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> bool {
        self.shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}

/// Cloneable way for other threads to reach the display loop.
#[derive(Debug, Clone)]
pub struct DisplayHandle {
    tx: Sender<DisplayEvent>,
}

impl DisplayHandle {
    pub fn post(&self, event: DisplayEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow!("display loop is no longer running"))
    }

    pub fn request_quit(&self, reason: impl Into<String>) -> Result<()> {
        self.post(DisplayEvent::Quit(reason.into()))
    }
}

/// Single-threaded display context. Owns the view and the countdown; other
/// threads only ever post events to it.
pub struct DisplayLoop<'a, V: CountdownView> {
    clock: &'a dyn Clock,
    view: V,
    inbox: Receiver<DisplayEvent>,
    handle: DisplayHandle,
    guard: ShutdownGuard,
    countdown: Option<CountdownScheduler>,
}

impl<'a, V: CountdownView> DisplayLoop<'a, V> {
    pub fn new(clock: &'a dyn Clock, view: V, guard: ShutdownGuard) -> Self {
        let (tx, inbox) = mpsc::channel();
        Self {
            clock,
            view,
            inbox,
            handle: DisplayHandle { tx },
            guard,
            countdown: None,
        }
    }

    pub fn handle(&self) -> DisplayHandle {
        self.handle.clone()
    }

    pub fn guard(&self) -> ShutdownGuard {
        self.guard.clone()
    }

    #[cfg(test)]
    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn start_countdown(&mut self, anchor: DeadlineAnchor, config: CadenceConfig) {
        let mut countdown = CountdownScheduler::new(anchor, config);
        countdown.start(self.clock.monotonic(), &mut ViewSink(&mut self.view));
        self.countdown = Some(countdown);
    }

    /// Dispatches events and countdown firings until a shutdown event arrives.
    pub fn run(&mut self) -> Result<ShutdownReason> {
        loop {
            let next_due = self.countdown.as_ref().and_then(CountdownScheduler::next_due);
            let received = match next_due {
                Some(due) => {
                    let wait = due.saturating_duration_since(self.clock.monotonic());
                    self.inbox.recv_timeout(wait)
                }
                None => self
                    .inbox
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(event) => {
                    let reason = self.shutdown_for(event);
                    self.stop_countdown();
                    return Ok(reason);
                }
                Err(RecvTimeoutError::Timeout) => self.fire_countdown(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("display event channel closed unexpectedly"));
                }
            }
        }
    }

    pub fn stop_countdown(&mut self) {
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.stop();
        }
    }

    fn fire_countdown(&mut self) {
        let now = self.clock.monotonic();
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.fire(now, &mut ViewSink(&mut self.view));
        }
    }

    fn shutdown_for(&mut self, event: DisplayEvent) -> ShutdownReason {
        if !self.guard.begin() {
            debug!(?event, "shutdown already in progress");
        }
        match event {
            DisplayEvent::Expired => {
                info!("deadline reached, shutting down");
                self.view.show_status("Deadline reached, quitting.");
                ShutdownReason::Expired
            }
            DisplayEvent::Quit(reason) => {
                info!(%reason, "quit requested, shutting down");
                self.view.show_status(&format!("Quit requested ({reason})."));
                ShutdownReason::Quit(reason)
            }
        }
    }
}

struct ViewSink<'v, V: CountdownView>(&'v mut V);

impl<V: CountdownView> TickSink for ViewSink<'_, V> {
    fn on_tick(&mut self, tick: CountdownTick) {
        self.0
            .show_time_remaining(&format_remaining(tick.remaining_secs));
        if let Some(cadence_ms) = tick.cadence_ms {
            self.0.show_update_frequency(&format_cadence(cadence_ms));
        }
    }

    fn is_visible(&self) -> bool {
        self.0.is_visible()
    }
}
