use anyhow::Result;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::Settings;
use crate::deadline::anchor::{ArmOutcome, DeadlineAnchor};
use crate::deadline::{Deadline, DeadlineRequest, resolve_request};
use crate::power::{SleepInhibitor, status_reason};
use crate::schedule::expiry::ExpiryTimer;
use crate::ui::display::{DisplayEvent, DisplayHandle, DisplayLoop, ShutdownGuard, ShutdownReason};
use crate::ui::render::{CountdownView, format_local_display};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionOutcome {
    AlreadyExpired,
    Expired,
    Quit(String),
}

impl From<ShutdownReason> for SessionOutcome {
    fn from(value: ShutdownReason) -> Self {
        match value {
            ShutdownReason::Expired => SessionOutcome::Expired,
            ShutdownReason::Quit(reason) => SessionOutcome::Quit(reason),
        }
    }
}

pub struct Session<'a, V: CountdownView> {
    clock: &'a dyn Clock,
    settings: Settings,
    display: DisplayLoop<'a, V>,
}

impl<'a, V: CountdownView> Session<'a, V> {
    pub fn new(clock: &'a dyn Clock, settings: Settings, view: V) -> Self {
        Self {
            clock,
            settings,
            display: DisplayLoop::new(clock, view, ShutdownGuard::new()),
        }
    }

    pub fn handle(&self) -> DisplayHandle {
        self.display.handle()
    }

    #[cfg(test)]
    pub fn view(&self) -> &V {
        self.display.view()
    }

    /// Validates the request, holds the inhibitor for the whole session and
    /// blocks until the deadline passes or a quit is requested.
    pub fn run(
        &mut self,
        request: &DeadlineRequest,
        inhibitor: &mut dyn SleepInhibitor,
    ) -> Result<SessionOutcome> {
        let now_epoch = self.clock.wall_epoch_seconds()?;
        let deadline = resolve_request(request, now_epoch, &self.settings.bounds)?;
        match &deadline {
            Some(deadline) => info!(
                ?request,
                target_epoch = deadline.target_epoch(),
                local = %format_local_display(deadline.local_display()),
                "deadline accepted"
            ),
            None => info!("no deadline given, staying awake until terminated"),
        }

        inhibitor.acquire(&status_reason(deadline.as_ref()))?;
        let outcome = match deadline {
            Some(deadline) => self.run_until(&deadline),
            None => self.display.run().map(SessionOutcome::from),
        };
        inhibitor.release();
        outcome
    }

    fn run_until(&mut self, deadline: &Deadline) -> Result<SessionOutcome> {
        self.display
            .view_mut()
            .show_auto_quit_at(&format_local_display(deadline.local_display()));

        // Arm as late as possible so startup work does not eat into the deadline.
        let anchor = match DeadlineAnchor::arm(deadline.target_epoch(), self.clock)? {
            ArmOutcome::Armed(anchor) => anchor,
            ArmOutcome::AlreadyExpired => {
                self.display.guard().begin();
                info!("deadline already passed at arm time, quitting");
                self.display
                    .view_mut()
                    .show_status("Deadline already passed, quitting.");
                return Ok(SessionOutcome::AlreadyExpired);
            }
        };
        info!(
            delta_secs = anchor.delta_secs_at_arm(),
            expires_at = ?anchor.expires_at(),
            "deadline armed"
        );

        let mut expiry = ExpiryTimer::new();
        let handle = self.display.handle();
        let guard = self.display.guard();
        expiry.arm(&anchor, self.clock, move || {
            if guard.is_shutting_down() {
                debug!("expiry fired during shutdown, ignoring");
                return Ok(());
            }
            handle.post(DisplayEvent::Expired)
        })?;

        self.display
            .start_countdown(anchor, self.settings.cadence.clone());
        let reason = self.display.run();
        expiry.cancel();
        reason.map(SessionOutcome::from)
    }
}
