use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, error};

use crate::clock::MonotonicReading;
use crate::deadline::anchor::DeadlineAnchor;
use crate::schedule::cadence::CadenceConfig;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CountdownState {
    Idle,
    Scheduled,
    Ticking,
    Stopped,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CountdownTick {
    pub remaining_secs: i64,
    /// Set only when the selected cadence differs from the one last displayed.
    pub cadence_ms: Option<u64>,
}

/// Receiver of countdown updates. Lives in the display context.
pub trait TickSink {
    fn on_tick(&mut self, tick: CountdownTick);

    fn is_visible(&self) -> bool {
        true
    }
}

/// Self-rescheduling countdown driven by the display loop. Every firing
/// recomputes the remaining time from the anchor and picks a fresh interval.
pub struct CountdownScheduler {
    anchor: DeadlineAnchor,
    config: CadenceConfig,
    state: CountdownState,
    next_due: Option<MonotonicReading>,
    last_displayed_cadence_secs: i64,
}

impl CountdownScheduler {
    pub fn new(anchor: DeadlineAnchor, config: CadenceConfig) -> Self {
        Self {
            anchor,
            config,
            state: CountdownState::Idle,
            next_due: None,
            last_displayed_cadence_secs: -1,
        }
    }

    /// Paints the current remaining time once and schedules the first firing.
    pub fn start(&mut self, now: MonotonicReading, sink: &mut dyn TickSink) {
        if self.state != CountdownState::Idle {
            return;
        }
        self.state = CountdownState::Ticking;
        self.tick(now, sink);
    }

    /// Runs one firing if it is due. Returns when the next firing is due, or
    /// `None` when the countdown is not scheduled.
    pub fn fire(
        &mut self,
        now: MonotonicReading,
        sink: &mut dyn TickSink,
    ) -> Option<MonotonicReading> {
        if self.state != CountdownState::Scheduled {
            return None;
        }
        let due = self.next_due?;
        if now < due {
            return Some(due);
        }
        self.state = CountdownState::Ticking;
        self.tick(now, sink);
        self.next_due
    }

    pub fn stop(&mut self) {
        if self.state != CountdownState::Stopped {
            debug!("countdown stopped");
        }
        self.state = CountdownState::Stopped;
        self.next_due = None;
    }

    #[cfg(test)]
    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn next_due(&self) -> Option<MonotonicReading> {
        match self.state {
            CountdownState::Scheduled => self.next_due,
            _ => None,
        }
    }

    fn tick(&mut self, now: MonotonicReading, sink: &mut dyn TickSink) {
        let remaining_secs = self.anchor.remaining_seconds(now);

        if sink.is_visible() {
            let cadence_ms = self.config.select_interval(remaining_secs);
            let cadence_secs = (cadence_ms / 1_000) as i64;
            let changed = cadence_secs != self.last_displayed_cadence_secs;
            let tick = CountdownTick {
                remaining_secs,
                cadence_ms: changed.then_some(cadence_ms),
            };
            if panic::catch_unwind(AssertUnwindSafe(|| sink.on_tick(tick))).is_err() {
                error!(remaining_secs, "countdown display update panicked");
            } else if changed {
                debug!(cadence_ms, remaining_secs, "countdown cadence changed");
                self.last_displayed_cadence_secs = cadence_secs;
            }
        }

        let interval_ms = self.config.next_interval(remaining_secs);
        self.next_due = Some(now.saturating_add(Duration::from_millis(interval_ms)));
        self.state = CountdownState::Scheduled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::deadline::anchor::ArmOutcome;

    #[derive(Default)]
    struct Recorder {
        ticks: Vec<CountdownTick>,
        hidden: bool,
        panic_on_tick: bool,
    }

    impl TickSink for Recorder {
        fn on_tick(&mut self, tick: CountdownTick) {
            if self.panic_on_tick {
                panic!("display failure");
            }
            self.ticks.push(tick);
        }

        fn is_visible(&self) -> bool {
            !self.hidden
        }
    }

    impl Recorder {
        fn remaining(&self) -> Vec<i64> {
            self.ticks.iter().map(|tick| tick.remaining_secs).collect()
        }

        fn cadence_updates(&self) -> Vec<u64> {
            self.ticks.iter().filter_map(|tick| tick.cadence_ms).collect()
        }
    }

    fn start_with(clock: &ManualClock, delta_secs: f64, sink: &mut Recorder) -> CountdownScheduler {
        let now = clock.wall_epoch_seconds().expect("wall");
        let anchor = match DeadlineAnchor::arm(now + delta_secs, clock).expect("arm") {
            ArmOutcome::Armed(anchor) => anchor,
            ArmOutcome::AlreadyExpired => panic!("expected armed"),
        };
        let mut countdown = CountdownScheduler::new(anchor, CadenceConfig::default());
        countdown.start(clock.monotonic(), sink);
        countdown
    }

    /// Advances the clock to each due time and fires, as the display loop does.
    fn run_until(
        countdown: &mut CountdownScheduler,
        clock: &ManualClock,
        sink: &mut Recorder,
        limit: Duration,
    ) {
        let end = clock.monotonic().saturating_add(limit);
        while let Some(due) = countdown.next_due() {
            if due > end {
                break;
            }
            let wait = due.saturating_duration_since(clock.monotonic());
            clock.advance(wait);
            countdown.fire(clock.monotonic(), sink);
        }
    }

    #[test]
    fn first_tick_snaps_to_the_cadence_boundary() {
        let clock = ManualClock::new(1_735_689_600.0);
        let mut sink = Recorder::default();
        let mut countdown = start_with(&clock, 4_500.0, &mut sink);
        assert_eq!(countdown.state(), CountdownState::Scheduled);

        run_until(&mut countdown, &clock, &mut sink, Duration::from_secs(1_800));
        assert_eq!(sink.remaining(), vec![4_500, 4_200, 3_600, 3_300, 3_000, 2_700]);
        assert_eq!(sink.cadence_updates(), vec![600_000, 300_000]);
    }

    #[test]
    fn short_deadline_ticks_every_second_with_one_cadence_label() {
        let clock = ManualClock::new(1_735_689_600.0);
        let mut sink = Recorder::default();
        let mut countdown = start_with(&clock, 10.0, &mut sink);

        run_until(&mut countdown, &clock, &mut sink, Duration::from_secs(10));
        assert_eq!(sink.remaining(), (0..=10).rev().collect::<Vec<_>>());
        assert_eq!(sink.cadence_updates(), vec![1_000]);
    }

    #[test]
    fn cadence_label_only_changes_with_the_band() {
        let clock = ManualClock::new(1_000.0);
        let mut sink = Recorder::default();
        let mut countdown = start_with(&clock, 130.0, &mut sink);

        run_until(&mut countdown, &clock, &mut sink, Duration::from_secs(130));
        assert_eq!(sink.cadence_updates(), vec![10_000, 5_000, 2_000, 1_000]);
        assert_eq!(&sink.remaining()[..4], &[130, 120, 115, 110]);
        assert_eq!(sink.remaining().last(), Some(&0));
    }

    #[test]
    fn hidden_display_skips_updates_but_keeps_rescheduling() {
        let clock = ManualClock::new(1_000.0);
        let mut sink = Recorder {
            hidden: true,
            ..Recorder::default()
        };
        let mut countdown = start_with(&clock, 20.0, &mut sink);
        run_until(&mut countdown, &clock, &mut sink, Duration::from_secs(5));
        assert!(sink.ticks.is_empty());
        assert_eq!(countdown.state(), CountdownState::Scheduled);

        sink.hidden = false;
        run_until(&mut countdown, &clock, &mut sink, Duration::from_secs(1));
        assert_eq!(sink.remaining(), vec![14]);
        assert_eq!(sink.cadence_updates(), vec![1_000]);
    }

    #[test]
    fn early_fire_does_nothing() {
        let clock = ManualClock::new(1_000.0);
        let mut sink = Recorder::default();
        let mut countdown = start_with(&clock, 20.0, &mut sink);
        let due = countdown.next_due().expect("scheduled");

        clock.advance_millis(500);
        assert_eq!(countdown.fire(clock.monotonic(), &mut sink), Some(due));
        assert_eq!(sink.ticks.len(), 1);
    }

    #[test]
    fn wall_clock_jumps_do_not_disturb_the_countdown() {
        let clock = ManualClock::new(1_000.0);
        let mut sink = Recorder::default();
        let mut countdown = start_with(&clock, 20.0, &mut sink);
        clock.set_wall(1_000_000.0);
        run_until(&mut countdown, &clock, &mut sink, Duration::from_secs(3));
        assert_eq!(sink.remaining(), vec![20, 19, 18, 17]);
    }

    #[test]
    fn stop_is_idempotent_and_final() {
        let clock = ManualClock::new(1_000.0);
        let mut sink = Recorder::default();
        let mut countdown = start_with(&clock, 20.0, &mut sink);
        countdown.stop();
        countdown.stop();
        assert_eq!(countdown.state(), CountdownState::Stopped);
        assert_eq!(countdown.next_due(), None);

        clock.advance_millis(5_000);
        assert_eq!(countdown.fire(clock.monotonic(), &mut sink), None);
        countdown.start(clock.monotonic(), &mut sink);
        assert_eq!(sink.ticks.len(), 1);
    }

    #[test]
    fn panicking_display_update_still_reschedules() {
        let clock = ManualClock::new(1_000.0);
        let mut sink = Recorder {
            panic_on_tick: true,
            ..Recorder::default()
        };
        let mut countdown = start_with(&clock, 20.0, &mut sink);
        assert_eq!(countdown.state(), CountdownState::Scheduled);

        sink.panic_on_tick = false;
        run_until(&mut countdown, &clock, &mut sink, Duration::from_secs(1));
        assert_eq!(sink.cadence_updates(), vec![1_000]);
    }
}
