use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::deadline::anchor::DeadlineAnchor;

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const FIRED: u8 = 2;
const CANCELLED: u8 = 3;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExpiryState {
    Idle,
    Armed,
    Fired,
    Cancelled,
}

impl ExpiryState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            ARMED => ExpiryState::Armed,
            FIRED => ExpiryState::Fired,
            CANCELLED => ExpiryState::Cancelled,
            _ => ExpiryState::Idle,
        }
    }
}

struct Shared {
    state: AtomicU8,
    wake: Mutex<Option<Sender<()>>>,
}

/// One-shot timer that runs its callback on a dedicated background thread.
/// The callback must hand any display work back to the display context.
pub struct ExpiryTimer {
    shared: Arc<Shared>,
    join: Option<JoinHandle<()>>,
}

impl Default for ExpiryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpiryTimer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(IDLE),
                wake: Mutex::new(None),
            }),
            join: None,
        }
    }

    /// Fires at the anchor's monotonic expiry, measured on the same clock the
    /// countdown reads, so 00:00:00 and expiry line up.
    pub fn arm<F>(
        &mut self,
        anchor: &DeadlineAnchor,
        clock: &dyn Clock,
        on_expire: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let delay = anchor
            .expires_at()
            .saturating_duration_since(clock.monotonic());
        self.arm_after(delay, on_expire)
    }

    pub fn arm_after<F>(&mut self, delay: Duration, on_expire: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let fire_at = Instant::now() + delay;
        if self
            .shared
            .state
            .compare_exchange(IDLE, ARMED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            bail!("expiry timer can only be armed once (state {:?})", self.state());
        }

        let (wake_tx, wake_rx) = mpsc::channel::<()>();
        {
            let mut wake = self
                .shared
                .wake
                .lock()
                .map_err(|_| anyhow::anyhow!("failed to lock expiry timer state"))?;
            *wake = Some(wake_tx);
        }

        let shared = Arc::clone(&self.shared);
        let join = thread::Builder::new()
            .name("wakeguard-expiry".to_string())
            .spawn(move || {
                loop {
                    let wait = fire_at.saturating_duration_since(Instant::now());
                    match wake_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) if Instant::now() >= fire_at => break,
                        Err(RecvTimeoutError::Timeout) | Ok(()) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            debug!("expiry thread woke for cancellation");
                            return;
                        }
                    }
                }

                if shared
                    .state
                    .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return;
                }
                info!("deadline reached, running expiry callback");
                run_guarded(on_expire);
            })
            .context("failed to spawn expiry timer thread")?;
        self.join = Some(join);

        debug!(delay_ms = delay.as_millis() as u64, "expiry timer armed");
        Ok(())
    }

    /// Guarantees the callback will not start after this returns. Idempotent,
    /// and a no-op once the timer has fired.
    pub fn cancel(&self) {
        match self.shared.state.compare_exchange(
            ARMED,
            CANCELLED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => info!("expiry timer cancelled"),
            Err(IDLE) => {
                let _ = self.shared.state.compare_exchange(
                    IDLE,
                    CANCELLED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            Err(_) => {}
        }
        if let Ok(mut wake) = self.shared.wake.lock() {
            wake.take();
        }
    }

    pub fn state(&self) -> ExpiryState {
        ExpiryState::from_raw(self.shared.state.load(Ordering::Acquire))
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run_guarded<F>(on_expire: F)
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(on_expire)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %format!("{err:#}"), "expiry callback failed"),
        Err(_) => error!("expiry callback panicked"),
    }
}
