//! Cooperative shutdown.
//!
//! The signal handler only flips a [`StopToken`]; the poller observes it
//! between cycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::StartupError;

/// Granularity at which [`StopToken::sleep`] rechecks the token.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Set-once cancellation flag shared between the signal handler and the
/// poller.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Safe to call from any thread, any number of times.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sleeps for `duration` or until the token is stopped, whichever comes
    /// first. Returns whether the token is stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while !self.is_stopped() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            thread::sleep(left.min(POLL_SLICE));
        }
        true
    }
}

/// Stops `token` on SIGINT or SIGTERM.
pub fn install_handler(token: &StopToken) -> Result<(), StartupError> {
    let token = token.clone();
    ctrlc::set_handler(move || token.stop())?;
    info!("stop signal handler installed");
    Ok(())
}
