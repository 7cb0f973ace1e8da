//! Software timing for bit-banged protocols.
//!
//! Linux offers no hardware timestamps for sysfs GPIO edges, so pulse widths
//! are measured against a free-running monotonic clock.

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

/// Free-running microsecond clock used to time pulse widths.
pub trait Clock {
    /// Microseconds elapsed since an arbitrary, fixed origin.
    fn now_us(&self) -> u64;

    /// Microseconds elapsed since `start`, saturating on a clock that runs
    /// backwards.
    fn since_us(&self, start: u64) -> u64 {
        self.now_us().saturating_sub(start)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Delays below this are spun rather than slept; the scheduler overshoots
/// short sleeps by tens of microseconds.
const SPIN_LIMIT: Duration = Duration::from_millis(1);

/// [`DelayNs`] for a hosted Linux target.
///
/// Short delays busy-wait on [`Instant`], longer ones yield to the scheduler.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpinDelay;

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let wait = Duration::from_nanos(u64::from(ns));
        if wait >= SPIN_LIMIT {
            thread::sleep(wait);
            return;
        }
        let start = Instant::now();
        while start.elapsed() < wait {
            core::hint::spin_loop();
        }
    }
}
