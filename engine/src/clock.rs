//! Time sources for the gaze pipeline.
//!
//! Pipeline components never read a clock on their own: every operation
//! takes `now` from the caller. The runtime reads `SystemClock`; tests step
//! a `ManualClock` so dwell and calibration deadlines are reproducible.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

/// Trait abstracting time sources for testability.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Current wall-clock time as milliseconds since UNIX epoch.
    fn unix_millis(&self) -> i64;
}

/// Real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        unix_millis_now()
    }
}

/// Clock that only moves when told to.
///
/// Starts at the real time of construction and then stays frozen until
/// `advance` is called.
pub struct ManualClock {
    origin: Instant,
    unix_origin_ms: i64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            unix_origin_ms: unix_millis_now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward by `step`.
    pub fn advance(&self, step: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += step;
    }

    /// Move time forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Total time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn unix_millis(&self) -> i64 {
        self.unix_origin_ms + self.elapsed().as_millis() as i64
    }
}

fn unix_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
