//! Time sources for checkpoint stamping.

use parking_lot::Mutex;
use time::OffsetDateTime;

use std::time::{Duration, Instant};

/// Monotonic plus wall-clock time source.
///
/// `monotonic` is an offset from an arbitrary origin fixed for the lifetime of
/// the clock; only differences between two readings are meaningful.
pub trait Clock: Send + Sync {
    fn monotonic(&self) -> Duration;
    fn wall(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to. Wall time advances in lockstep.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug, Clone, Copy)]
struct ManualState {
    offset: Duration,
    wall_origin: OffsetDateTime,
}

impl ManualClock {
    pub fn new(wall_origin: OffsetDateTime) -> Self {
        Self {
            state: Mutex::new(ManualState {
                offset: Duration::ZERO,
                wall_origin,
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.offset = state.offset.saturating_add(by);
    }

    pub fn set(&self, offset: Duration) {
        self.state.lock().offset = offset;
    }

    /// Wall time at monotonic offset zero.
    pub fn wall_origin(&self) -> OffsetDateTime {
        self.state.lock().wall_origin
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(OffsetDateTime::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        self.state.lock().offset
    }

    fn wall(&self) -> OffsetDateTime {
        let state = *self.state.lock();
        state.wall_origin + state.offset
    }
}
