//! Wall-clock sources for the coordinator.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Source of the current UTC time.
///
/// Timers are always armed with `tokio::time`, so a clock only has to map
/// tokio's monotonic time onto wall-clock instants consistently.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Time left until `at`, zero when it has already passed.
    fn until(&self, at: DateTime<Utc>) -> Duration {
        (at - self.now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Host system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock anchored at a UTC instant and advanced by tokio's timer.
///
/// Under a paused tokio runtime time only moves when tasks sleep, which
/// makes event timing in tests exact and instantaneous.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    /// Creates a clock reading `anchor` at the moment of construction.
    ///
    /// # Panics
    ///
    /// Must be called inside a tokio runtime.
    pub fn starting_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.started.elapsed())
            .ok()
            .and_then(|elapsed| self.anchor.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
