use chrono::{Duration, Local, NaiveTime};

/// Session time as a signed day-duration. When a schedule hint is
/// given, the hinted value IS the session time (fast-clock semantics:
/// during replay and testing, time is set by the schedule). Observed
/// times must never be compared against real time; the fast clock may
/// run in any direction.
pub trait TimeProvider: Send + Sync {
    fn time(&self, scheduled: Option<Duration>) -> Duration;
}

/// Falls back to the wall clock when no schedule hint is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn time(&self, scheduled: Option<Duration>) -> Duration {
        match scheduled {
            Some(time) => time,
            None => Local::now().time().signed_duration_since(NaiveTime::MIN),
        }
    }
}

/// Answers the schedule hint, or a fixed value without one. Keeps
/// observed times reproducible in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeProvider {
    pub fallback: Duration,
}

impl FixedTimeProvider {
    pub fn new(fallback: Duration) -> Self {
        Self { fallback }
    }
}

impl TimeProvider for FixedTimeProvider {
    fn time(&self, scheduled: Option<Duration>) -> Duration {
        scheduled.unwrap_or(self.fallback)
    }
}
