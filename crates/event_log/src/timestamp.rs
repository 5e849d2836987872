use chrono::{DateTime, Utc};

/// Hands out event timestamps that never decrease within one process
/// lifetime, even if the system clock steps backwards. All records of
/// one action should share a single timestamp so replay keeps them
/// together.
#[derive(Debug, Default)]
pub struct MonotonicTimestamps {
    last: Option<DateTime<Utc>>,
}

impl MonotonicTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamped = match self.last {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last = Some(stamped);
        stamped
    }
}
