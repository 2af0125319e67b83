use crate::domain::ports::Clock;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
///
/// Replays stamp every command with its business date through this clock, and
/// tests use it to step across due dates and grace periods.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    /// Starts at midnight UTC of `date`.
    pub fn at(date: NaiveDate) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn set_today(&self, date: NaiveDate) {
        self.set(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.write();
        *now += Duration::days(days);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
