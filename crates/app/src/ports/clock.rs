//! Clock port — where "now" comes from.
//!
//! Schedules are computed in the clock's own time zone so daylight-saving
//! transitions resolve against the host's local rules.

use chrono::{DateTime, Local, TimeZone};

/// Source of wall-clock time.
pub trait Clock {
    type Tz: TimeZone<Offset: Send + Sync> + Send + Sync;

    fn now(&self) -> DateTime<Self::Tz>;
}

impl<T: Clock> Clock for std::sync::Arc<T> {
    type Tz = T::Tz;

    fn now(&self) -> DateTime<Self::Tz> {
        (**self).now()
    }
}

/// The host's local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
