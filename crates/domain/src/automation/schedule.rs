//! Schedule — next-occurrence math for time and sun triggers.
//!
//! Everything here is generic over the [`TimeZone`] so the same code runs
//! against the host's local zone in production and fixed offsets in tests.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone, Weekday};

use crate::error::ConfigError;
use crate::geo::Coordinates;
use crate::solar::{SunEvent, solar_times};
use crate::time::{parse_hhmm, parse_weekdays};

use super::Trigger;

/// Days searched ahead before giving up: a full week plus today.
const SEARCH_DAYS: i64 = 8;

/// A parsed schedule trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// A fixed local clock time.
    At { time: NaiveTime, days: Vec<Weekday> },
    /// A solar event shifted by an offset.
    Sun {
        event: SunEvent,
        offset_minutes: i32,
        days: Vec<Weekday>,
    },
}

impl Schedule {
    /// Parse the schedule part of a trigger. Non-schedule triggers yield `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an invalid time or unknown day name.
    pub fn from_trigger(trigger: &Trigger) -> Result<Option<Self>, ConfigError> {
        match trigger {
            Trigger::Time { time, days } => Ok(Some(Self::At {
                time: parse_hhmm(time)?,
                days: parse_weekdays(days.as_deref().unwrap_or_default())?,
            })),
            Trigger::Sun {
                event,
                offset_minutes,
                days,
            } => Ok(Some(Self::Sun {
                event: *event,
                offset_minutes: *offset_minutes,
                days: parse_weekdays(days.as_deref().unwrap_or_default())?,
            })),
            _ => Ok(None),
        }
    }

    /// The first occurrence strictly after `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingLocation`] for a sun schedule without a
    /// location, or [`ConfigError::NoOccurrence`] when nothing matches within
    /// the search window (e.g. the sun never sets on any allowed day).
    pub fn next_after<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        location: Option<Coordinates>,
    ) -> Result<DateTime<Tz>, ConfigError> {
        let next = match self {
            Self::At { time, days } => next_time_occurrence(*time, days, now),
            Self::Sun {
                event,
                offset_minutes,
                days,
            } => {
                let location = location.ok_or(ConfigError::MissingLocation)?;
                next_sun_occurrence(*event, *offset_minutes, days, location, now)
            }
        };
        next.ok_or_else(|| ConfigError::NoOccurrence(self.to_string()))
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::At { time, .. } => write!(f, "{}", time.format("%H:%M")),
            Self::Sun {
                event,
                offset_minutes,
                ..
            } => write!(f, "{event}{offset_minutes:+}m"),
        }
    }
}

/// Next local `time` strictly after `now`, restricted to `days` when non-empty.
#[must_use]
pub fn next_time_occurrence<Tz: TimeZone>(
    time: NaiveTime,
    days: &[Weekday],
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    candidate_dates(now.date_naive(), days)
        .filter_map(|date| resolve_local(&tz, date.and_time(time)))
        .find(|candidate| candidate > now)
}

/// Next solar `event` (+ offset) strictly after `now`, restricted to `days`
/// when non-empty. Days without the event (polar day/night) are skipped.
#[must_use]
pub fn next_sun_occurrence<Tz: TimeZone>(
    event: SunEvent,
    offset_minutes: i32,
    days: &[Weekday],
    location: Coordinates,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    candidate_dates(now.date_naive(), days)
        .filter_map(|date| {
            let utc_offset = utc_offset_minutes(&tz, date)?;
            let time = solar_times(location.lat, location.lng, date, utc_offset).get(event)?;
            let local = date.and_time(time) + TimeDelta::minutes(i64::from(offset_minutes));
            resolve_local(&tz, local)
        })
        .find(|candidate| candidate > now)
}

fn candidate_dates(today: NaiveDate, days: &[Weekday]) -> impl Iterator<Item = NaiveDate> + '_ {
    (0..SEARCH_DAYS)
        .filter_map(move |offset| today.checked_add_signed(TimeDelta::days(offset)))
        .filter(move |date| days.is_empty() || days.contains(&date.weekday()))
}

/// Map a local wall-clock time to an instant. Times skipped by a DST jump
/// are pushed forward by an hour.
fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + TimeDelta::hours(1))).earliest())
}

fn utc_offset_minutes<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<i32> {
    let noon = date.and_hms_opt(12, 0, 0)?;
    Some(tz.offset_from_utc_datetime(&noon).fix().local_minus_utc() / 60)
}
