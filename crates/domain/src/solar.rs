//! Low-precision solar position: sunrise, sunset and solar noon.
//!
//! Julian day → mean longitude / anomaly → ecliptic longitude →
//! declination → hour angle → equation of time. Good to a minute or two
//! outside the polar circles, which is all a home schedule needs.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Sun altitude at rise/set, accounting for refraction and the solar disc.
const HORIZON_DEG: f64 = -0.833;
const J2000: f64 = 2_451_545.0;
const MINUTES_PER_DAY: f64 = 1440.0;

/// Which solar event a sun trigger follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SunEvent {
    Sunrise,
    Sunset,
}

impl std::fmt::Display for SunEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sunrise => f.write_str("sunrise"),
            Self::Sunset => f.write_str("sunset"),
        }
    }
}

/// Local clock times of the day's solar events.
///
/// `sunrise` / `sunset` are `None` during polar day or polar night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SolarTimes {
    pub sunrise: Option<NaiveTime>,
    pub sunset: Option<NaiveTime>,
    pub solar_noon: NaiveTime,
}

impl SolarTimes {
    #[must_use]
    pub fn get(&self, event: SunEvent) -> Option<NaiveTime> {
        match event {
            SunEvent::Sunrise => self.sunrise,
            SunEvent::Sunset => self.sunset,
        }
    }
}

/// Julian day number at noon UTC of `date`.
#[must_use]
pub fn julian_day(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
    #[allow(clippy::cast_precision_loss)]
    let days = (date - epoch).num_days() as f64;
    J2000 + days
}

/// Compute the solar events of `date` at (`lat`, `lng`), expressed in a
/// local clock that is `utc_offset_minutes` ahead of UTC.
#[must_use]
pub fn solar_times(lat: f64, lng: f64, date: NaiveDate, utc_offset_minutes: i32) -> SolarTimes {
    let n = julian_day(date) - J2000;

    let mean_longitude = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let mean_anomaly = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();
    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
    .to_radians();
    let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

    let declination = (obliquity.sin() * ecliptic_longitude.sin()).asin();
    let right_ascension = (obliquity.cos() * ecliptic_longitude.sin())
        .atan2(ecliptic_longitude.cos())
        .to_degrees()
        .rem_euclid(360.0);

    // Equation of time in minutes, folded into [-720, 720).
    let equation_of_time = 4.0 * ((mean_longitude - right_ascension + 180.0).rem_euclid(360.0) - 180.0);

    let noon_minutes = 720.0 - 4.0 * lng - equation_of_time + f64::from(utc_offset_minutes);

    let phi = lat.to_radians();
    let cos_hour_angle = (HORIZON_DEG.to_radians().sin() - phi.sin() * declination.sin())
        / (phi.cos() * declination.cos());

    let (sunrise, sunset) = if (-1.0..=1.0).contains(&cos_hour_angle) {
        let half_day = 4.0 * cos_hour_angle.acos().to_degrees();
        (
            Some(minutes_to_time(noon_minutes - half_day)),
            Some(minutes_to_time(noon_minutes + half_day)),
        )
    } else {
        (None, None)
    };

    SolarTimes {
        sunrise,
        sunset,
        solar_noon: minutes_to_time(noon_minutes),
    }
}

fn minutes_to_time(minutes: f64) -> NaiveTime {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let seconds = (minutes.rem_euclid(MINUTES_PER_DAY) * 60.0).round() as u32 % 86_400;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default()
}
