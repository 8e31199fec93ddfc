//! Time and timestamp helpers.

use chrono::{DateTime, NaiveTime, Timelike, Utc, Weekday};

use crate::error::ConfigError;

/// UTC timestamp used for `last_evaluated`, event times, run records, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a `HH:MM` 24-hour clock time.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidTime`] for anything that is not two
/// colon-separated numbers within `00:00..=23:59`.
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, ConfigError> {
    let invalid = || ConfigError::InvalidTime(value.to_string());
    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)
}

/// Minutes elapsed since midnight.
#[must_use]
pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Parse a case-insensitive English day name (`"monday"`, `"Tue"`, …).
///
/// # Errors
///
/// Returns [`ConfigError::UnknownDay`] when the name is not recognised.
pub fn parse_weekday(name: &str) -> Result<Weekday, ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        _ => Err(ConfigError::UnknownDay(name.to_string())),
    }
}

/// Parse a list of day names.
///
/// # Errors
///
/// Returns the first [`ConfigError::UnknownDay`] encountered.
pub fn parse_weekdays(names: &[String]) -> Result<Vec<Weekday>, ConfigError> {
    names.iter().map(|n| parse_weekday(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_parse_valid_clock_time() {
        let t = parse_hhmm("07:05").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(7, 5, 0).unwrap());
    }

    #[test]
    fn should_reject_out_of_range_time() {
        assert_eq!(
            parse_hhmm("24:00"),
            Err(ConfigError::InvalidTime("24:00".to_string()))
        );
        assert!(parse_hhmm("12:60").is_err());
    }

    #[test]
    fn should_reject_malformed_time() {
        assert!(parse_hhmm("0700").is_err());
        assert!(parse_hhmm("seven:00").is_err());
        assert!(parse_hhmm("").is_err());
    }

    #[test]
    fn should_compute_minute_of_day() {
        let t = NaiveTime::from_hms_opt(13, 30, 0).unwrap();
        assert_eq!(minute_of_day(t), 810);
    }

    #[test]
    fn should_parse_day_names_case_insensitively() {
        assert_eq!(parse_weekday("Monday").unwrap(), Weekday::Mon);
        assert_eq!(parse_weekday("WEDNESDAY").unwrap(), Weekday::Wed);
        assert_eq!(parse_weekday("sun").unwrap(), Weekday::Sun);
    }

    #[test]
    fn should_reject_unknown_day_name() {
        let days = vec!["monday".to_string(), "funday".to_string()];
        assert_eq!(
            parse_weekdays(&days),
            Err(ConfigError::UnknownDay("funday".to_string()))
        );
    }
}
