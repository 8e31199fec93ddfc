//! Trigger — what makes an automation fire.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geo::GeofenceEventKind;
use crate::id::{DeviceId, GeofenceId};
use crate::solar::SunEvent;
use crate::time::{parse_hhmm, parse_weekdays};

/// Tolerance used for numeric equality in condition triggers.
pub const FLOAT_EPSILON: f64 = 0.01;

/// Comparison operator for numeric condition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<", alias = "lt")]
    LessThan,
    #[serde(rename = ">", alias = "gt")]
    GreaterThan,
    #[serde(rename = "==", alias = "eq")]
    Equal,
    #[serde(rename = "!=", alias = "ne")]
    NotEqual,
}

impl CompareOp {
    /// Compare `actual` against `threshold`; equality uses [`FLOAT_EPSILON`].
    #[must_use]
    pub fn compare(self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::LessThan => actual < threshold,
            Self::GreaterThan => actual > threshold,
            Self::Equal => (actual - threshold).abs() < FLOAT_EPSILON,
            Self::NotEqual => (actual - threshold).abs() >= FLOAT_EPSILON,
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        })
    }
}

/// Describes when an automation should run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires every day (or on the listed days) at a local `HH:MM`.
    Time {
        time: String,
        #[serde(default)]
        days: Option<Vec<String>>,
    },
    /// Fires relative to local sunrise or sunset.
    Sun {
        event: SunEvent,
        #[serde(default)]
        offset_minutes: i32,
        #[serde(default)]
        days: Option<Vec<String>>,
    },
    /// Fires when a device value starts satisfying a comparison.
    #[serde(alias = "device_state")]
    Condition {
        /// Required; kept optional so a missing id is reported instead of
        /// failing deserialisation of the whole automation.
        #[serde(default)]
        device_id: Option<DeviceId>,
        #[serde(default)]
        operator: Option<CompareOp>,
        #[serde(default)]
        threshold: Option<f64>,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    /// Fires when the tracked location enters or leaves a geofence.
    Geofence {
        geofence_id: GeofenceId,
        event: GeofenceEventKind,
    },
    /// Never fires on its own.
    Manual,
}

impl Trigger {
    /// The device a condition trigger watches.
    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::Condition { device_id, .. } => device_id.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_schedule(&self) -> bool {
        matches!(self, Self::Time { .. } | Self::Sun { .. })
    }

    #[must_use]
    pub fn is_condition(&self) -> bool {
        matches!(self, Self::Condition { .. })
    }

    /// Check configuration that serde cannot enforce.
    ///
    /// `index` is the trigger's position inside its automation and only
    /// serves error reporting.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a malformed time, an unknown day name,
    /// or a condition trigger without `device_id`.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        match self {
            Self::Time { time, days } => {
                parse_hhmm(time)?;
                parse_weekdays(days.as_deref().unwrap_or_default())?;
            }
            Self::Sun { days, .. } => {
                parse_weekdays(days.as_deref().unwrap_or_default())?;
            }
            Self::Condition { device_id, .. } => {
                if device_id.is_none() {
                    return Err(ConfigError::MissingDeviceId { index });
                }
            }
            Self::Geofence { .. } | Self::Manual => {}
        }
        Ok(())
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Time { time, days } => match days {
                Some(days) if !days.is_empty() => write!(f, "time({time} on {})", days.join(",")),
                _ => write!(f, "time({time})"),
            },
            Self::Sun {
                event,
                offset_minutes,
                ..
            } => write!(f, "sun({event}{offset_minutes:+}m)"),
            Self::Condition {
                device_id,
                operator,
                ..
            } => {
                let device = device_id.as_ref().map_or("?", DeviceId::as_str);
                match operator {
                    Some(op) => write!(f, "condition({device} {op})"),
                    None => write!(f, "condition({device})"),
                }
            }
            Self::Geofence { geofence_id, event } => write!(f, "geofence({event} {geofence_id})"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_compare_with_epsilon_for_equality() {
        assert!(CompareOp::Equal.compare(21.004, 21.0));
        assert!(!CompareOp::Equal.compare(21.02, 21.0));
        assert!(CompareOp::NotEqual.compare(21.02, 21.0));
        assert!(!CompareOp::NotEqual.compare(21.001, 21.0));
    }

    #[test]
    fn should_compare_strictly_for_ordering() {
        assert!(CompareOp::GreaterThan.compare(25.0, 24.0));
        assert!(!CompareOp::GreaterThan.compare(24.0, 24.0));
        assert!(CompareOp::LessThan.compare(10.0, 18.0));
    }

    #[test]
    fn should_deserialize_symbolic_operators() {
        let op: CompareOp = serde_json::from_str("\">\"").unwrap();
        assert_eq!(op, CompareOp::GreaterThan);
        let op: CompareOp = serde_json::from_str("\"!=\"").unwrap();
        assert_eq!(op, CompareOp::NotEqual);
    }

    #[test]
    fn should_deserialize_time_trigger_without_days() {
        let t: Trigger = serde_json::from_value(json!({"type": "time", "time": "07:00"})).unwrap();
        assert_eq!(
            t,
            Trigger::Time {
                time: "07:00".to_string(),
                days: None
            }
        );
    }

    #[test]
    fn should_accept_device_state_alias() {
        let t: Trigger = serde_json::from_value(json!({
            "type": "device_state",
            "device_id": "d1",
            "operator": ">",
            "threshold": 25
        }))
        .unwrap();
        assert_eq!(t.device_id().map(DeviceId::as_str), Some("d1"));
    }

    #[test]
    fn should_report_missing_device_id() {
        let t: Trigger =
            serde_json::from_value(json!({"type": "condition", "operator": ">", "threshold": 1}))
                .unwrap();
        assert_eq!(t.validate(2), Err(ConfigError::MissingDeviceId { index: 2 }));
    }

    #[test]
    fn should_report_unknown_day_name() {
        let t = Trigger::Time {
            time: "07:00".to_string(),
            days: Some(vec!["someday".to_string()]),
        };
        assert_eq!(
            t.validate(0),
            Err(ConfigError::UnknownDay("someday".to_string()))
        );
    }

    #[test]
    fn should_report_invalid_time() {
        let t = Trigger::Time {
            time: "7am".to_string(),
            days: None,
        };
        assert!(matches!(t.validate(0), Err(ConfigError::InvalidTime(_))));
    }

    #[test]
    fn should_display_triggers() {
        let t = Trigger::Time {
            time: "07:00".to_string(),
            days: Some(vec!["monday".to_string()]),
        };
        assert_eq!(t.to_string(), "time(07:00 on monday)");
        let t = Trigger::Sun {
            event: SunEvent::Sunset,
            offset_minutes: -15,
            days: None,
        };
        assert_eq!(t.to_string(), "sun(sunset-15m)");
        assert_eq!(Trigger::Manual.to_string(), "manual");
    }
}
