//! Device — a controllable or observable thing known to the host.
//!
//! The engine only reads devices: the host keeps them fresh and the
//! device-control port performs the actual commands.

use serde::{Deserialize, Serialize};

use crate::id::DeviceId;
use crate::time::Timestamp;

/// Broad device category, used to pick a sensible default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Light,
    Switch,
    Sensor,
    Thermostat,
    #[default]
    Other,
}

/// The primary value a device reports.
///
/// Switches and lights report [`Bool`](Self::Bool), sensors and thermostats
/// report [`Number`](Self::Number), modal devices report [`Text`](Self::Text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl DeviceValue {
    /// Interpret the value as an on/off state, if it is boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A device snapshot as supplied by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub kind: DeviceKind,
    #[serde(default = "default_online")]
    pub online: bool,
    pub value: DeviceValue,
    #[serde(default = "crate::time::now")]
    pub updated_at: Timestamp,
}

fn default_online() -> bool {
    true
}

impl Device {
    /// Create an online device reporting `value`.
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>, value: DeviceValue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: DeviceKind::Other,
            online: true,
            value,
            updated_at: crate::time::now(),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: DeviceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Whether the device currently reports "on". Non-boolean values count as off.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.value.as_bool().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_on_only_for_true_boolean() {
        let on = Device::new("d1", "Lamp", DeviceValue::Bool(true));
        let off = Device::new("d2", "Lamp", DeviceValue::Bool(false));
        let sensor = Device::new("d3", "Thermo", DeviceValue::Number(21.0));
        assert!(on.is_on());
        assert!(!off.is_on());
        assert!(!sensor.is_on());
    }

    #[test]
    fn should_deserialize_untagged_values() {
        let b: DeviceValue = serde_json::from_str("true").unwrap();
        let n: DeviceValue = serde_json::from_str("21.5").unwrap();
        let s: DeviceValue = serde_json::from_str("\"heat\"").unwrap();
        assert_eq!(b, DeviceValue::Bool(true));
        assert_eq!(n, DeviceValue::Number(21.5));
        assert_eq!(s, DeviceValue::Text("heat".to_string()));
    }

    #[test]
    fn should_apply_defaults_when_deserializing_minimal_device() {
        let device: Device =
            serde_json::from_value(serde_json::json!({"id": "d1", "name": "Lamp", "value": false}))
                .unwrap();
        assert!(device.online);
        assert_eq!(device.kind, DeviceKind::Other);
        assert_eq!(device.id.as_str(), "d1");
    }

    #[test]
    fn should_display_values() {
        assert_eq!(DeviceValue::Number(21.5).to_string(), "21.5");
        assert_eq!(DeviceValue::Text("eco".to_string()).to_string(), "eco");
    }
}
