//! Action — the device command performed when an automation fires.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::DeviceId;

/// The kind of command an [`Action`] issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    TurnOn,
    TurnOff,
    Toggle,
    SetBrightness,
    SetColor,
    SetTemperature,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
            Self::Toggle => "toggle",
            Self::SetBrightness => "set_brightness",
            Self::SetColor => "set_color",
            Self::SetTemperature => "set_temperature",
        }
    }

    /// The command that undoes this one, if any.
    ///
    /// Only `turn_on` and `turn_off` are reversible; the previous brightness,
    /// colour or temperature is not known to the engine.
    #[must_use]
    pub fn inverse(self) -> Option<Self> {
        match self {
            Self::TurnOn => Some(Self::TurnOff),
            Self::TurnOff => Some(Self::TurnOn),
            _ => None,
        }
    }

    /// Whether the action needs a `value`.
    #[must_use]
    pub fn requires_value(self) -> bool {
        matches!(
            self,
            Self::SetBrightness | Self::SetColor | Self::SetTemperature
        )
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single command aimed at one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub device_id: DeviceId,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// A validated, typed device command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TurnOn,
    TurnOff,
    Toggle,
    /// Brightness percentage, `0..=100`.
    SetBrightness(u8),
    /// Normalised `#rrggbb` colour.
    SetColor(String),
    /// Colour temperature in Kelvin.
    SetTemperature(u32),
}

impl Action {
    #[must_use]
    pub fn new(device_id: impl Into<DeviceId>, action: ActionKind) -> Self {
        Self {
            device_id: device_id.into(),
            action,
            value: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Check the value against the action kind and produce a typed command.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingValue`] when a `set_*` action has no
    /// value, or [`ValidationError::InvalidValue`] when the value has the wrong
    /// type or range.
    pub fn command(&self) -> Result<Command, ValidationError> {
        let value = match (self.action.requires_value(), &self.value) {
            (false, _) => None,
            (true, Some(v)) if !v.is_null() => Some(v),
            (true, _) => {
                return Err(ValidationError::MissingValue {
                    action: self.action.as_str(),
                });
            }
        };

        match (self.action, value) {
            (ActionKind::TurnOn, _) => Ok(Command::TurnOn),
            (ActionKind::TurnOff, _) => Ok(Command::TurnOff),
            (ActionKind::Toggle, _) => Ok(Command::Toggle),
            (ActionKind::SetBrightness, Some(v)) => parse_brightness(v).map(Command::SetBrightness),
            (ActionKind::SetColor, Some(v)) => parse_color(v).map(Command::SetColor),
            (ActionKind::SetTemperature, Some(v)) => {
                parse_kelvin(v).map(Command::SetTemperature)
            }
            (kind, None) => Err(ValidationError::MissingValue {
                action: kind.as_str(),
            }),
        }
    }
}

fn parse_brightness(value: &serde_json::Value) -> Result<u8, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidValue {
        field: "brightness",
        reason: reason.to_string(),
    };
    let n = value.as_f64().ok_or_else(|| invalid("expected a number"))?;
    if !(0.0..=100.0).contains(&n) {
        return Err(invalid("expected 0-100"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(n.round() as u8)
}

fn parse_color(value: &serde_json::Value) -> Result<String, ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        field: "color",
        reason: format!("expected #rrggbb, got {value}"),
    };
    let raw = value.as_str().ok_or_else(invalid)?;
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    Ok(format!("#{}", hex.to_ascii_lowercase()))
}

fn parse_kelvin(value: &serde_json::Value) -> Result<u32, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidValue {
        field: "temperature",
        reason: reason.to_string(),
    };
    let n = value.as_f64().ok_or_else(|| invalid("expected a number"))?;
    if n <= 0.0 || n > f64::from(u32::MAX) {
        return Err(invalid("expected a positive Kelvin value"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(n.round() as u32)
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}({}, {v})", self.action, self.device_id),
            None => write!(f, "{}({})", self.action, self.device_id),
        }
    }
}
