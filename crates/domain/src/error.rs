//! Common error types used across the workspace.
//!
//! Each failure class gets its own typed error; [`HomeflowError`] wraps them
//! via `#[from]` so layers can propagate with `?`.

use std::time::Duration;

/// Top-level error for the workspace.
#[derive(Debug, thiserror::Error)]
pub enum HomeflowError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    #[error("flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("location permission denied")]
    PermissionDenied,
}

impl HomeflowError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Only transport-level device failures and timeouts qualify; missing
    /// devices, invalid input and explicit device rejections do not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Device(err) => err.transient,
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Invalid automation / engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("trigger #{index} requires a device_id")]
    MissingDeviceId { index: usize },

    #[error("invalid time `{0}`, expected HH:MM")]
    InvalidTime(String),

    #[error("unknown day name `{0}`")]
    UnknownDay(String),

    #[error("sun triggers require a configured location")]
    MissingLocation,

    #[error("no upcoming occurrence for schedule `{0}`")]
    NoOccurrence(String),
}

/// A domain invariant was violated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("coordinates out of range: lat={lat}, lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("radius must be positive, got {0}")]
    InvalidRadius(f64),

    #[error("action `{action}` requires a value")]
    MissingValue { action: &'static str },

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Something referenced by id does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A device command failed.
///
/// `transient` failures (network, broker unavailable) are retried by the
/// action executor; explicit rejections reported by the device are not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DeviceError {
    pub message: String,
    pub transient: bool,
}

impl DeviceError {
    /// A transport failure worth retrying.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    /// The device answered and refused the command.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

/// An operation exceeded its deadline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} timed out after {}ms", after.as_millis())]
pub struct TimeoutError {
    pub operation: &'static str,
    pub after: Duration,
}

/// Structural or node-level failure while running a flow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("flow is disabled")]
    Disabled,

    #[error("flow failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("maximum depth of {0} exceeded")]
    MaxDepthExceeded(usize),

    #[error("node `{node}` has unsupported subtype `{subtype}`")]
    UnsupportedSubtype { node: String, subtype: String },

    #[error("node `{node}` is missing `{field}`")]
    MissingData { node: String, field: &'static str },

    #[error("node `{node}` failed: {reason}")]
    NodeFailed { node: String, reason: String },
}
