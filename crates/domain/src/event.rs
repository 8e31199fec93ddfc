//! Event — an immutable record of something the engine did.
//!
//! Events are published when automations fire or fail, geofences are
//! crossed, flows finish and the scheduler notices a clock jump. They are
//! notifications only; nothing in the engine reads them back.

use serde::{Deserialize, Serialize};

use crate::id::EventId;
use crate::time::{Timestamp, now};

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AutomationTriggered,
    AutomationFailed,
    GeofenceEntered,
    GeofenceLeft,
    FlowCompleted,
    FlowFailed,
    ClockDriftDetected,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::AutomationTriggered => "automation_triggered",
            Self::AutomationFailed => "automation_failed",
            Self::GeofenceEntered => "geofence_entered",
            Self::GeofenceLeft => "geofence_left",
            Self::FlowCompleted => "flow_completed",
            Self::FlowFailed => "flow_failed",
            Self::ClockDriftDetected => "clock_drift_detected",
        })
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    /// Id of the automation, geofence or flow the event is about.
    pub subject: Option<String>,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, subject: Option<String>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            subject,
            data,
            timestamp: now(),
        }
    }

    /// Shorthand for an event about a subject with a `Display` id.
    #[must_use]
    pub fn about(
        event_type: EventType,
        subject: impl std::fmt::Display,
        data: serde_json::Value,
    ) -> Self {
        Self::new(event_type, Some(subject.to_string()), data)
    }
}
