//! Read-only state snapshot: what the engine works on.

use std::path::Path;

use homeflow_domain::automation::Automation;
use homeflow_domain::device::Device;
use homeflow_domain::flow::{Flow, NodeType};
use homeflow_domain::geo::{Coordinates, Geofence};
use serde::Deserialize;

/// Devices, automations, flows and geofences loaded at startup.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Extra registry entries on top of the virtual fleet.
    pub devices: Vec<Device>,
    pub automations: Vec<Automation>,
    pub flows: Vec<Flow>,
    pub geofences: Vec<Geofence>,
    /// Positions replayed by the simulated location provider.
    pub location_track: Vec<Coordinates>,
}

impl Snapshot {
    /// Read the snapshot at `path`; a missing file is an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(StateError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "no state snapshot, starting empty");
                Ok(Self::default())
            }
            Err(err) => Err(StateError::Io(err)),
        }
    }
}

/// Whether `flow` runs once at boot: one of its roots is a manual or
/// startup trigger.
#[must_use]
pub fn runs_at_startup(flow: &Flow) -> bool {
    flow.root_nodes().iter().any(|node| {
        node.node_type == NodeType::Trigger
            && matches!(node.subtype.as_str(), "manual" | "startup")
    })
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to parse state snapshot")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read state snapshot")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeflow_domain::automation::Trigger;
    use homeflow_domain::device::DeviceValue;

    const SNAPSHOT: &str = r#"{
        "devices": [
            {"id": "binary_sensor.hallway_motion", "name": "Hallway motion", "value": false}
        ],
        "automations": [
            {
                "name": "Morning coffee",
                "triggers": [{"type": "time", "time": "07:00", "days": ["mon", "tue"]}],
                "actions": [{"device_id": "switch.coffee_maker", "action": "turn_on"}]
            }
        ],
        "flows": [
            {
                "name": "Welcome",
                "nodes": [
                    {"id": "start", "type": "trigger", "subtype": "startup", "connections": ["lamp"]},
                    {"id": "lamp", "type": "action", "subtype": "light",
                     "data": {"device_id": "light.hallway", "action": "on"}}
                ]
            }
        ],
        "geofences": [
            {"name": "Home", "center": {"lat": 52.37, "lng": 4.9}, "radius": 150.0}
        ]
    }"#;

    #[test]
    fn should_parse_snapshot_with_defaults() {
        let snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();

        assert_eq!(snapshot.devices[0].value, DeviceValue::Bool(false));
        assert!(snapshot.automations[0].enabled);
        assert!(matches!(snapshot.automations[0].triggers[0], Trigger::Time { .. }));
        assert!(snapshot.flows[0].enabled);
        assert!(snapshot.geofences[0].enabled);
        assert!(snapshot.location_track.is_empty());
    }

    #[test]
    fn should_run_flow_at_startup_when_root_is_startup_trigger() {
        let snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();
        assert!(runs_at_startup(&snapshot.flows[0]));
    }

    #[test]
    fn should_not_run_flow_at_startup_when_root_is_time_trigger() {
        let flow: Flow = serde_json::from_str(
            r#"{"name": "Evening", "nodes": [
                {"id": "t", "type": "trigger", "subtype": "time"}
            ]}"#,
        )
        .unwrap();
        assert!(!runs_at_startup(&flow));
    }

    #[test]
    fn should_return_empty_snapshot_when_file_not_found() {
        let snapshot = Snapshot::load(Path::new("does-not-exist.json")).unwrap();
        assert!(snapshot.automations.is_empty());
    }
}
