//! Virtual device implementations — light, switch, sensor, thermostat.
//!
//! Device ids are fixed by the caller so automations and flows can refer
//! to them across restarts.

mod light;
mod sensor;
mod switch;
mod thermostat;

pub use light::VirtualLight;
pub use sensor::VirtualSensor;
pub use switch::VirtualSwitch;
pub use thermostat::VirtualThermostat;

use homeflow_domain::automation::Command;
use homeflow_domain::device::{Device, DeviceValue};
use homeflow_domain::id::DeviceId;

/// Wrapper enum for the concrete virtual device types.
pub enum VirtualDevice {
    Light(VirtualLight),
    Switch(VirtualSwitch),
    Sensor(VirtualSensor),
    Thermostat(VirtualThermostat),
}

impl VirtualDevice {
    #[must_use]
    pub fn id(&self) -> &DeviceId {
        match self {
            Self::Light(d) => d.id(),
            Self::Switch(d) => d.id(),
            Self::Sensor(d) => d.id(),
            Self::Thermostat(d) => d.id(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Device {
        match self {
            Self::Light(d) => d.snapshot(),
            Self::Switch(d) => d.snapshot(),
            Self::Sensor(d) => d.snapshot(),
            Self::Thermostat(d) => d.snapshot(),
        }
    }

    /// Apply a command, returning the value the device now reports.
    ///
    /// # Errors
    ///
    /// Returns the device's refusal reason.
    pub fn apply(&self, command: &Command) -> Result<DeviceValue, String> {
        match self {
            Self::Light(d) => d.apply(command),
            Self::Switch(d) => d.apply(command),
            Self::Sensor(d) => d.apply(command),
            Self::Thermostat(d) => d.apply(command),
        }
    }
}

impl From<VirtualLight> for VirtualDevice {
    fn from(device: VirtualLight) -> Self {
        Self::Light(device)
    }
}

impl From<VirtualSwitch> for VirtualDevice {
    fn from(device: VirtualSwitch) -> Self {
        Self::Switch(device)
    }
}

impl From<VirtualSensor> for VirtualDevice {
    fn from(device: VirtualSensor) -> Self {
        Self::Sensor(device)
    }
}

impl From<VirtualThermostat> for VirtualDevice {
    fn from(device: VirtualThermostat) -> Self {
        Self::Thermostat(device)
    }
}
