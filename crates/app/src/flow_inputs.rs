//! Flow inputs backed by the device registry and the clock.

use homeflow_domain::device::DeviceValue;
use homeflow_domain::id::DeviceId;
use homeflow_domain::time::minute_of_day;

use crate::ports::{Clock, DeviceRegistry, FlowInputs};

/// [`FlowInputs`] reading sensor devices from a [`DeviceRegistry`].
///
/// Nodes that do not name a device fall back to the configured default
/// temperature and presence sensors.
pub struct RegistryInputs<R, C> {
    registry: R,
    clock: C,
    temperature_sensor: Option<DeviceId>,
    presence_sensor: Option<DeviceId>,
}

impl<R: DeviceRegistry, C: Clock> RegistryInputs<R, C> {
    #[must_use]
    pub fn new(registry: R, clock: C) -> Self {
        Self {
            registry,
            clock,
            temperature_sensor: None,
            presence_sensor: None,
        }
    }

    #[must_use]
    pub fn with_temperature_sensor(mut self, id: impl Into<DeviceId>) -> Self {
        self.temperature_sensor = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_presence_sensor(mut self, id: impl Into<DeviceId>) -> Self {
        self.presence_sensor = Some(id.into());
        self
    }

    fn value_of(&self, source: Option<&DeviceId>, fallback: Option<&DeviceId>) -> Option<DeviceValue> {
        let id = source.or(fallback)?;
        self.registry.get(id).map(|device| device.value)
    }
}

impl<R: DeviceRegistry, C: Clock> FlowInputs for RegistryInputs<R, C> {
    fn temperature(&self, source: Option<&DeviceId>) -> Option<f64> {
        match self.value_of(source, self.temperature_sensor.as_ref())? {
            DeviceValue::Number(n) => Some(n),
            DeviceValue::Text(s) => s.trim().parse().ok(),
            DeviceValue::Bool(_) => None,
        }
    }

    fn presence(&self, source: Option<&DeviceId>) -> Option<bool> {
        match self.value_of(source, self.presence_sensor.as_ref())? {
            DeviceValue::Bool(b) => Some(b),
            DeviceValue::Number(n) => Some(n > 0.0),
            DeviceValue::Text(s) => match s.to_ascii_lowercase().as_str() {
                "home" | "present" | "on" | "detected" => Some(true),
                "away" | "not_home" | "off" | "clear" => Some(false),
                _ => None,
            },
        }
    }

    fn minute_of_day(&self) -> u32 {
        minute_of_day(self.clock.now().time())
    }
}
