//! Virtual sensor — a numeric reading set from outside.

use std::sync::{Mutex, PoisonError};

use homeflow_domain::automation::Command;
use homeflow_domain::device::{Device, DeviceKind, DeviceValue};
use homeflow_domain::id::DeviceId;

/// A simulated read-only sensor (temperature, humidity, …).
///
/// Sensors refuse every command; their reading changes through
/// [`VirtualSensor::set_reading`].
pub struct VirtualSensor {
    id: DeviceId,
    name: String,
    reading: Mutex<f64>,
}

impl VirtualSensor {
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>, reading: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            reading: Mutex::new(reading),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    #[must_use]
    pub fn reading(&self) -> f64 {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_reading(&self, value: f64) {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    #[must_use]
    pub fn snapshot(&self) -> Device {
        Device::new(self.id.clone(), self.name.clone(), DeviceValue::Number(self.reading()))
            .with_kind(DeviceKind::Sensor)
    }

    /// # Errors
    ///
    /// Always: sensors are read-only.
    pub fn apply(&self, _command: &Command) -> Result<DeviceValue, String> {
        Err(format!("{} is a read-only sensor", self.name))
    }
}
