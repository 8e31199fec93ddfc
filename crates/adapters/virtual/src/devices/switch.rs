//! Virtual switch — responds to on, off and toggle only.

use std::sync::{Mutex, PoisonError};

use homeflow_domain::automation::Command;
use homeflow_domain::device::{Device, DeviceKind, DeviceValue};
use homeflow_domain::id::DeviceId;

/// A simulated on/off switch.
pub struct VirtualSwitch {
    id: DeviceId,
    name: String,
    on: Mutex<bool>,
}

impl VirtualSwitch {
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            on: Mutex::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        *self.on.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> Device {
        Device::new(self.id.clone(), self.name.clone(), DeviceValue::Bool(self.is_on()))
            .with_kind(DeviceKind::Switch)
    }

    /// # Errors
    ///
    /// Refuses anything but on, off and toggle.
    pub fn apply(&self, command: &Command) -> Result<DeviceValue, String> {
        let mut on = self.on.lock().unwrap_or_else(PoisonError::into_inner);
        match command {
            Command::TurnOn => *on = true,
            Command::TurnOff => *on = false,
            Command::Toggle => *on = !*on,
            _ => return Err(format!("{} only switches on and off", self.name)),
        }
        Ok(DeviceValue::Bool(*on))
    }
}
