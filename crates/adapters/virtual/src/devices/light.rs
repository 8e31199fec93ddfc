//! Virtual light — on/off, brightness, colour and colour temperature.

use std::sync::{Mutex, MutexGuard, PoisonError};

use homeflow_domain::automation::Command;
use homeflow_domain::device::{Device, DeviceKind, DeviceValue};
use homeflow_domain::id::DeviceId;

/// Kelvin range accepted by the simulated bulb.
const KELVIN_RANGE: std::ops::RangeInclusive<u32> = 1000..=10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
struct LightState {
    on: bool,
    brightness: u8,
    color: Option<String>,
    kelvin: Option<u32>,
}

/// A simulated dimmable colour light.
pub struct VirtualLight {
    id: DeviceId,
    name: String,
    state: Mutex<LightState>,
}

impl VirtualLight {
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: Mutex::new(LightState {
                on: false,
                brightness: 100,
                color: None,
                kelvin: None,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.lock_state_mut().on
    }

    #[must_use]
    pub fn brightness(&self) -> u8 {
        self.lock_state_mut().brightness
    }

    #[must_use]
    pub fn color(&self) -> Option<String> {
        self.lock_state_mut().color.clone()
    }

    #[must_use]
    pub fn color_temperature(&self) -> Option<u32> {
        self.lock_state_mut().kelvin
    }

    /// The [`Device`] snapshot the engine sees.
    #[must_use]
    pub fn snapshot(&self) -> Device {
        Device::new(self.id.clone(), self.name.clone(), DeviceValue::Bool(self.is_on()))
            .with_kind(DeviceKind::Light)
    }

    /// Apply a command, returning the new reported value.
    ///
    /// # Errors
    ///
    /// Returns the refusal reason for an out-of-range colour temperature.
    pub fn apply(&self, command: &Command) -> Result<DeviceValue, String> {
        let mut state = self.lock_state_mut();
        match command {
            Command::TurnOn => state.on = true,
            Command::TurnOff => state.on = false,
            Command::Toggle => state.on = !state.on,
            Command::SetBrightness(percent) => {
                state.brightness = *percent;
                state.on = *percent > 0;
            }
            Command::SetColor(hex) => {
                state.color = Some(hex.clone());
                state.on = true;
            }
            Command::SetTemperature(kelvin) => {
                if !KELVIN_RANGE.contains(kelvin) {
                    return Err(format!("colour temperature {kelvin}K is out of range"));
                }
                state.kelvin = Some(*kelvin);
                state.on = true;
            }
        }
        Ok(DeviceValue::Bool(state.on))
    }

    fn lock_state_mut(&self) -> MutexGuard<'_, LightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_off() {
        let light = VirtualLight::new("light.desk", "Desk");
        assert!(!light.is_on());
        assert_eq!(light.snapshot().value, DeviceValue::Bool(false));
        assert_eq!(light.snapshot().kind, DeviceKind::Light);
    }

    #[test]
    fn should_toggle_from_off_to_on() {
        let light = VirtualLight::new("light.desk", "Desk");
        assert_eq!(light.apply(&Command::Toggle), Ok(DeviceValue::Bool(true)));
        assert_eq!(light.apply(&Command::Toggle), Ok(DeviceValue::Bool(false)));
    }

    #[test]
    fn should_turn_off_when_dimmed_to_zero() {
        let light = VirtualLight::new("light.desk", "Desk");
        light.apply(&Command::SetBrightness(40)).unwrap();
        assert!(light.is_on());
        assert_eq!(light.brightness(), 40);
        light.apply(&Command::SetBrightness(0)).unwrap();
        assert!(!light.is_on());
    }

    #[test]
    fn should_remember_color() {
        let light = VirtualLight::new("light.desk", "Desk");
        light.apply(&Command::SetColor("#ff8800".to_string())).unwrap();
        assert_eq!(light.color().as_deref(), Some("#ff8800"));
    }

    #[test]
    fn should_reject_color_temperature_out_of_range() {
        let light = VirtualLight::new("light.desk", "Desk");
        assert!(light.apply(&Command::SetTemperature(20_000)).is_err());
        assert_eq!(light.color_temperature(), None);
        light.apply(&Command::SetTemperature(2700)).unwrap();
        assert_eq!(light.color_temperature(), Some(2700));
    }
}
