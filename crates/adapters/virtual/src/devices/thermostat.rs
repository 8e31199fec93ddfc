//! Virtual thermostat — heating on/off and a setpoint in degrees.

use std::sync::{Mutex, PoisonError};

use homeflow_domain::automation::Command;
use homeflow_domain::device::{Device, DeviceKind, DeviceValue};
use homeflow_domain::id::DeviceId;

const SETPOINT_RANGE: std::ops::RangeInclusive<u32> = 5..=30;

#[derive(Debug, Clone, Copy)]
struct ThermostatState {
    heating: bool,
    setpoint: u32,
}

/// A simulated thermostat reporting its setpoint.
///
/// `SetTemperature` carries degrees here, not Kelvin.
pub struct VirtualThermostat {
    id: DeviceId,
    name: String,
    state: Mutex<ThermostatState>,
}

impl VirtualThermostat {
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>, setpoint: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: Mutex::new(ThermostatState {
                heating: false,
                setpoint,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    fn current(&self) -> ThermostatState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_heating(&self) -> bool {
        self.current().heating
    }

    #[must_use]
    pub fn setpoint(&self) -> u32 {
        self.current().setpoint
    }

    #[must_use]
    pub fn snapshot(&self) -> Device {
        Device::new(
            self.id.clone(),
            self.name.clone(),
            DeviceValue::Number(f64::from(self.setpoint())),
        )
        .with_kind(DeviceKind::Thermostat)
    }

    /// # Errors
    ///
    /// Refuses colour commands and setpoints outside 5–30 degrees.
    pub fn apply(&self, command: &Command) -> Result<DeviceValue, String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match command {
            Command::TurnOn => state.heating = true,
            Command::TurnOff => state.heating = false,
            Command::Toggle => state.heating = !state.heating,
            Command::SetTemperature(degrees) if SETPOINT_RANGE.contains(degrees) => {
                state.setpoint = *degrees;
                state.heating = true;
            }
            Command::SetTemperature(degrees) => {
                return Err(format!("setpoint {degrees} is outside 5..=30"));
            }
            Command::SetBrightness(_) | Command::SetColor(_) => {
                return Err(format!("{} has no light", self.name));
            }
        }
        Ok(DeviceValue::Number(f64::from(state.setpoint)))
    }
}
