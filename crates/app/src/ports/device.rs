//! Device ports — issuing commands and reading the host's device snapshot.

use std::future::Future;
use std::time::Duration;

use homeflow_domain::device::{Device, DeviceValue};
use homeflow_domain::error::HomeflowError;
use homeflow_domain::id::DeviceId;
use homeflow_domain::time::{Timestamp, now};

/// What a device reported back after a command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub success: bool,
    pub new_state: Option<DeviceValue>,
    pub error: Option<String>,
    pub duration: Duration,
    pub timestamp: Timestamp,
}

impl CommandOutcome {
    /// The device accepted the command.
    #[must_use]
    pub fn ok(new_state: Option<DeviceValue>, duration: Duration) -> Self {
        Self {
            success: true,
            new_state,
            error: None,
            duration,
            timestamp: now(),
        }
    }

    /// The device answered and refused the command.
    #[must_use]
    pub fn rejected(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            new_state: None,
            error: Some(error.into()),
            duration,
            timestamp: now(),
        }
    }
}

/// Sends commands to physical (or simulated) devices.
///
/// An `Err` means the command never reached a verdict (transport failure)
/// and may be retried. An `Ok` outcome with `success == false` is an
/// explicit refusal by the device and is final.
pub trait DeviceController {
    fn turn_on(
        &self,
        device: &Device,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send;

    fn turn_off(
        &self,
        device: &Device,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send;

    /// Set brightness as a percentage in `0..=100`.
    fn set_brightness(
        &self,
        device: &Device,
        percent: u8,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send;

    /// Set colour from a `#rrggbb` hex string.
    fn set_color(
        &self,
        device: &Device,
        hex: &str,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send;

    /// Set colour temperature in Kelvin.
    fn set_color_temperature(
        &self,
        device: &Device,
        kelvin: u32,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send;
}

impl<T: DeviceController + Send + Sync> DeviceController for std::sync::Arc<T> {
    fn turn_on(
        &self,
        device: &Device,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
        (**self).turn_on(device)
    }

    fn turn_off(
        &self,
        device: &Device,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
        (**self).turn_off(device)
    }

    fn set_brightness(
        &self,
        device: &Device,
        percent: u8,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
        (**self).set_brightness(device, percent)
    }

    fn set_color(
        &self,
        device: &Device,
        hex: &str,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
        (**self).set_color(device, hex)
    }

    fn set_color_temperature(
        &self,
        device: &Device,
        kelvin: u32,
    ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
        (**self).set_color_temperature(device, kelvin)
    }
}

/// Read model of the devices the host currently knows about.
pub trait DeviceRegistry {
    /// Latest snapshot of a device, if known.
    fn get(&self, id: &DeviceId) -> Option<Device>;

    /// Every known device.
    fn all(&self) -> Vec<Device>;
}

impl<T: DeviceRegistry> DeviceRegistry for std::sync::Arc<T> {
    fn get(&self, id: &DeviceId) -> Option<Device> {
        (**self).get(id)
    }

    fn all(&self) -> Vec<Device> {
        (**self).all()
    }
}
