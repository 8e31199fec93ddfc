//! [`DeviceController`] over in-memory virtual devices.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;

use homeflow_app::ports::{CommandOutcome, DeviceController};
use homeflow_domain::automation::Command;
use homeflow_domain::device::Device;
use homeflow_domain::error::{DeviceError, HomeflowError};
use homeflow_domain::id::DeviceId;

use crate::devices::{VirtualDevice, VirtualLight, VirtualSensor, VirtualSwitch, VirtualThermostat};

/// Simulated device fleet.
///
/// Every accepted command (and every sensor reading) is announced as a
/// fresh [`Device`] snapshot on [`subscribe`](Self::subscribe) so the host
/// can refresh its cache and feed the condition evaluator. Devices can be
/// marked unreachable to simulate transport failures.
pub struct VirtualDeviceController {
    devices: BTreeMap<DeviceId, VirtualDevice>,
    unreachable: Mutex<HashSet<DeviceId>>,
    latency: Duration,
    updates: broadcast::Sender<Device>,
}

impl Default for VirtualDeviceController {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            devices: BTreeMap::new(),
            unreachable: Mutex::new(HashSet::new()),
            latency: Duration::ZERO,
            updates,
        }
    }
}

impl VirtualDeviceController {
    /// The demo household used by `homeflowd`.
    #[must_use]
    pub fn demo() -> Self {
        Self::default()
            .with_device(VirtualLight::new("light.living_room", "Living room light"))
            .with_device(VirtualLight::new("light.hallway", "Hallway light"))
            .with_device(VirtualSwitch::new("switch.coffee_maker", "Coffee maker"))
            .with_device(VirtualSensor::new("sensor.living_temperature", "Living room temperature", 21.5))
            .with_device(VirtualThermostat::new("thermostat.hall", "Hall thermostat", 19))
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<VirtualDevice>) -> Self {
        let device = device.into();
        self.devices.insert(device.id().clone(), device);
        self
    }

    /// Delay applied to every command.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Snapshots of every device, ordered by id.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.devices.values().map(VirtualDevice::snapshot).collect()
    }

    #[must_use]
    pub fn device(&self, id: &DeviceId) -> Option<&VirtualDevice> {
        self.devices.get(id)
    }

    /// Make commands to `id` fail with a transient error until reset.
    pub fn set_unreachable(&self, id: impl Into<DeviceId>, unreachable: bool) {
        let id = id.into();
        let mut set = self.unreachable.lock().unwrap_or_else(PoisonError::into_inner);
        if unreachable {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    fn is_unreachable(&self, id: &DeviceId) -> bool {
        self.unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Change a sensor reading and announce the new snapshot.
    ///
    /// Returns `None` when `id` is not a sensor.
    pub fn set_reading(&self, id: &DeviceId, value: f64) -> Option<Device> {
        let Some(VirtualDevice::Sensor(sensor)) = self.devices.get(id) else {
            return None;
        };
        sensor.set_reading(value);
        let snapshot = sensor.snapshot();
        self.announce(snapshot.clone());
        Some(snapshot)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Device> {
        self.updates.subscribe()
    }

    /// Device snapshots as a stream; lagged snapshots are skipped.
    pub fn updates(&self) -> impl Stream<Item = Device> + Send + use<> {
        BroadcastStream::new(self.updates.subscribe())
            .filter_map(|update| futures::future::ready(update.ok()))
    }

    fn announce(&self, snapshot: Device) {
        // no subscribers is fine
        let _ = self.updates.send(snapshot);
    }

    async fn dispatch(
        &self,
        device: &Device,
        command: Command,
    ) -> Result<CommandOutcome, HomeflowError> {
        let started = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.is_unreachable(&device.id) {
            tracing::debug!(device_id = %device.id, "virtual device unreachable");
            return Err(DeviceError::transient(format!("{} is unreachable", device.id)).into());
        }
        let Some(target) = self.devices.get(&device.id) else {
            return Ok(CommandOutcome::rejected(
                format!("unknown virtual device {}", device.id),
                started.elapsed(),
            ));
        };

        match target.apply(&command) {
            Ok(value) => {
                tracing::debug!(device_id = %device.id, ?command, %value, "virtual device updated");
                self.announce(target.snapshot());
                Ok(CommandOutcome::ok(Some(value), started.elapsed()))
            }
            Err(reason) => {
                tracing::warn!(device_id = %device.id, ?command, %reason, "virtual device refused command");
                Ok(CommandOutcome::rejected(reason, started.elapsed()))
            }
        }
    }
}

impl DeviceController for VirtualDeviceController {
    async fn turn_on(&self, device: &Device) -> Result<CommandOutcome, HomeflowError> {
        self.dispatch(device, Command::TurnOn).await
    }

    async fn turn_off(&self, device: &Device) -> Result<CommandOutcome, HomeflowError> {
        self.dispatch(device, Command::TurnOff).await
    }

    async fn set_brightness(
        &self,
        device: &Device,
        percent: u8,
    ) -> Result<CommandOutcome, HomeflowError> {
        self.dispatch(device, Command::SetBrightness(percent)).await
    }

    async fn set_color(&self, device: &Device, hex: &str) -> Result<CommandOutcome, HomeflowError> {
        self.dispatch(device, Command::SetColor(hex.to_string())).await
    }

    async fn set_color_temperature(
        &self,
        device: &Device,
        kelvin: u32,
    ) -> Result<CommandOutcome, HomeflowError> {
        self.dispatch(device, Command::SetTemperature(kelvin)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeflow_domain::device::DeviceValue;

    fn snapshot(controller: &VirtualDeviceController, id: &str) -> Device {
        controller
            .device(&DeviceId::from(id))
            .map(VirtualDevice::snapshot)
            .unwrap()
    }

    #[tokio::test]
    async fn should_list_demo_devices_in_id_order() {
        let controller = VirtualDeviceController::demo();
        let ids: Vec<String> = controller
            .devices()
            .into_iter()
            .map(|d| d.id.to_string())
            .collect();
        assert_eq!(
            ids,
            [
                "light.hallway",
                "light.living_room",
                "sensor.living_temperature",
                "switch.coffee_maker",
                "thermostat.hall",
            ]
        );
    }

    #[tokio::test]
    async fn should_turn_light_on_and_announce_snapshot() {
        let controller = VirtualDeviceController::demo();
        let mut rx = controller.subscribe();
        let lamp = snapshot(&controller, "light.hallway");

        let outcome = controller.turn_on(&lamp).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.new_state, Some(DeviceValue::Bool(true)));
        let announced = rx.recv().await.unwrap();
        assert_eq!(announced.id, lamp.id);
        assert!(announced.is_on());
    }

    #[tokio::test]
    async fn should_reject_unsupported_command_without_error() {
        let controller = VirtualDeviceController::demo();
        let coffee = snapshot(&controller, "switch.coffee_maker");

        let outcome = controller.set_brightness(&coffee, 50).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Coffee maker only switches on and off"));
    }

    #[tokio::test]
    async fn should_reject_unknown_device() {
        let controller = VirtualDeviceController::default();
        let ghost = Device::new("ghost", "Ghost", DeviceValue::Bool(false));
        let outcome = controller.turn_on(&ghost).await.unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn should_fail_transiently_while_unreachable() {
        let controller = VirtualDeviceController::demo();
        let lamp = snapshot(&controller, "light.hallway");
        controller.set_unreachable("light.hallway", true);

        let err = controller.turn_on(&lamp).await.unwrap_err();
        assert!(err.is_transient());

        controller.set_unreachable("light.hallway", false);
        assert!(controller.turn_on(&lamp).await.unwrap().success);
    }

    #[tokio::test(start_paused = true)]
    async fn should_apply_configured_latency() {
        let controller = VirtualDeviceController::demo().with_latency(Duration::from_millis(250));
        let lamp = snapshot(&controller, "light.hallway");
        let outcome = controller.turn_on(&lamp).await.unwrap();
        assert!(outcome.duration >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn should_stream_sensor_readings() {
        let controller = VirtualDeviceController::demo();
        let mut updates = Box::pin(controller.updates());
        let id = DeviceId::from("sensor.living_temperature");

        controller.set_reading(&id, 26.0).unwrap();

        let update = updates.next().await.unwrap();
        assert_eq!(update.value, DeviceValue::Number(26.0));
        assert!(controller.set_reading(&DeviceId::from("light.hallway"), 1.0).is_none());
    }
}
