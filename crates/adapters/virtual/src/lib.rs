//! # homeflow-adapter-virtual
//!
//! Simulated devices and location fixes for testing and demonstration.
//!
//! ## Provided devices ([`VirtualDeviceController::demo`])
//!
//! | Device | Device ID | Behaviour |
//! |--------|-----------|-----------|
//! | Virtual Light | `light.living_room`, `light.hallway` | On/off, brightness, colour, colour temperature |
//! | Virtual Switch | `switch.coffee_maker` | On/off and toggle only |
//! | Virtual Sensor | `sensor.living_temperature` | Read-only numeric reading |
//! | Virtual Thermostat | `thermostat.hall` | Heating on/off and a setpoint in degrees |
//!
//! [`SimulatedLocationProvider`] implements the location port; fixes are
//! pushed by hand or replayed from a track.
//!
//! ## Dependency rule
//!
//! Depends on `homeflow-app` (port traits) and `homeflow-domain` only.

mod controller;
mod devices;
mod location;

pub use controller::VirtualDeviceController;
pub use devices::{VirtualDevice, VirtualLight, VirtualSensor, VirtualSwitch, VirtualThermostat};
pub use location::SimulatedLocationProvider;
