//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the engine and the outside world.
//! They are defined here (in `app`) so that both the engine components and
//! the adapter layer can depend on them without creating circular
//! dependencies.

pub mod clock;
pub mod device;
pub mod event_bus;
pub mod flow_inputs;
pub mod location;
pub mod runner;

pub use clock::{Clock, SystemClock};
pub use device::{CommandOutcome, DeviceController, DeviceRegistry};
pub use event_bus::EventPublisher;
pub use flow_inputs::FlowInputs;
pub use location::LocationProvider;
pub use runner::{ActionRunner, AutomationRunner};
