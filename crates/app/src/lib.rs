//! # homeflow-app
//!
//! Engine layer — the automation components and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceController` — issue commands to physical devices
//!   - `DeviceRegistry` — read the current device snapshot
//!   - `LocationProvider` — position fixes for geofencing
//!   - `Clock` — wall-clock time in the host's zone
//!   - `FlowInputs` — live readings for flow condition nodes
//!   - `EventPublisher` — notification sink
//! - Define the **execution callbacks** (`AutomationRunner`, `ActionRunner`)
//!   that decouple "something fired" from "run these actions"
//! - Provide the engine components:
//!   - `ActionExecutor` — retries, timeouts, parallelism, rollback
//!   - `Scheduler` — time and sun triggers, drift detection
//!   - `ConditionEvaluator` — edge-triggered device conditions with cooldown
//!   - `FlowInterpreter` — node-graph execution
//!   - `GeofenceService` — enter/leave detection
//! - Provide **in-process infrastructure** (event bus, device cache) that
//!   doesn't need IO
//!
//! ## Dependency rule
//! Depends on `homeflow-domain` only (plus `tokio` for timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod action_executor;
pub mod condition_evaluator;
pub mod device_cache;
pub mod event_bus;
pub mod flow_inputs;
pub mod flow_interpreter;
pub mod geofence_service;
pub mod ports;
pub mod scheduler;
