//! # homeflowd — homeflow daemon
//!
//! Composition root that wires the automation engine to the virtual adapter
//! and runs it until interrupted.
//!
//! ## Responsibilities
//! - Load configuration (`homeflow.toml` + `HOMEFLOW_*` env vars)
//! - Initialise `tracing` with the configured filter
//! - Load the state snapshot (devices, automations, flows, geofences)
//! - Construct the engine components, injecting adapters via port traits
//! - Schedule and watch every automation, run startup flows once
//! - Run the scheduler dispatcher and geofence monitor until Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no engine logic belongs here.

mod config;
mod state;

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use homeflow_adapter_virtual::{SimulatedLocationProvider, VirtualDeviceController};
use homeflow_app::action_executor::ActionExecutor;
use homeflow_app::condition_evaluator::ConditionEvaluator;
use homeflow_app::device_cache::DeviceCache;
use homeflow_app::event_bus::InProcessEventBus;
use homeflow_app::flow_inputs::RegistryInputs;
use homeflow_app::flow_interpreter::FlowInterpreter;
use homeflow_app::geofence_service::GeofenceService;
use homeflow_app::ports::SystemClock;
use homeflow_app::scheduler::Scheduler;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::{Snapshot, runs_at_startup};

const FIX_ACCURACY_M: f64 = 10.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    let snapshot = Snapshot::load(&config.state.path)?;
    tracing::info!(
        devices = snapshot.devices.len(),
        automations = snapshot.automations.len(),
        flows = snapshot.flows.len(),
        geofences = snapshot.geofences.len(),
        "state snapshot loaded"
    );

    // Adapters
    let controller = Arc::new(VirtualDeviceController::demo());
    let cache = Arc::new(DeviceCache::new(controller.devices()));
    cache.update_devices(snapshot.devices.iter().cloned());
    let bus = Arc::new(InProcessEventBus::default());
    let location = Arc::new(SimulatedLocationProvider::default());

    // Engine
    let executor = Arc::new(
        ActionExecutor::new(Arc::clone(&cache), Arc::clone(&controller))
            .with_options(config.execution_options()),
    );
    let scheduler = Arc::new(Scheduler::new(
        SystemClock,
        Arc::clone(&executor),
        Arc::clone(&bus),
        config.scheduler_config(),
    ));
    let evaluator = Arc::new(ConditionEvaluator::new(
        Arc::clone(&cache),
        Arc::clone(&executor),
        Arc::clone(&bus),
        config.condition_config(),
    ));
    let geofences = Arc::new(GeofenceService::new(
        Arc::clone(&executor),
        Arc::clone(&bus),
        config.geofence_config(),
    ));
    let interpreter = FlowInterpreter::new(
        Arc::clone(&executor),
        RegistryInputs::new(Arc::clone(&cache), SystemClock)
            .with_temperature_sensor("sensor.living_temperature"),
        Arc::clone(&bus),
    );

    // Event log
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    event = %event.event_type,
                    subject = event.subject.as_deref().unwrap_or("-"),
                    data = %event.data,
                    "event"
                ),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Device updates feed the cache and the condition evaluator
    let updates = controller.updates();
    {
        let cache = Arc::clone(&cache);
        let evaluator = Arc::clone(&evaluator);
        tokio::spawn(async move {
            let mut updates = pin!(updates);
            while let Some(device) = updates.next().await {
                cache.upsert(device.clone());
                evaluator.dispatch_device_state(&device);
            }
        });
    }

    // Geofences and automations
    for geofence in snapshot.geofences {
        let name = geofence.name.clone();
        if let Err(err) = geofences.insert_geofence(geofence) {
            tracing::warn!(%err, geofence = %name, "skipping geofence");
        }
    }
    for automation in &snapshot.automations {
        if let Err(err) = scheduler.schedule(automation) {
            tracing::warn!(%err, automation_id = %automation.id, "automation not scheduled");
        }
        if let Err(err) = evaluator.watch(automation) {
            tracing::warn!(%err, automation_id = %automation.id, "automation not watched");
        }
        geofences.watch(automation);
    }
    for task in scheduler.next_runs() {
        tracing::info!(automation_id = %task.automation_id, next_run = %task.next_run, "armed");
    }

    // Flows
    for flow in &snapshot.flows {
        let report = interpreter.validate_flow(flow);
        if !report.is_valid() {
            tracing::warn!(
                flow_id = %flow.id,
                errors = ?report.error_messages(),
                "flow failed validation"
            );
            continue;
        }
        if runs_at_startup(flow) {
            let result = interpreter.execute_flow(flow).await;
            tracing::info!(
                flow_id = %flow.id,
                status = ?result.status,
                nodes = result.executed_nodes.len(),
                "startup flow finished"
            );
        }
    }

    // Background loops
    let dispatcher = scheduler.spawn();
    match geofences.start_monitoring(Arc::clone(&location)).await {
        Ok(()) if !snapshot.location_track.is_empty() => {
            location.replay(
                snapshot.location_track,
                FIX_ACCURACY_M,
                Duration::from_secs(config.geofence.poll_interval_secs),
            );
        }
        Ok(()) => {}
        Err(err) => tracing::warn!(%err, "geofence monitoring unavailable"),
    }

    tracing::info!("homeflowd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    dispatcher.abort();
    geofences.stop_monitoring();
    tracing::info!(runs = scheduler.history().len(), "homeflowd stopped");
    Ok(())
}
