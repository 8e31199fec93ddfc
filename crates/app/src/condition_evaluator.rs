//! Condition evaluator — fires automations on device-state edges.
//!
//! Every condition trigger of a watched automation becomes a
//! [`Subscription`], indexed by device id so an update only touches the
//! subscriptions of that device. An automation fires when a subscription
//! goes from not-met to met, unless its cooldown is still running.
//!
//! The automation snapshot is captured at [`watch`](ConditionEvaluator::watch)
//! time, so resolving a subscription back to its automation never waits on
//! another component.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use homeflow_domain::automation::{Automation, CompareOp, Trigger};
use homeflow_domain::device::{Device, DeviceValue};
use homeflow_domain::error::HomeflowError;
use homeflow_domain::event::{Event, EventType};
use homeflow_domain::id::{AutomationId, DeviceId};
use homeflow_domain::time::{Timestamp, now};

use crate::ports::{AutomationRunner, DeviceRegistry, EventPublisher};

/// Tuning for [`ConditionEvaluator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    /// Minimum time between two fires of the same automation.
    pub cooldown: Duration,
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Result of evaluating one trigger against one device snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationOutcome {
    pub met: bool,
    pub debug: String,
}

/// One watched condition trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub automation_id: AutomationId,
    /// Position of the trigger inside its automation.
    pub trigger_index: usize,
    pub device_id: DeviceId,
    pub trigger: Trigger,
    /// `None` until the first evaluation.
    pub last_result: Option<bool>,
    pub last_evaluated: Option<Timestamp>,
}

/// Cooldown state of an automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HysteresisStatus {
    pub in_cooldown: bool,
    /// Time since the last fire, if it ever fired.
    pub since_last_fire: Option<Duration>,
    pub remaining: Duration,
}

type SubscriptionKey = (AutomationId, usize);

#[derive(Default)]
struct State {
    automations: HashMap<AutomationId, Automation>,
    subscriptions: HashMap<SubscriptionKey, Subscription>,
    by_device: HashMap<DeviceId, Vec<SubscriptionKey>>,
    last_fired: HashMap<AutomationId, Instant>,
}

impl State {
    /// Drop the subscriptions of `id`, keeping its cooldown.
    fn detach(&mut self, id: AutomationId) -> bool {
        let existed = self.automations.remove(&id).is_some();
        self.subscriptions.retain(|(owner, _), _| *owner != id);
        self.by_device.retain(|_, keys| {
            keys.retain(|(owner, _)| *owner != id);
            !keys.is_empty()
        });
        existed
    }

    fn remove(&mut self, id: AutomationId) -> bool {
        self.last_fired.remove(&id);
        self.detach(id)
    }
}

/// Watches device updates and fires automations on condition edges.
pub struct ConditionEvaluator<G, R, P> {
    registry: G,
    runner: R,
    publisher: P,
    config: ConditionConfig,
    state: Mutex<State>,
}

impl<G, R, P> ConditionEvaluator<G, R, P>
where
    G: DeviceRegistry,
    R: AutomationRunner + Sync,
    P: EventPublisher + Sync,
{
    pub fn new(registry: G, runner: R, publisher: P, config: ConditionConfig) -> Self {
        Self {
            registry,
            runner,
            publisher,
            config,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start watching the condition triggers of `automation`.
    ///
    /// Replaces any previous subscriptions of the same automation; a running
    /// cooldown survives the replacement. Disabled automations are only
    /// unwatched. When the registry already knows a
    /// watched device, the subscription is seeded with its current result
    /// so the first update can already be an edge; seeding never fires.
    ///
    /// Returns the number of subscriptions created.
    ///
    /// # Errors
    ///
    /// Returns [`HomeflowError::Config`] when a trigger is misconfigured; the
    /// automation is then not watched at all.
    #[tracing::instrument(skip(self, automation), fields(automation_id = %automation.id))]
    pub fn watch(&self, automation: &Automation) -> Result<usize, HomeflowError> {
        if let Err(err) = automation.validate_triggers() {
            tracing::warn!(%err, "skipping misconfigured automation");
            self.lock().remove(automation.id);
            return Err(err.into());
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if !automation.enabled {
            state.remove(automation.id);
            tracing::debug!("automation disabled, not watching");
            return Ok(0);
        }
        state.detach(automation.id);

        let mut created = 0;
        for (index, trigger) in automation.condition_triggers() {
            let Some(device_id) = trigger.device_id().cloned() else {
                continue;
            };
            let seeded = self
                .registry
                .get(&device_id)
                .map(|device| evaluate_condition(trigger, &device).met);
            let key = (automation.id, index);
            state.subscriptions.insert(
                key,
                Subscription {
                    automation_id: automation.id,
                    trigger_index: index,
                    device_id: device_id.clone(),
                    trigger: trigger.clone(),
                    last_result: seeded,
                    last_evaluated: seeded.map(|_| now()),
                },
            );
            state.by_device.entry(device_id).or_default().push(key);
            created += 1;
        }

        if created > 0 {
            state.automations.insert(automation.id, automation.clone());
            tracing::info!(subscriptions = created, "watching automation");
        }
        Ok(created)
    }

    /// Stop watching an automation. Returns whether it was watched.
    pub fn unwatch(&self, id: AutomationId) -> bool {
        let removed = self.lock().remove(id);
        if removed {
            tracing::info!(automation_id = %id, "unwatched automation");
        }
        removed
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        *self.lock() = State::default();
    }

    /// Feed one device update. Returns the automations that fired.
    ///
    /// Every subscription on the device is re-evaluated and its
    /// `last_result` updated, whether or not anything fires. Runs happen
    /// after the internal lock is released and are awaited in order.
    #[tracing::instrument(skip(self, device), fields(device_id = %device.id))]
    pub async fn update_device_state(&self, device: &Device) -> Vec<AutomationId> {
        let to_fire = self.collect_fires(device);
        for automation in &to_fire {
            self.fire(automation, device).await;
        }
        to_fire.into_iter().map(|a| a.id).collect()
    }

    /// Feed a batch of device updates, in order.
    pub async fn update_devices(&self, devices: &[Device]) -> Vec<AutomationId> {
        let mut fired = Vec::new();
        for device in devices {
            fired.extend(self.update_device_state(device).await);
        }
        fired
    }

    fn collect_fires(&self, device: &Device) -> Vec<Automation> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(keys) = state.by_device.get(&device.id) else {
            return Vec::new();
        };

        let now_instant = Instant::now();
        let mut to_fire: Vec<Automation> = Vec::new();
        for key in keys {
            let Some(subscription) = state.subscriptions.get_mut(key) else {
                continue;
            };
            let outcome = evaluate_condition(&subscription.trigger, device);
            let previous = subscription.last_result.replace(outcome.met);
            subscription.last_evaluated = Some(now());
            tracing::debug!(automation_id = %key.0, met = outcome.met, debug = %outcome.debug, "condition evaluated");

            if previous != Some(false) || !outcome.met {
                continue;
            }
            if to_fire.iter().any(|a| a.id == key.0) {
                continue;
            }
            let cooling = state
                .last_fired
                .get(&key.0)
                .is_some_and(|last| now_instant.duration_since(*last) < self.config.cooldown);
            if cooling {
                tracing::debug!(automation_id = %key.0, "edge suppressed by cooldown");
                continue;
            }
            if let Some(automation) = state.automations.get(&key.0) {
                state.last_fired.insert(key.0, now_instant);
                to_fire.push(automation.clone());
            }
        }
        to_fire
    }

    async fn fire(&self, automation: &Automation, device: &Device) {
        tracing::info!(automation_id = %automation.id, device_id = %device.id, "condition met, running automation");
        let _ = self
            .publisher
            .publish(Event::about(
                EventType::AutomationTriggered,
                automation.id,
                serde_json::json!({
                    "name": automation.name,
                    "trigger": "condition",
                    "device_id": device.id,
                    "value": device.value,
                }),
            ))
            .await;

        if let Err(err) = self.runner.run(automation).await {
            tracing::error!(automation_id = %automation.id, %err, "automation failed");
            let _ = self
                .publisher
                .publish(Event::about(
                    EventType::AutomationFailed,
                    automation.id,
                    serde_json::json!({ "name": automation.name, "error": err.to_string() }),
                ))
                .await;
        }
    }

    /// Evaluate a trigger against a device snapshot without side effects.
    #[must_use]
    pub fn evaluate_condition(&self, trigger: &Trigger, device: &Device) -> EvaluationOutcome {
        evaluate_condition(trigger, device)
    }

    /// Cooldown state of an automation.
    #[must_use]
    pub fn get_hysteresis_status(&self, id: AutomationId) -> HysteresisStatus {
        let since = self
            .lock()
            .last_fired
            .get(&id)
            .map(|last| Instant::now().duration_since(*last));
        let remaining = since.map_or(Duration::ZERO, |since| {
            self.config.cooldown.saturating_sub(since)
        });
        HysteresisStatus {
            in_cooldown: !remaining.is_zero(),
            since_last_fire: since,
            remaining,
        }
    }

    /// Subscriptions registered for a device.
    #[must_use]
    pub fn subscriptions_for(&self, device_id: &DeviceId) -> Vec<Subscription> {
        let state = self.lock();
        state
            .by_device
            .get(device_id)
            .into_iter()
            .flatten()
            .filter_map(|key| state.subscriptions.get(key).cloned())
            .collect()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }
}

impl<G, R, P> ConditionEvaluator<G, R, P>
where
    G: DeviceRegistry + Send + Sync + 'static,
    R: AutomationRunner + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Feed one device update without waiting for the runs.
    ///
    /// Edges and cooldowns are decided before returning, exactly as in
    /// [`update_device_state`](Self::update_device_state); each fired
    /// automation then runs in its own task.
    pub fn dispatch_device_state(self: &Arc<Self>, device: &Device) -> Vec<AutomationId> {
        let to_fire = self.collect_fires(device);
        let fired = to_fire.iter().map(|a| a.id).collect();
        for automation in to_fire {
            let evaluator = Arc::clone(self);
            let device = device.clone();
            tokio::spawn(async move {
                evaluator.fire(&automation, &device).await;
            });
        }
        fired
    }
}

/// Compare a device value with a condition trigger.
///
/// Booleans match when they equal `threshold == 1` (or a boolean `value`),
/// numbers go through the operator, text must equal `value`. Anything else
/// is not met.
#[must_use]
pub fn evaluate_condition(trigger: &Trigger, device: &Device) -> EvaluationOutcome {
    let Trigger::Condition {
        operator,
        threshold,
        value,
        ..
    } = trigger
    else {
        return EvaluationOutcome {
            met: false,
            debug: format!("{trigger} is not a condition trigger"),
        };
    };

    match &device.value {
        DeviceValue::Bool(actual) => {
            let expected = match (value, threshold) {
                (Some(serde_json::Value::Bool(expected)), _) => Some(*expected),
                (_, Some(threshold)) => Some(CompareOp::Equal.compare(*threshold, 1.0)),
                _ => None,
            };
            match expected {
                Some(expected) => EvaluationOutcome {
                    met: *actual == expected,
                    debug: format!("{actual} == {expected}"),
                },
                None => unmet(format!("boolean {actual} without threshold")),
            }
        }
        DeviceValue::Number(actual) => match (operator, threshold) {
            (Some(op), Some(threshold)) => {
                let met = op.compare(*actual, *threshold);
                EvaluationOutcome {
                    met,
                    debug: format!("{actual} {op} {threshold} is {met}"),
                }
            }
            _ => unmet(format!("number {actual} without operator and threshold")),
        },
        DeviceValue::Text(actual) => match value {
            Some(serde_json::Value::String(expected)) => EvaluationOutcome {
                met: actual == expected,
                debug: format!("{actual:?} == {expected:?}"),
            },
            _ => unmet(format!("text {actual:?} without string value")),
        },
    }
}

fn unmet(debug: String) -> EvaluationOutcome {
    EvaluationOutcome { met: false, debug }
}
