//! Action executor — runs a batch of device actions with retry, backoff,
//! timeout and rollback.
//!
//! `execute` never fails: every outcome, including a panic while
//! orchestrating the batch, is reported through [`ExecutionResult`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use homeflow_domain::automation::{Action, ActionKind, Automation, Command};
use homeflow_domain::device::Device;
use homeflow_domain::error::{DeviceError, HomeflowError, NotFoundError, TimeoutError};
use homeflow_domain::id::DeviceId;
use homeflow_domain::time::{Timestamp, now};

use crate::ports::{ActionRunner, AutomationRunner, DeviceController, DeviceRegistry};

/// Knobs for one call to [`ActionExecutor::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Retries after the first attempt; at most `max_retries + 1` attempts.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every further retry.
    pub retry_delay: Duration,
    /// Deadline for a single attempt.
    pub timeout: Duration,
    pub parallel: bool,
    pub rollback: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(5000),
            parallel: false,
            rollback: false,
        }
    }
}

impl ExecutionOptions {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }

    /// Delay before retry number `retry` (1-based).
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.retry_delay.saturating_mul(factor)
    }
}

/// Outcome of a single action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionExecutionResult {
    pub device_id: DeviceId,
    pub action: ActionKind,
    pub success: bool,
    pub duration: Duration,
    pub retries: u32,
    pub error: Option<String>,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub actions: Vec<ActionExecutionResult>,
    /// `true` iff every action ran and succeeded.
    pub success: bool,
    pub total_duration: Duration,
    pub timestamp: Timestamp,
    /// Devices whose successful action was reversed, in reversal order.
    pub rolled_back: Vec<DeviceId>,
    /// Set when the batch failed as a whole rather than per action.
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A failed result that carries no per-action outcomes.
    #[must_use]
    pub fn aborted(error: impl Into<String>, total_duration: Duration, timestamp: Timestamp) -> Self {
        Self {
            actions: Vec::new(),
            success: false,
            total_duration,
            timestamp,
            rolled_back: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Human-readable summary of what went wrong, if anything did.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        if self.success {
            return None;
        }
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        let failures: Vec<String> = self
            .actions
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "{} {}: {}",
                    r.action,
                    r.device_id,
                    r.error.as_deref().unwrap_or("failed")
                )
            })
            .collect();
        if failures.is_empty() {
            Some("not every action ran".to_string())
        } else {
            Some(failures.join("; "))
        }
    }
}

/// Executes device actions through a [`DeviceController`], resolving
/// devices through a [`DeviceRegistry`].
pub struct ActionExecutor<R, D> {
    registry: R,
    controller: D,
    options: ExecutionOptions,
}

impl<R, D> ActionExecutor<R, D>
where
    R: DeviceRegistry + Sync,
    D: DeviceController + Sync,
{
    /// Create an executor using the default [`ExecutionOptions`] for
    /// automation runs.
    pub fn new(registry: R, controller: D) -> Self {
        Self {
            registry,
            controller,
            options: ExecutionOptions::default(),
        }
    }

    /// Options used when running automations and flow actions.
    #[must_use]
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Run `actions` and report what happened.
    #[tracing::instrument(skip(self, actions), fields(count = actions.len()))]
    pub async fn execute(&self, actions: &[Action], options: &ExecutionOptions) -> ExecutionResult {
        let started = Instant::now();
        let timestamp = now();

        match AssertUnwindSafe(self.orchestrate(actions, options))
            .catch_unwind()
            .await
        {
            Ok((results, rolled_back)) => {
                let success =
                    results.len() == actions.len() && results.iter().all(|r| r.success);
                ExecutionResult {
                    actions: results,
                    success,
                    total_duration: started.elapsed(),
                    timestamp,
                    rolled_back,
                    error: None,
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(error = %message, "action orchestration panicked");
                ExecutionResult::aborted(message, started.elapsed(), timestamp)
            }
        }
    }

    async fn orchestrate(
        &self,
        actions: &[Action],
        options: &ExecutionOptions,
    ) -> (Vec<ActionExecutionResult>, Vec<DeviceId>) {
        let results = if options.parallel {
            join_all(actions.iter().map(|action| self.execute_one(action, options))).await
        } else {
            let mut results = Vec::with_capacity(actions.len());
            for action in actions {
                let result = self.execute_one(action, options).await;
                let failed = !result.success;
                results.push(result);
                if failed && !options.rollback {
                    tracing::debug!("stopping batch after first failure");
                    break;
                }
            }
            results
        };

        let all_ok = results.len() == actions.len() && results.iter().all(|r| r.success);
        let rolled_back = if options.rollback && !all_ok {
            self.rollback(actions, &results, options).await
        } else {
            Vec::new()
        };

        (results, rolled_back)
    }

    async fn execute_one(&self, action: &Action, options: &ExecutionOptions) -> ActionExecutionResult {
        let started = Instant::now();
        let finish = |success: bool, retries: u32, error: Option<String>| ActionExecutionResult {
            device_id: action.device_id.clone(),
            action: action.action,
            success,
            duration: started.elapsed(),
            retries,
            error,
        };

        let command = match action.command() {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(device_id = %action.device_id, %err, "invalid action");
                return finish(false, 0, Some(HomeflowError::from(err).to_string()));
            }
        };

        let Some(device) = self.registry.get(&action.device_id) else {
            let err = HomeflowError::from(NotFoundError {
                entity: "Device",
                id: action.device_id.to_string(),
            });
            tracing::warn!(device_id = %action.device_id, "device not found");
            return finish(false, 0, Some(err.to_string()));
        };

        let mut retries = 0;
        loop {
            match self.attempt(&device, &command, options.timeout).await {
                Ok(()) => {
                    tracing::debug!(device_id = %action.device_id, action = %action.action, retries, "action succeeded");
                    return finish(true, retries, None);
                }
                Err(err) if err.is_transient() && retries < options.max_retries => {
                    retries += 1;
                    let delay = options.backoff(retries);
                    tracing::warn!(
                        device_id = %action.device_id,
                        attempt = retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %err,
                        "action failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(device_id = %action.device_id, action = %action.action, retries, %err, "action failed");
                    return finish(false, retries, Some(err.to_string()));
                }
            }
        }
    }

    /// One attempt raced against `timeout`.
    async fn attempt(
        &self,
        device: &Device,
        command: &Command,
        timeout: Duration,
    ) -> Result<(), HomeflowError> {
        let call = async {
            match command {
                Command::TurnOn => self.controller.turn_on(device).await,
                Command::TurnOff => self.controller.turn_off(device).await,
                Command::Toggle if device.is_on() => self.controller.turn_off(device).await,
                Command::Toggle => self.controller.turn_on(device).await,
                Command::SetBrightness(percent) => {
                    self.controller.set_brightness(device, *percent).await
                }
                Command::SetColor(hex) => self.controller.set_color(device, hex).await,
                Command::SetTemperature(kelvin) => {
                    self.controller.set_color_temperature(device, *kelvin).await
                }
            }
        };

        match tokio::time::timeout(timeout, call).await {
            Err(_) => Err(TimeoutError {
                operation: "device command",
                after: timeout,
            }
            .into()),
            Ok(Err(err)) => Err(err),
            Ok(Ok(outcome)) if outcome.success => Ok(()),
            Ok(Ok(outcome)) => Err(DeviceError::rejected(
                outcome
                    .error
                    .unwrap_or_else(|| "device reported failure".to_string()),
            )
            .into()),
        }
    }

    /// Reverse successful on/off actions, newest first. Best effort: one
    /// attempt each, failures are only logged.
    async fn rollback(
        &self,
        actions: &[Action],
        results: &[ActionExecutionResult],
        options: &ExecutionOptions,
    ) -> Vec<DeviceId> {
        let mut reversed = Vec::new();
        for (action, result) in actions.iter().zip(results).rev() {
            if !result.success {
                continue;
            }
            let Some(inverse) = action.action.inverse() else {
                tracing::debug!(device_id = %action.device_id, action = %action.action, "no inverse, leaving as is");
                continue;
            };
            let Some(device) = self.registry.get(&action.device_id) else {
                continue;
            };
            let command = if inverse == ActionKind::TurnOn {
                Command::TurnOn
            } else {
                Command::TurnOff
            };
            match self.attempt(&device, &command, options.timeout).await {
                Ok(()) => {
                    tracing::info!(device_id = %action.device_id, action = %inverse, "rolled back");
                    reversed.push(action.device_id.clone());
                }
                Err(err) => {
                    tracing::warn!(device_id = %action.device_id, %err, "rollback failed");
                }
            }
        }
        reversed
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl<R, D> AutomationRunner for ActionExecutor<R, D>
where
    R: DeviceRegistry + Send + Sync,
    D: DeviceController + Send + Sync,
{
    fn run(
        &self,
        automation: &Automation,
    ) -> impl Future<Output = Result<(), HomeflowError>> + Send {
        async move {
            let result = self.execute(&automation.actions, &self.options).await;
            match result.error_summary() {
                None => Ok(()),
                Some(summary) => Err(DeviceError::rejected(summary).into()),
            }
        }
    }
}

impl<R, D> ActionRunner for ActionExecutor<R, D>
where
    R: DeviceRegistry + Send + Sync,
    D: DeviceController + Send + Sync,
{
    fn run_actions(
        &self,
        actions: &[Action],
    ) -> impl Future<Output = Result<(), HomeflowError>> + Send {
        async move {
            let result = self.execute(actions, &self.options).await;
            match result.error_summary() {
                None => Ok(()),
                Some(summary) => Err(DeviceError::rejected(summary).into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use homeflow_domain::device::DeviceValue;

    use crate::device_cache::DeviceCache;
    use crate::ports::CommandOutcome;

    // ── Fakes ──────────────────────────────────────────────────────

    #[derive(Debug, Clone, Copy)]
    enum Behaviour {
        Ok,
        Delay(Duration),
        Transient,
        Reject,
        Hang,
        Panic,
    }

    #[derive(Default)]
    struct ScriptedController {
        script: Mutex<HashMap<DeviceId, VecDeque<Behaviour>>>,
        calls: Mutex<Vec<(DeviceId, &'static str)>>,
        states: Mutex<HashMap<DeviceId, bool>>,
    }

    impl ScriptedController {
        fn script(&self, device: &str, behaviours: &[Behaviour]) {
            self.script
                .lock()
                .unwrap()
                .insert(DeviceId::from(device), behaviours.iter().copied().collect());
        }

        fn calls(&self) -> Vec<(String, &'static str)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(id, cmd)| (id.to_string(), *cmd))
                .collect()
        }

        fn state(&self, device: &str) -> Option<bool> {
            self.states.lock().unwrap().get(&DeviceId::from(device)).copied()
        }

        fn respond(
            &self,
            device: &Device,
            command: &'static str,
        ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send + use<> {
            let behaviour = self
                .script
                .lock()
                .unwrap()
                .get_mut(&device.id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Behaviour::Ok);
            self.calls
                .lock()
                .unwrap()
                .push((device.id.clone(), command));
            if matches!(behaviour, Behaviour::Ok | Behaviour::Delay(_)) {
                let mut states = self.states.lock().unwrap();
                match command {
                    "turn_on" => {
                        states.insert(device.id.clone(), true);
                    }
                    "turn_off" => {
                        states.insert(device.id.clone(), false);
                    }
                    _ => {}
                }
            }
            assert!(!matches!(behaviour, Behaviour::Panic), "controller exploded");
            async move {
                match behaviour {
                    Behaviour::Ok | Behaviour::Panic => Ok(CommandOutcome::ok(None, Duration::ZERO)),
                    Behaviour::Delay(delay) => {
                        tokio::time::sleep(delay).await;
                        Ok(CommandOutcome::ok(None, delay))
                    }
                    Behaviour::Transient => Err(DeviceError::transient("connection reset").into()),
                    Behaviour::Reject => Ok(CommandOutcome::rejected("device busy", Duration::ZERO)),
                    Behaviour::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(CommandOutcome::ok(None, Duration::ZERO))
                    }
                }
            }
        }
    }

    impl DeviceController for ScriptedController {
        fn turn_on(
            &self,
            device: &Device,
        ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
            self.respond(device, "turn_on")
        }

        fn turn_off(
            &self,
            device: &Device,
        ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
            self.respond(device, "turn_off")
        }

        fn set_brightness(
            &self,
            device: &Device,
            _percent: u8,
        ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
            self.respond(device, "set_brightness")
        }

        fn set_color(
            &self,
            device: &Device,
            _hex: &str,
        ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
            self.respond(device, "set_color")
        }

        fn set_color_temperature(
            &self,
            device: &Device,
            _kelvin: u32,
        ) -> impl Future<Output = Result<CommandOutcome, HomeflowError>> + Send {
            self.respond(device, "set_color_temperature")
        }
    }

    type TestExecutor = ActionExecutor<Arc<DeviceCache>, Arc<ScriptedController>>;

    fn setup(devices: &[(&str, bool)]) -> (TestExecutor, Arc<ScriptedController>) {
        let cache = Arc::new(DeviceCache::new(
            devices
                .iter()
                .map(|(id, on)| Device::new(*id, *id, DeviceValue::Bool(*on))),
        ));
        let controller = Arc::new(ScriptedController::default());
        (
            ActionExecutor::new(cache, Arc::clone(&controller)),
            controller,
        )
    }

    fn on(device: &str) -> Action {
        Action::new(device, ActionKind::TurnOn)
    }

    // ── Sequential ─────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_succeed_when_every_action_succeeds() {
        let (executor, controller) = setup(&[("a", false), ("b", false)]);
        let result = executor
            .execute(&[on("a"), on("b")], &ExecutionOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(result.actions.len(), 2);
        assert!(result.actions.iter().all(|r| r.retries == 0));
        assert_eq!(
            controller.calls(),
            vec![("a".to_string(), "turn_on"), ("b".to_string(), "turn_on")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_at_first_failure_when_rollback_disabled() {
        let (executor, controller) = setup(&[("a", false), ("b", false), ("c", false)]);
        controller.script("b", &[Behaviour::Reject]);
        let result = executor
            .execute(&[on("a"), on("b"), on("c")], &ExecutionOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.actions.len(), 2);
        assert_eq!(controller.state("c"), None);
    }

    // ── Retry & timeout ────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_retry_with_backoff_when_failure_is_transient() {
        let (executor, controller) = setup(&[("a", false)]);
        controller.script("a", &[Behaviour::Transient, Behaviour::Transient]);
        let started = Instant::now();

        let result = executor.execute(&[on("a")], &ExecutionOptions::default()).await;

        assert!(result.success);
        assert_eq!(result.actions[0].retries, 2);
        assert!(started.elapsed() >= Duration::from_millis(1000 + 2000));
        assert_eq!(controller.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_give_up_after_max_retries() {
        let (executor, controller) = setup(&[("a", false)]);
        controller.script("a", &[Behaviour::Transient; 10]);
        let result = executor.execute(&[on("a")], &ExecutionOptions::default()).await;
        assert!(!result.success);
        assert_eq!(result.actions[0].retries, 3);
        assert_eq!(controller.calls().len(), 4);
        assert!(result.actions[0].error.as_deref().unwrap().contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_retry_when_device_rejects() {
        let (executor, controller) = setup(&[("a", false)]);
        controller.script("a", &[Behaviour::Reject]);
        let result = executor.execute(&[on("a")], &ExecutionOptions::default()).await;
        assert!(!result.success);
        assert_eq!(result.actions[0].retries, 0);
        assert_eq!(controller.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_retry_when_device_missing() {
        let (executor, controller) = setup(&[]);
        let result = executor
            .execute(&[on("ghost")], &ExecutionOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.actions[0].retries, 0);
        assert!(result.actions[0].error.as_deref().unwrap().contains("not found"));
        assert!(controller.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_retry_when_value_missing() {
        let (executor, controller) = setup(&[("a", false)]);
        let result = executor
            .execute(
                &[Action::new("a", ActionKind::SetBrightness)],
                &ExecutionOptions::default(),
            )
            .await;
        assert!(!result.success);
        assert!(result.actions[0].error.as_deref().unwrap().contains("requires a value"));
        assert!(controller.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_hanging_attempt() {
        let (executor, controller) = setup(&[("a", false)]);
        controller.script("a", &[Behaviour::Hang]);
        let options = ExecutionOptions::default().with_max_retries(0);

        let result = executor.execute(&[on("a")], &options).await;

        assert!(!result.success);
        assert!(result.actions[0].error.as_deref().unwrap().contains("timed out after 5000ms"));
        assert!(result.total_duration < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_after_timeout() {
        let (executor, controller) = setup(&[("a", false)]);
        controller.script("a", &[Behaviour::Hang]);
        let result = executor.execute(&[on("a")], &ExecutionOptions::default()).await;
        assert!(result.success);
        assert_eq!(result.actions[0].retries, 1);
    }

    // ── Rollback ───────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_reverse_successful_actions_when_rollback_enabled() {
        let (executor, controller) = setup(&[("a", false), ("b", false)]);
        controller.script("b", &[Behaviour::Reject]);
        let options = ExecutionOptions::default().with_rollback(true);

        let result = executor.execute(&[on("a"), on("b")], &options).await;

        assert!(!result.success);
        assert_eq!(controller.state("a"), Some(false));
        assert_eq!(controller.state("b"), None);
        assert_eq!(result.rolled_back, vec![DeviceId::from("a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_continue_and_reverse_in_reverse_order_when_rollback_enabled() {
        let (executor, controller) = setup(&[("a", false), ("b", false), ("c", false)]);
        controller.script("b", &[Behaviour::Reject]);
        let options = ExecutionOptions::default().with_rollback(true);

        let result = executor.execute(&[on("a"), on("b"), on("c")], &options).await;

        assert_eq!(result.actions.len(), 3);
        assert_eq!(
            result.rolled_back,
            vec![DeviceId::from("c"), DeviceId::from("a")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_leave_non_reversible_actions_as_is() {
        let (executor, controller) = setup(&[("a", false), ("b", false)]);
        controller.script("b", &[Behaviour::Reject]);
        let options = ExecutionOptions::default().with_rollback(true);
        let dim = Action::new("a", ActionKind::SetBrightness).with_value(serde_json::json!(40));

        let result = executor.execute(&[dim, on("b")], &options).await;

        assert!(result.rolled_back.is_empty());
        assert_eq!(controller.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_roll_back_when_everything_succeeded() {
        let (executor, controller) = setup(&[("a", false)]);
        let options = ExecutionOptions::default().with_rollback(true);
        let result = executor.execute(&[on("a")], &options).await;
        assert!(result.success);
        assert!(result.rolled_back.is_empty());
        assert_eq!(controller.state("a"), Some(true));
    }

    // ── Parallel ───────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_run_actions_concurrently_when_parallel() {
        let (executor, controller) = setup(&[("a", false), ("b", false), ("c", false)]);
        for id in ["a", "b", "c"] {
            controller.script(id, &[Behaviour::Delay(Duration::from_secs(1))]);
        }
        let options = ExecutionOptions::default().with_parallel(true);

        let result = executor.execute(&[on("a"), on("b"), on("c")], &options).await;

        assert!(result.success);
        assert!(result.total_duration < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_every_action_when_parallel_batch_fails() {
        let (executor, controller) = setup(&[("a", false), ("b", false)]);
        controller.script("a", &[Behaviour::Reject]);
        let options = ExecutionOptions::default().with_parallel(true);

        let result = executor.execute(&[on("a"), on("b")], &options).await;

        assert!(!result.success);
        assert_eq!(result.actions.len(), 2);
        assert!(result.actions[1].success);
    }

    // ── Misc ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_toggle_based_on_cached_state() {
        let (executor, controller) = setup(&[("lit", true), ("dark", false)]);
        let result = executor
            .execute(
                &[
                    Action::new("lit", ActionKind::Toggle),
                    Action::new("dark", ActionKind::Toggle),
                ],
                &ExecutionOptions::default(),
            )
            .await;
        assert!(result.success);
        assert_eq!(
            controller.calls(),
            vec![
                ("lit".to_string(), "turn_off"),
                ("dark".to_string(), "turn_on")
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_return_empty_failed_result_when_orchestration_panics() {
        let (executor, controller) = setup(&[("a", false)]);
        controller.script("a", &[Behaviour::Panic]);
        let result = executor.execute(&[on("a")], &ExecutionOptions::default()).await;
        assert!(!result.success);
        assert!(result.actions.is_empty());
        assert!(result.error.as_deref().unwrap().contains("controller exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_return_error_from_runner_when_automation_fails() {
        let (executor, controller) = setup(&[("a", false)]);
        controller.script("a", &[Behaviour::Reject]);
        let automation = Automation::builder()
            .name("Lights")
            .action(on("a"))
            .build()
            .unwrap();
        let err = executor.run(&automation).await.unwrap_err();
        assert!(err.to_string().contains("device busy"));
    }

    #[test]
    fn should_double_backoff_per_retry() {
        let options = ExecutionOptions::default();
        assert_eq!(options.backoff(1), Duration::from_millis(1000));
        assert_eq!(options.backoff(2), Duration::from_millis(2000));
        assert_eq!(options.backoff(3), Duration::from_millis(4000));
    }
}
