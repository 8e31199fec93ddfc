//! Scheduler — arms time and sun triggers and runs automations when due.
//!
//! Armed triggers live in a min-heap of `(fire_at, generation, key)` driven
//! by one dispatcher loop ([`Scheduler::run`]). Re-arming or unscheduling a
//! trigger bumps its generation, which turns stale heap entries into no-ops
//! when they surface. Every fire re-arms the trigger for its next
//! occurrence before the automation runs.
//!
//! A heartbeat compares elapsed wall-clock time with elapsed monotonic time;
//! a disagreement beyond the drift threshold means the system clock jumped
//! (DST, manual change) and every task is recomputed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, Offset, TimeDelta, TimeZone, Utc};
use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use homeflow_domain::automation::{Automation, Schedule, Trigger, next_time_occurrence};
use homeflow_domain::error::{ConfigError, HomeflowError, TimeoutError};
use homeflow_domain::event::{Event, EventType};
use homeflow_domain::geo::Coordinates;
use homeflow_domain::id::AutomationId;
use homeflow_domain::solar::{SolarTimes, solar_times};
use homeflow_domain::time::{Timestamp, now, parse_hhmm, parse_weekdays};

use crate::ports::{AutomationRunner, Clock, EventPublisher};

/// Tuning for [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Hard limit for one automation run.
    pub execution_timeout: Duration,
    /// Interval of the clock-drift heartbeat.
    pub heartbeat: Duration,
    /// Drift above which schedules are recomputed.
    pub drift_threshold: Duration,
    /// Number of runs kept in [`Scheduler::history`].
    pub history_capacity: usize,
    /// Needed by sun triggers.
    pub location: Option<Coordinates>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            heartbeat: Duration::from_secs(60),
            drift_threshold: Duration::from_secs(5),
            history_capacity: 1000,
            location: None,
        }
    }
}

/// An armed schedule trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledTask {
    pub automation_id: AutomationId,
    /// Position of the trigger inside its automation.
    pub trigger_index: usize,
    pub trigger: Trigger,
    pub next_run: Timestamp,
    pub recurring: bool,
}

/// Record of one automation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutomationRun {
    pub automation_id: AutomationId,
    pub automation_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
    pub timestamp: Timestamp,
}

type TaskKey = (AutomationId, usize);

struct Armed {
    task: ScheduledTask,
    schedule: Schedule,
    generation: u64,
}

#[derive(Default)]
struct State {
    automations: HashMap<AutomationId, Automation>,
    tasks: HashMap<TaskKey, Armed>,
    queue: BinaryHeap<Reverse<(Timestamp, u64, TaskKey)>>,
    next_generation: u64,
    history: VecDeque<AutomationRun>,
    heartbeat: Option<(Instant, Timestamp)>,
}

impl State {
    fn arm(&mut self, key: TaskKey, task: ScheduledTask, schedule: Schedule) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.queue.push(Reverse((task.next_run, generation, key)));
        self.tasks.insert(
            key,
            Armed {
                task,
                schedule,
                generation,
            },
        );
    }

    fn remove(&mut self, id: AutomationId) -> bool {
        let existed = self.automations.remove(&id).is_some();
        self.tasks.retain(|(owner, _), _| *owner != id);
        existed
    }

    fn is_current(&self, generation: u64, key: &TaskKey) -> bool {
        self.tasks
            .get(key)
            .is_some_and(|armed| armed.generation == generation)
    }

    /// Drop stale entries from the top of the heap.
    fn prune(&mut self) {
        while let Some(Reverse((_, generation, key))) = self.queue.peek() {
            if self.is_current(*generation, key) {
                break;
            }
            self.queue.pop();
        }
    }
}

/// Arms schedule triggers and runs automations through an
/// [`AutomationRunner`] when they come due.
pub struct Scheduler<C, R, P> {
    clock: C,
    runner: R,
    publisher: P,
    config: SchedulerConfig,
    state: Mutex<State>,
    wake: Notify,
}

impl<C, R, P> Scheduler<C, R, P>
where
    C: Clock + Sync,
    R: AutomationRunner + Sync,
    P: EventPublisher + Sync,
{
    pub fn new(clock: C, runner: R, publisher: P, config: SchedulerConfig) -> Self {
        Self {
            clock,
            runner,
            publisher,
            config,
            state: Mutex::new(State::default()),
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_utc(&self) -> Timestamp {
        self.clock.now().with_timezone(&Utc)
    }

    /// Next occurrence of `schedule` strictly after the clock's now.
    fn next_occurrence(&self, schedule: &Schedule) -> Result<Timestamp, ConfigError> {
        let now = self.clock.now();
        schedule
            .next_after(&now, self.config.location)
            .map(|next| next.with_timezone(&Utc))
    }

    /// Arm every time and sun trigger of `automation`.
    ///
    /// Replaces previously armed triggers of the same automation. A
    /// disabled automation is unscheduled instead. Triggers without any
    /// upcoming occurrence (the sun never sets this week) are skipped.
    ///
    /// Returns the number of armed triggers.
    ///
    /// # Errors
    ///
    /// Returns [`HomeflowError::Config`] for a malformed trigger or a sun
    /// trigger without a configured location. Nothing of the automation is
    /// armed in that case.
    #[tracing::instrument(skip(self, automation), fields(automation_id = %automation.id))]
    pub fn schedule(&self, automation: &Automation) -> Result<usize, HomeflowError> {
        if !automation.enabled {
            self.unschedule(automation.id);
            return Ok(0);
        }

        let armed = match self.plan(automation) {
            Ok(armed) => armed,
            Err(err) => {
                tracing::warn!(%err, "skipping misconfigured automation");
                self.unschedule(automation.id);
                return Err(err.into());
            }
        };

        let count = armed.len();
        {
            let mut state = self.lock();
            state.remove(automation.id);
            if count > 0 {
                state.automations.insert(automation.id, automation.clone());
            }
            for (index, task, schedule) in armed {
                tracing::info!(trigger = %task.trigger, next_run = %task.next_run, "armed trigger");
                state.arm((automation.id, index), task, schedule);
            }
        }
        self.wake.notify_one();
        Ok(count)
    }

    fn plan(
        &self,
        automation: &Automation,
    ) -> Result<Vec<(usize, ScheduledTask, Schedule)>, ConfigError> {
        automation.validate_triggers()?;
        let mut armed = Vec::new();
        for (index, trigger) in automation.schedule_triggers() {
            let Some(schedule) = Schedule::from_trigger(trigger)? else {
                continue;
            };
            let next_run = match self.next_occurrence(&schedule) {
                Ok(next_run) => next_run,
                Err(ConfigError::NoOccurrence(what)) => {
                    tracing::warn!(schedule = %what, "no upcoming occurrence, trigger not armed");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let task = ScheduledTask {
                automation_id: automation.id,
                trigger_index: index,
                trigger: trigger.clone(),
                next_run,
                recurring: true,
            };
            armed.push((index, task, schedule));
        }
        Ok(armed)
    }

    /// Disarm every trigger of an automation. Returns whether it was armed.
    ///
    /// Runs already in flight are not interrupted.
    pub fn unschedule(&self, id: AutomationId) -> bool {
        let removed = self.lock().remove(id);
        if removed {
            tracing::info!(automation_id = %id, "unscheduled automation");
            self.wake.notify_one();
        }
        removed
    }

    /// Disarm everything.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.automations.clear();
        state.tasks.clear();
        state.queue.clear();
        drop(state);
        self.wake.notify_one();
    }

    /// Run `automation` now, bounded by the execution timeout.
    ///
    /// Failures, timeouts and panics of the runner are recorded in the
    /// returned run, in the history and on the event bus; they are never
    /// propagated. The triggered event reports the run as `manual`.
    pub async fn execute_automation(&self, automation: &Automation) -> AutomationRun {
        self.execute(automation, "manual").await
    }

    #[tracing::instrument(skip(self, automation), fields(automation_id = %automation.id))]
    async fn execute(&self, automation: &Automation, origin: &'static str) -> AutomationRun {
        let started = Instant::now();
        let timestamp = now();
        tracing::info!(name = %automation.name, origin, "running automation");
        let _ = self
            .publisher
            .publish(Event::about(
                EventType::AutomationTriggered,
                automation.id,
                serde_json::json!({ "name": automation.name, "trigger": origin }),
            ))
            .await;

        let run = AssertUnwindSafe(self.runner.run(automation)).catch_unwind();
        let error = match tokio::time::timeout(self.config.execution_timeout, run).await {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(err))) => Some(err.to_string()),
            Ok(Err(_panic)) => Some("automation runner panicked".to_string()),
            Err(_) => Some(
                TimeoutError {
                    operation: "automation",
                    after: self.config.execution_timeout,
                }
                .to_string(),
            ),
        };

        let record = AutomationRun {
            automation_id: automation.id,
            automation_name: automation.name.clone(),
            success: error.is_none(),
            error,
            duration: started.elapsed(),
            timestamp,
        };

        if let Some(error) = &record.error {
            tracing::error!(%error, "automation failed");
            let _ = self
                .publisher
                .publish(Event::about(
                    EventType::AutomationFailed,
                    automation.id,
                    serde_json::json!({ "name": automation.name, "error": error }),
                ))
                .await;
        }

        self.remember(record.clone());
        record
    }

    fn remember(&self, record: AutomationRun) {
        let mut state = self.lock();
        if self.config.history_capacity == 0 {
            return;
        }
        while state.history.len() >= self.config.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(record);
    }

    /// Next run of `HH:MM` on the allowed `days` (all days when `None`),
    /// strictly after the clock's now.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTime`] or [`ConfigError::UnknownDay`]
    /// for malformed input.
    pub fn calculate_next_run(
        &self,
        time: &str,
        days: Option<&[String]>,
    ) -> Result<Timestamp, ConfigError> {
        let time = parse_hhmm(time)?;
        let days = parse_weekdays(days.unwrap_or_default())?;
        let now = self.clock.now();
        next_time_occurrence(time, &days, &now)
            .map(|next| next.with_timezone(&Utc))
            .ok_or_else(|| ConfigError::NoOccurrence(time.format("%H:%M").to_string()))
    }

    /// Sunrise, sunset and solar noon in the clock's local time.
    ///
    /// `date` defaults to today.
    #[must_use]
    pub fn calculate_solar_times(&self, lat: f64, lng: f64, date: Option<NaiveDate>) -> SolarTimes {
        let now = self.clock.now();
        let date = date.unwrap_or_else(|| now.date_naive());
        let offset = now.timezone().offset_from_utc_date(&date).fix();
        solar_times(lat, lng, date, offset.local_minus_utc() / 60)
    }

    /// Fire everything that is due, re-arming each trigger first.
    ///
    /// Due automations run concurrently; an automation with several due
    /// triggers runs once.
    pub async fn run_due(&self) -> Vec<AutomationRun> {
        let due = self.take_due();
        join_all(due.iter().map(|automation| self.execute(automation, "schedule"))).await
    }

    fn take_due(&self) -> Vec<Automation> {
        let current = self.now_utc();
        let mut due: Vec<Automation> = Vec::new();
        let mut state = self.lock();

        loop {
            state.prune();
            let Some(Reverse((fire_at, _, key))) = state.queue.peek().copied() else {
                break;
            };
            if fire_at > current {
                break;
            }
            state.queue.pop();

            let Some(armed) = state.tasks.remove(&key) else {
                continue;
            };
            match self.next_occurrence(&armed.schedule) {
                Ok(next_run) => {
                    let task = ScheduledTask {
                        next_run,
                        ..armed.task
                    };
                    tracing::debug!(automation_id = %key.0, next_run = %next_run, "re-armed trigger");
                    state.arm(key, task, armed.schedule);
                }
                Err(err) => {
                    tracing::warn!(automation_id = %key.0, %err, "trigger not re-armed");
                }
            }

            if due.iter().any(|a| a.id == key.0) {
                continue;
            }
            if let Some(automation) = state.automations.get(&key.0) {
                due.push(automation.clone());
            }
        }
        due
    }

    /// Time until the earliest armed trigger, `None` when nothing is armed.
    fn time_until_next(&self) -> Option<Duration> {
        let current = self.now_utc();
        let mut state = self.lock();
        state.prune();
        let Reverse((fire_at, _, _)) = state.queue.peek()?;
        Some((*fire_at - current).to_std().unwrap_or(Duration::ZERO))
    }

    /// Recompute every armed trigger from the current clock.
    ///
    /// Returns the number of triggers still armed.
    pub fn reschedule_all(&self) -> usize {
        let mut state = self.lock();
        let tasks = std::mem::take(&mut state.tasks);
        state.queue.clear();
        for (key, armed) in tasks {
            match self.next_occurrence(&armed.schedule) {
                Ok(next_run) => {
                    let task = ScheduledTask {
                        next_run,
                        ..armed.task
                    };
                    state.arm(key, task, armed.schedule);
                }
                Err(err) => {
                    tracing::warn!(automation_id = %key.0, %err, "trigger dropped while rescheduling");
                }
            }
        }
        let count = state.tasks.len();
        drop(state);
        tracing::info!(tasks = count, "rescheduled all triggers");
        self.wake.notify_one();
        count
    }

    /// Compare wall-clock and monotonic time since the previous check.
    ///
    /// Returns the drift when it exceeded the threshold, after every
    /// trigger has been rescheduled.
    pub async fn check_clock_drift(&self) -> Option<Duration> {
        let wall = self.now_utc();
        let mono = Instant::now();
        let (previous_mono, previous_wall) = self.lock().heartbeat.replace((mono, wall))?;

        let expected = TimeDelta::from_std(mono.duration_since(previous_mono)).ok()?;
        let drift = ((wall - previous_wall) - expected).abs().to_std().ok()?;
        if drift <= self.config.drift_threshold {
            return None;
        }

        let drift_ms = u64::try_from(drift.as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(drift_ms, "clock drift detected, recomputing schedules");
        let tasks = self.reschedule_all();
        let _ = self
            .publisher
            .publish(Event::new(
                EventType::ClockDriftDetected,
                None,
                serde_json::json!({ "drift_ms": drift_ms, "tasks": tasks }),
            ))
            .await;
        Some(drift)
    }

    /// Armed triggers, earliest first.
    #[must_use]
    pub fn next_runs(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> =
            self.lock().tasks.values().map(|a| a.task.clone()).collect();
        tasks.sort_by_key(|t| (t.next_run, t.trigger_index));
        tasks
    }

    /// Past runs, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<AutomationRun> {
        self.lock().history.iter().cloned().collect()
    }
}

impl<C, R, P> Scheduler<C, R, P>
where
    C: Clock + Send + Sync + 'static,
    R: AutomationRunner + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Dispatcher loop: sleeps until the earliest trigger and checks for
    /// clock drift on every heartbeat. Never returns.
    ///
    /// Each due automation runs in its own task; a slow run never delays
    /// later triggers or the heartbeat.
    pub async fn run(self: &Arc<Self>) {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wait = self.time_until_next();
            tokio::select! {
                () = sleep_or_pending(wait) => {
                    for automation in self.take_due() {
                        let scheduler = Arc::clone(self);
                        tokio::spawn(async move {
                            scheduler.execute(&automation, "schedule").await;
                        });
                    }
                }
                () = self.wake.notified() => {}
                _ = heartbeat.tick() => {
                    self.check_clock_drift().await;
                }
            }
        }
    }

    /// Run the dispatcher loop on the tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run().await })
    }
}

async fn sleep_or_pending(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}
