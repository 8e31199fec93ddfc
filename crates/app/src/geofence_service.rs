//! Geofence service — enter/leave detection for circular regions.
//!
//! Each geofence carries a containment state that starts unknown. A first
//! fix outside is absorbed; a first fix inside is an enter. Fixes whose
//! accuracy radius exceeds the configured minimum are kept in the audit
//! trail but never move containment state.
//!
//! Monitoring listens to the provider's stream and polls the current
//! position on a fixed interval, so a stalled stream still produces
//! updates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use homeflow_domain::automation::{Automation, Trigger};
use homeflow_domain::error::{HomeflowError, NotFoundError};
use homeflow_domain::event::{Event, EventType};
use homeflow_domain::geo::{
    Coordinates, Geofence, GeofenceEvent, GeofenceEventKind, GeofenceState, GeofenceUpdate,
    Location,
};
use homeflow_domain::id::{AutomationId, GeofenceId};
use homeflow_domain::time::{Timestamp, now};

use crate::ports::{AutomationRunner, EventPublisher, LocationProvider};

/// Tuning for [`GeofenceService`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceConfig {
    /// Fixes with a larger accuracy radius (metres) are not applied.
    pub min_accuracy: f64,
    /// Fallback poll interval while monitoring.
    pub poll_interval: Duration,
    /// Number of fixes kept in the audit trail.
    pub audit_capacity: usize,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            min_accuracy: 100.0,
            poll_interval: Duration::from_secs(30),
            audit_capacity: 100,
        }
    }
}

/// One fix seen by the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRecord {
    pub location: Location,
    /// Whether the fix was accurate enough to update containment.
    pub accepted: bool,
    pub recorded_at: Timestamp,
}

type WatchKey = (GeofenceId, GeofenceEventKind);

#[derive(Default)]
struct State {
    geofences: HashMap<GeofenceId, Geofence>,
    states: HashMap<GeofenceId, GeofenceState>,
    audit: VecDeque<LocationRecord>,
    automations: HashMap<AutomationId, Automation>,
    watchers: HashMap<WatchKey, Vec<AutomationId>>,
    monitor: Option<JoinHandle<()>>,
}

impl State {
    fn unwatch(&mut self, id: AutomationId) -> bool {
        let existed = self.automations.remove(&id).is_some();
        self.watchers.retain(|_, ids| {
            ids.retain(|owner| *owner != id);
            !ids.is_empty()
        });
        existed
    }

    fn not_found(id: GeofenceId) -> HomeflowError {
        NotFoundError {
            entity: "geofence",
            id: id.to_string(),
        }
        .into()
    }
}

/// Owns geofences, tracks containment and runs geofence-triggered
/// automations.
pub struct GeofenceService<R, P> {
    runner: R,
    publisher: P,
    config: GeofenceConfig,
    state: Mutex<State>,
}

impl<R, P> GeofenceService<R, P>
where
    R: AutomationRunner + Sync,
    P: EventPublisher + Sync,
{
    pub fn new(runner: R, publisher: P, config: GeofenceConfig) -> Self {
        Self {
            runner,
            publisher,
            config,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Geofence CRUD ──────────────────────────────────────────────

    /// Create and register a geofence.
    ///
    /// # Errors
    ///
    /// Returns [`HomeflowError::Validation`] for an empty name, an
    /// out-of-range centre or a non-positive radius.
    pub fn create_geofence(
        &self,
        name: impl Into<String>,
        center: Coordinates,
        radius: f64,
    ) -> Result<Geofence, HomeflowError> {
        let geofence = Geofence::new(name, center, radius)?;
        self.insert_geofence(geofence.clone())?;
        Ok(geofence)
    }

    /// Register an existing geofence, replacing one with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`HomeflowError::Validation`] when the geofence is invalid.
    pub fn insert_geofence(&self, geofence: Geofence) -> Result<(), HomeflowError> {
        geofence.validate()?;
        tracing::info!(geofence_id = %geofence.id, name = %geofence.name, radius = geofence.radius, "geofence registered");
        let mut state = self.lock();
        state
            .states
            .insert(geofence.id, GeofenceState::unknown(geofence.id));
        state.geofences.insert(geofence.id, geofence);
        Ok(())
    }

    /// Apply a partial update.
    ///
    /// Moving or resizing a geofence resets its containment to unknown.
    ///
    /// # Errors
    ///
    /// Returns [`HomeflowError::NotFound`] for an unknown id and
    /// [`HomeflowError::Validation`] when the result is invalid.
    pub fn update_geofence(
        &self,
        id: GeofenceId,
        update: GeofenceUpdate,
    ) -> Result<Geofence, HomeflowError> {
        let mut state = self.lock();
        let current = state.geofences.get(&id).ok_or_else(|| State::not_found(id))?;
        let updated = update.apply(current)?;
        let moved = updated.center != current.center || updated.radius != current.radius;

        state.geofences.insert(id, updated.clone());
        if moved {
            state.states.insert(id, GeofenceState::unknown(id));
        }
        tracing::info!(geofence_id = %id, moved, "geofence updated");
        Ok(updated)
    }

    /// Remove a geofence together with its state and watchers.
    ///
    /// Automations left without any watched trigger are forgotten.
    ///
    /// # Errors
    ///
    /// Returns [`HomeflowError::NotFound`] for an unknown id.
    pub fn delete_geofence(&self, id: GeofenceId) -> Result<Geofence, HomeflowError> {
        let mut state = self.lock();
        let removed = state.geofences.remove(&id).ok_or_else(|| State::not_found(id))?;
        state.states.remove(&id);
        state.watchers.retain(|(fence, _), _| *fence != id);
        let watched: HashSet<AutomationId> = state.watchers.values().flatten().copied().collect();
        state.automations.retain(|automation_id, _| watched.contains(automation_id));
        tracing::info!(geofence_id = %id, "geofence deleted");
        Ok(removed)
    }

    #[must_use]
    pub fn geofence(&self, id: GeofenceId) -> Option<Geofence> {
        self.lock().geofences.get(&id).cloned()
    }

    /// All geofences, oldest first.
    #[must_use]
    pub fn list_geofences(&self) -> Vec<Geofence> {
        let mut all: Vec<Geofence> = self.lock().geofences.values().cloned().collect();
        all.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));
        all
    }

    // ── Automations ────────────────────────────────────────────────

    /// Index the geofence triggers of `automation`.
    ///
    /// Replaces previous watches of the same automation; a disabled
    /// automation is only unwatched. Returns the number of watched
    /// triggers.
    pub fn watch(&self, automation: &Automation) -> usize {
        let mut state = self.lock();
        state.unwatch(automation.id);
        if !automation.enabled {
            return 0;
        }

        let keys: Vec<WatchKey> = automation
            .triggers
            .iter()
            .filter_map(|trigger| match trigger {
                Trigger::Geofence { geofence_id, event } => Some((*geofence_id, *event)),
                _ => None,
            })
            .collect();
        if keys.is_empty() {
            return 0;
        }
        for key in &keys {
            let ids = state.watchers.entry(*key).or_default();
            if !ids.contains(&automation.id) {
                ids.push(automation.id);
            }
        }
        state.automations.insert(automation.id, automation.clone());
        tracing::debug!(automation_id = %automation.id, triggers = keys.len(), "watching geofence triggers");
        keys.len()
    }

    pub fn unwatch(&self, id: AutomationId) -> bool {
        self.lock().unwatch(id)
    }

    // ── Location updates ───────────────────────────────────────────

    /// Feed one fix and return the transitions it caused.
    ///
    /// Each transition is published and runs the automations watching it;
    /// the runs are awaited in order.
    #[tracing::instrument(skip(self, location), fields(accuracy = location.accuracy))]
    pub async fn check_geofences(&self, location: Location) -> Vec<GeofenceEvent> {
        let (events, to_run) = self.apply(location);
        self.publish_transitions(&events).await;
        for (automation, event) in &to_run {
            self.fire(automation, event).await;
        }
        events
    }

    async fn publish_transitions(&self, events: &[GeofenceEvent]) {
        for event in events {
            let event_type = match event.kind {
                GeofenceEventKind::Enter => EventType::GeofenceEntered,
                GeofenceEventKind::Leave => EventType::GeofenceLeft,
            };
            tracing::info!(geofence_id = %event.geofence_id, kind = %event.kind, distance = event.distance, "geofence transition");
            let _ = self
                .publisher
                .publish(Event::about(
                    event_type,
                    event.geofence_id,
                    serde_json::to_value(event).unwrap_or_default(),
                ))
                .await;
        }
    }

    fn apply(&self, location: Location) -> (Vec<GeofenceEvent>, Vec<(Automation, GeofenceEvent)>) {
        let accepted = location.accuracy.is_finite() && location.accuracy <= self.config.min_accuracy;
        let mut guard = self.lock();
        let state = &mut *guard;

        if self.config.audit_capacity > 0 {
            while state.audit.len() >= self.config.audit_capacity {
                state.audit.pop_front();
            }
            state.audit.push_back(LocationRecord {
                location,
                accepted,
                recorded_at: now(),
            });
        }
        if !accepted {
            tracing::debug!(accuracy = location.accuracy, "fix too inaccurate, containment unchanged");
            return (Vec::new(), Vec::new());
        }

        let point = location.coordinates();
        let mut events = Vec::new();
        for geofence in state.geofences.values().filter(|g| g.enabled) {
            let distance = geofence.distance_to(point);
            let containment = state
                .states
                .entry(geofence.id)
                .or_insert_with(|| GeofenceState::unknown(geofence.id));
            let Some(kind) = containment.observe(distance <= geofence.radius, location.timestamp) else {
                continue;
            };
            events.push(GeofenceEvent {
                geofence_id: geofence.id,
                geofence_name: geofence.name.clone(),
                kind,
                location,
                distance,
                timestamp: now(),
            });
        }

        let mut to_run = Vec::new();
        for event in &events {
            let Some(ids) = state.watchers.get(&(event.geofence_id, event.kind)) else {
                continue;
            };
            for id in ids {
                if let Some(automation) = state.automations.get(id) {
                    to_run.push((automation.clone(), event.clone()));
                }
            }
        }
        (events, to_run)
    }

    async fn fire(&self, automation: &Automation, event: &GeofenceEvent) {
        tracing::info!(automation_id = %automation.id, geofence_id = %event.geofence_id, kind = %event.kind, "geofence trigger, running automation");
        let _ = self
            .publisher
            .publish(Event::about(
                EventType::AutomationTriggered,
                automation.id,
                serde_json::json!({
                    "name": automation.name,
                    "trigger": "geofence",
                    "geofence_id": event.geofence_id,
                    "event": event.kind,
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

    // ── Queries ────────────────────────────────────────────────────

    #[must_use]
    pub fn current_states(&self) -> Vec<GeofenceState> {
        self.lock().states.values().cloned().collect()
    }

    #[must_use]
    pub fn state_of(&self, id: GeofenceId) -> Option<GeofenceState> {
        self.lock().states.get(&id).cloned()
    }

    /// Distance in metres from a geofence's centre to `location`.
    #[must_use]
    pub fn distance_to(&self, id: GeofenceId, location: &Location) -> Option<f64> {
        self.lock()
            .geofences
            .get(&id)
            .map(|g| g.distance_to(location.coordinates()))
    }

    /// Recent fixes, oldest first, accepted or not.
    #[must_use]
    pub fn location_history(&self) -> Vec<LocationRecord> {
        self.lock().audit.iter().cloned().collect()
    }

    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.lock()
            .monitor
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the monitoring task. Returns whether one was running.
    pub fn stop_monitoring(&self) -> bool {
        let Some(handle) = self.lock().monitor.take() else {
            return false;
        };
        handle.abort();
        tracing::info!("geofence monitoring stopped");
        true
    }
}

impl<R, P> GeofenceService<R, P>
where
    R: AutomationRunner + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Ask for location permission, then monitor `provider` in the
    /// background until [`stop_monitoring`](Self::stop_monitoring).
    ///
    /// Restarts monitoring when it is already running.
    ///
    /// # Errors
    ///
    /// Returns [`HomeflowError::PermissionDenied`] when the provider
    /// refuses access.
    pub async fn start_monitoring<L>(self: &Arc<Self>, provider: L) -> Result<(), HomeflowError>
    where
        L: LocationProvider + Send + Sync + 'static,
    {
        if !provider.request_permission().await {
            tracing::warn!("location permission denied");
            return Err(HomeflowError::PermissionDenied);
        }

        let service = Arc::clone(self);
        let handle = tokio::spawn(service.monitor(provider));
        if let Some(previous) = self.lock().monitor.replace(handle) {
            previous.abort();
        }
        tracing::info!(poll_secs = self.config.poll_interval.as_secs(), "geofence monitoring started");
        Ok(())
    }

    /// Feed one fix without waiting for the automations it triggers.
    ///
    /// Containment is updated and transitions are published before
    /// returning; each triggered automation runs in its own task.
    pub async fn dispatch_location(self: &Arc<Self>, location: Location) -> Vec<GeofenceEvent> {
        let (events, to_run) = self.apply(location);
        self.publish_transitions(&events).await;
        for (automation, event) in to_run {
            let service = Arc::clone(self);
            tokio::spawn(async move {
                service.fire(&automation, &event).await;
            });
        }
        events
    }

    async fn monitor<L: LocationProvider>(self: Arc<Self>, provider: L) {
        let mut updates = provider.watch();
        let mut streaming = true;
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = updates.next(), if streaming => match next {
                    Some(location) => {
                        poll.reset();
                        self.dispatch_location(location).await;
                    }
                    None => {
                        tracing::warn!("location stream ended, falling back to polling");
                        streaming = false;
                    }
                },
                _ = poll.tick() => match provider.current_position().await {
                    Ok(location) => {
                        self.dispatch_location(location).await;
                    }
                    Err(err) => tracing::warn!(%err, "location poll failed"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, BoxStream};
    use homeflow_domain::automation::{Action, ActionKind};
    use homeflow_domain::error::ValidationError;

    use crate::event_bus::InProcessEventBus;

    // ── Fakes ──────────────────────────────────────────────────────

    #[derive(Default)]
    struct SpyRunner {
        runs: Mutex<Vec<AutomationId>>,
        delay: Option<Duration>,
    }

    impl SpyRunner {
        fn runs(&self) -> Vec<AutomationId> {
            self.runs.lock().unwrap().clone()
        }
    }

    impl AutomationRunner for SpyRunner {
        async fn run(&self, automation: &Automation) -> Result<(), HomeflowError> {
            self.runs.lock().unwrap().push(automation.id);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }
    }

    struct FakeProvider {
        allowed: bool,
        track: Vec<Location>,
        current: Option<Location>,
    }

    impl LocationProvider for FakeProvider {
        async fn request_permission(&self) -> bool {
            self.allowed
        }

        async fn current_position(&self) -> Result<Location, HomeflowError> {
            self.current.ok_or(HomeflowError::PermissionDenied)
        }

        fn watch(&self) -> BoxStream<'static, Location> {
            stream::iter(self.track.clone()).boxed()
        }
    }

    type TestService = GeofenceService<Arc<SpyRunner>, Arc<InProcessEventBus>>;

    const HOME: Coordinates = Coordinates {
        lat: 48.8566,
        lng: 2.3522,
    };

    fn service_with(config: GeofenceConfig) -> (Arc<TestService>, Arc<SpyRunner>, Arc<InProcessEventBus>) {
        service_running(SpyRunner::default(), config)
    }

    fn service_running(
        runner: SpyRunner,
        config: GeofenceConfig,
    ) -> (Arc<TestService>, Arc<SpyRunner>, Arc<InProcessEventBus>) {
        let runner = Arc::new(runner);
        let bus = Arc::new(InProcessEventBus::new(32));
        let service = Arc::new(GeofenceService::new(
            Arc::clone(&runner),
            Arc::clone(&bus),
            config,
        ));
        (service, runner, bus)
    }

    fn service() -> (Arc<TestService>, Arc<SpyRunner>, Arc<InProcessEventBus>) {
        service_with(GeofenceConfig::default())
    }

    fn fix(lat: f64, lng: f64, accuracy: f64) -> Location {
        Location {
            lat,
            lng,
            accuracy,
            timestamp: now(),
        }
    }

    fn at_home() -> Location {
        fix(HOME.lat, HOME.lng, 10.0)
    }

    fn away() -> Location {
        fix(HOME.lat + 0.01, HOME.lng, 10.0)
    }

    fn arrival(geofence_id: GeofenceId) -> Automation {
        Automation::builder()
            .name("Welcome home")
            .trigger(Trigger::Geofence {
                geofence_id,
                event: GeofenceEventKind::Enter,
            })
            .action(Action::new("hall", ActionKind::TurnOn))
            .build()
            .unwrap()
    }

    fn departure(geofence_id: GeofenceId) -> Automation {
        Automation::builder()
            .name("Lights off")
            .trigger(Trigger::Geofence {
                geofence_id,
                event: GeofenceEventKind::Leave,
            })
            .action(Action::new("hall", ActionKind::TurnOff))
            .build()
            .unwrap()
    }

    // ── CRUD ───────────────────────────────────────────────────────

    #[test]
    fn should_reject_geofence_with_non_positive_radius() {
        let (service, ..) = service();
        let result = service.create_geofence("Home", HOME, 0.0);
        assert!(matches!(
            result,
            Err(HomeflowError::Validation(ValidationError::InvalidRadius(_)))
        ));
        assert!(service.list_geofences().is_empty());
    }

    #[test]
    fn should_start_new_geofence_in_unknown_state() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        assert_eq!(service.state_of(home.id).unwrap().is_inside, None);
        assert_eq!(service.list_geofences(), vec![home]);
    }

    #[tokio::test]
    async fn should_reset_state_when_geofence_moves() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        service.check_geofences(at_home()).await;

        let renamed = service
            .update_geofence(
                home.id,
                GeofenceUpdate {
                    name: Some("House".to_string()),
                    ..GeofenceUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "House");
        assert_eq!(service.state_of(home.id).unwrap().is_inside, Some(true));

        service
            .update_geofence(
                home.id,
                GeofenceUpdate {
                    radius: Some(500.0),
                    ..GeofenceUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(service.state_of(home.id).unwrap().is_inside, None);
    }

    #[test]
    fn should_return_not_found_for_unknown_geofence() {
        let (service, ..) = service();
        let ghost = GeofenceId::new();
        assert!(matches!(
            service.update_geofence(ghost, GeofenceUpdate::default()),
            Err(HomeflowError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_geofence(ghost),
            Err(HomeflowError::NotFound(_))
        ));
    }

    #[test]
    fn should_forget_state_when_deleted() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        service.delete_geofence(home.id).unwrap();
        assert!(service.geofence(home.id).is_none());
        assert!(service.state_of(home.id).is_none());
    }

    // ── Transitions ────────────────────────────────────────────────

    #[tokio::test]
    async fn should_absorb_first_fix_outside() {
        let (service, ..) = service();
        service.create_geofence("Home", HOME, 200.0).unwrap();
        assert!(service.check_geofences(away()).await.is_empty());
        assert!(service.check_geofences(away()).await.is_empty());
    }

    #[tokio::test]
    async fn should_enter_on_first_fix_inside() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let events = service.check_geofences(at_home()).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, GeofenceEventKind::Enter);
        assert_eq!(events[0].geofence_id, home.id);
        assert!(events[0].distance < 1.0);
        assert!(service.check_geofences(at_home()).await.is_empty());
    }

    #[tokio::test]
    async fn should_keep_both_timestamps_across_toggles() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        service.check_geofences(at_home()).await;
        let events = service.check_geofences(away()).await;
        assert_eq!(events[0].kind, GeofenceEventKind::Leave);

        let state = service.state_of(home.id).unwrap();
        assert_eq!(state.is_inside, Some(false));
        assert!(state.entered_at.is_some());
        assert!(state.left_at.is_some());
    }

    #[tokio::test]
    async fn should_audit_but_ignore_inaccurate_fix() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let events = service
            .check_geofences(fix(HOME.lat, HOME.lng, 250.0))
            .await;

        assert!(events.is_empty());
        assert_eq!(service.state_of(home.id).unwrap().is_inside, None);
        let history = service.location_history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].accepted);
    }

    #[tokio::test]
    async fn should_bound_audit_trail() {
        let (service, ..) = service();
        for i in 0..105 {
            service
                .check_geofences(fix(HOME.lat, HOME.lng, f64::from(i)))
                .await;
        }
        let history = service.location_history();
        assert_eq!(history.len(), 100);
        assert!((history[0].location.accuracy - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn should_ignore_disabled_geofence() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        service
            .update_geofence(
                home.id,
                GeofenceUpdate {
                    enabled: Some(false),
                    ..GeofenceUpdate::default()
                },
            )
            .unwrap();
        assert!(service.check_geofences(at_home()).await.is_empty());
    }

    #[test]
    fn should_measure_distance_from_centre() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let distance = service.distance_to(home.id, &away()).unwrap();
        assert!((distance - 1112.0).abs() < 15.0, "got {distance}");
        assert!(service.distance_to(GeofenceId::new(), &away()).is_none());
    }

    // ── Automations ────────────────────────────────────────────────

    #[tokio::test]
    async fn should_run_watching_automation_on_matching_transition() {
        let (service, runner, bus) = service();
        let mut rx = bus.subscribe();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let automation = arrival(home.id);
        assert_eq!(service.watch(&automation), 1);

        service.check_geofences(at_home()).await;
        service.check_geofences(away()).await;

        assert_eq!(runner.runs(), vec![automation.id]);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::GeofenceEntered);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::AutomationTriggered);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::GeofenceLeft);
    }

    #[tokio::test]
    async fn should_not_run_unwatched_automation() {
        let (service, runner, _bus) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let automation = arrival(home.id);
        service.watch(&automation);
        assert!(service.unwatch(automation.id));

        service.check_geofences(at_home()).await;
        assert!(runner.runs().is_empty());
    }

    #[test]
    fn should_forget_automations_only_watching_deleted_geofence() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let office = service
            .create_geofence("Office", Coordinates { lat: 48.87, lng: 2.33 }, 150.0)
            .unwrap();
        let welcome = arrival(home.id);
        let commute = Automation {
            triggers: vec![
                Trigger::Geofence {
                    geofence_id: home.id,
                    event: GeofenceEventKind::Leave,
                },
                Trigger::Geofence {
                    geofence_id: office.id,
                    event: GeofenceEventKind::Enter,
                },
            ],
            ..departure(home.id)
        };
        service.watch(&welcome);
        service.watch(&commute);

        service.delete_geofence(home.id).unwrap();

        assert!(!service.unwatch(welcome.id));
        assert!(service.unwatch(commute.id));
    }

    // ── Monitoring ─────────────────────────────────────────────────

    #[tokio::test]
    async fn should_refuse_monitoring_without_permission() {
        let (service, ..) = service();
        let provider = FakeProvider {
            allowed: false,
            track: Vec::new(),
            current: None,
        };
        assert!(matches!(
            service.start_monitoring(provider).await,
            Err(HomeflowError::PermissionDenied)
        ));
        assert!(!service.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn should_apply_streamed_fixes_while_monitoring() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let provider = FakeProvider {
            allowed: true,
            track: vec![away(), at_home()],
            current: None,
        };
        service.start_monitoring(provider).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(service.is_monitoring());
        assert_eq!(service.state_of(home.id).unwrap().is_inside, Some(true));
        assert!(service.stop_monitoring());
        assert!(!service.stop_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn should_poll_when_stream_is_silent() {
        let (service, ..) = service();
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let provider = FakeProvider {
            allowed: true,
            track: Vec::new(),
            current: Some(at_home()),
        };
        service.start_monitoring(provider).await.unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(service.state_of(home.id).unwrap().is_inside, Some(true));
        assert!(service.location_history().len() >= 2);
        service.stop_monitoring();
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_monitoring_while_automation_runs() {
        let (service, runner, _bus) = service_running(
            SpyRunner {
                delay: Some(Duration::from_secs(600)),
                ..SpyRunner::default()
            },
            GeofenceConfig::default(),
        );
        let home = service.create_geofence("Home", HOME, 200.0).unwrap();
        let welcome = arrival(home.id);
        let goodbye = departure(home.id);
        service.watch(&welcome);
        service.watch(&goodbye);
        let provider = FakeProvider {
            allowed: true,
            track: vec![at_home(), away()],
            current: None,
        };
        service.start_monitoring(provider).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(service.state_of(home.id).unwrap().is_inside, Some(false));
        let runs = runner.runs();
        assert_eq!(runs.len(), 2);
        assert!(runs.contains(&welcome.id) && runs.contains(&goodbye.id));
        service.stop_monitoring();
    }
}
