//! Automation — trigger → action rules.
//!
//! Automations are authored by the host and read-only to the engine. Each
//! automation has one or more [`Trigger`]s that determine when it fires and
//! the [`Action`]s to run when it does.

mod action;
mod schedule;
mod trigger;

pub use action::{Action, ActionKind, Command};
pub use schedule::{Schedule, next_sun_occurrence, next_time_occurrence};
pub use trigger::{CompareOp, FLOAT_EPSILON, Trigger};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, HomeflowError, ValidationError};
use crate::id::AutomationId;

/// A rule that runs actions when one of its triggers fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    #[serde(default)]
    pub id: AutomationId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_enabled() -> bool {
    true
}

impl Automation {
    /// Create a builder for constructing an [`Automation`].
    #[must_use]
    pub fn builder() -> AutomationBuilder {
        AutomationBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HomeflowError::Validation`] when `name` is empty, or
    /// [`HomeflowError::Config`] for the first invalid trigger.
    pub fn validate(&self) -> Result<(), HomeflowError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        self.validate_triggers()?;
        Ok(())
    }

    /// Validate every trigger, reporting the first misconfiguration.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] of the first invalid trigger.
    pub fn validate_triggers(&self) -> Result<(), ConfigError> {
        self.triggers
            .iter()
            .enumerate()
            .try_for_each(|(index, trigger)| trigger.validate(index))
    }

    /// Triggers that the scheduler arms, with their positions.
    pub fn schedule_triggers(&self) -> impl Iterator<Item = (usize, &Trigger)> {
        self.triggers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_schedule())
    }

    /// Triggers that the condition evaluator watches, with their positions.
    pub fn condition_triggers(&self) -> impl Iterator<Item = (usize, &Trigger)> {
        self.triggers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_condition())
    }
}

/// Step-by-step builder for [`Automation`].
#[derive(Debug, Default)]
pub struct AutomationBuilder {
    id: Option<AutomationId>,
    name: Option<String>,
    enabled: Option<bool>,
    triggers: Vec<Trigger>,
    actions: Vec<Action>,
}

impl AutomationBuilder {
    #[must_use]
    pub fn id(mut self, id: AutomationId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Consume the builder, validate, and return an [`Automation`].
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or a trigger is misconfigured.
    pub fn build(self) -> Result<Automation, HomeflowError> {
        let automation = Automation {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            triggers: self.triggers,
            actions: self.actions,
        };
        automation.validate()?;
        Ok(automation)
    }
}
