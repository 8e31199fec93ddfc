//! Execution callbacks invoked when something fires.
//!
//! The scheduler, the condition evaluator and the geofence service only
//! decide *that* an automation should run; what running means is up to the
//! [`AutomationRunner`] they are given. The action executor is the usual
//! implementation.

use std::future::Future;

use homeflow_domain::automation::{Action, Automation};
use homeflow_domain::error::HomeflowError;

/// Runs a fired automation.
pub trait AutomationRunner {
    /// # Errors
    ///
    /// Returns an error when the automation did not complete successfully.
    fn run(&self, automation: &Automation)
    -> impl Future<Output = Result<(), HomeflowError>> + Send;
}

impl<T: AutomationRunner + Send + Sync> AutomationRunner for std::sync::Arc<T> {
    fn run(
        &self,
        automation: &Automation,
    ) -> impl Future<Output = Result<(), HomeflowError>> + Send {
        (**self).run(automation)
    }
}

/// Runs a batch of device actions on behalf of a flow action node.
pub trait ActionRunner {
    /// # Errors
    ///
    /// Returns an error when any action in the batch failed.
    fn run_actions(
        &self,
        actions: &[Action],
    ) -> impl Future<Output = Result<(), HomeflowError>> + Send;
}

impl<T: ActionRunner + Send + Sync> ActionRunner for std::sync::Arc<T> {
    fn run_actions(
        &self,
        actions: &[Action],
    ) -> impl Future<Output = Result<(), HomeflowError>> + Send {
        (**self).run_actions(actions)
    }
}
