//! Event bus port — the engine's notification sink.

use std::future::Future;

use homeflow_domain::error::HomeflowError;
use homeflow_domain::event::Event;

/// Publishes domain events to interested subscribers.
///
/// Callers ignore the outcome: a failing sink never changes what the
/// engine does.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HomeflowError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HomeflowError>> + Send {
        (**self).publish(event)
    }
}
