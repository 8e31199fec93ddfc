//! Location provider port — position fixes for geofence monitoring.

use std::future::Future;

use futures::stream::BoxStream;

use homeflow_domain::error::HomeflowError;
use homeflow_domain::geo::Location;

/// Supplies position fixes, either pushed or on demand.
pub trait LocationProvider {
    /// Ask the platform for permission to read the location.
    ///
    /// Resolves to `false` when the user refused.
    fn request_permission(&self) -> impl Future<Output = bool> + Send;

    /// A one-off fix.
    ///
    /// # Errors
    ///
    /// Returns an error when no fix is currently available.
    fn current_position(&self) -> impl Future<Output = Result<Location, HomeflowError>> + Send;

    /// Continuous updates. The stream may stall or end on some platforms.
    fn watch(&self) -> BoxStream<'static, Location>;
}

impl<T: LocationProvider + Send + Sync> LocationProvider for std::sync::Arc<T> {
    fn request_permission(&self) -> impl Future<Output = bool> + Send {
        (**self).request_permission()
    }

    fn current_position(&self) -> impl Future<Output = Result<Location, HomeflowError>> + Send {
        (**self).current_position()
    }

    fn watch(&self) -> BoxStream<'static, Location> {
        (**self).watch()
    }
}
