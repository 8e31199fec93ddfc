//! Flow inputs port — the live readings condition nodes compare against.

use homeflow_domain::id::DeviceId;

/// Current readings for flow condition nodes.
///
/// `source` is the device named by the node, if any; implementations fall
/// back to a default sensor when it is `None`.
pub trait FlowInputs {
    /// Current temperature in degrees.
    fn temperature(&self, source: Option<&DeviceId>) -> Option<f64>;

    /// Whether someone is present.
    fn presence(&self, source: Option<&DeviceId>) -> Option<bool>;

    /// Local minute of day, `0..1440`.
    fn minute_of_day(&self) -> u32;
}

impl<T: FlowInputs> FlowInputs for std::sync::Arc<T> {
    fn temperature(&self, source: Option<&DeviceId>) -> Option<f64> {
        (**self).temperature(source)
    }

    fn presence(&self, source: Option<&DeviceId>) -> Option<bool> {
        (**self).presence(source)
    }

    fn minute_of_day(&self) -> u32 {
        (**self).minute_of_day()
    }
}
