//! Simulated [`LocationProvider`] fed by hand or by replaying a track.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use homeflow_app::ports::LocationProvider;
use homeflow_domain::error::{HomeflowError, NotFoundError};
use homeflow_domain::geo::{Coordinates, Location};
use homeflow_domain::time::now;

/// Location provider whose fixes come from [`push`](Self::push) or
/// [`replay`](Self::replay).
pub struct SimulatedLocationProvider {
    sender: broadcast::Sender<Location>,
    current: Mutex<Option<Location>>,
    permitted: bool,
}

impl Default for SimulatedLocationProvider {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(32);
        Self {
            sender,
            current: Mutex::new(None),
            permitted: true,
        }
    }
}

impl SimulatedLocationProvider {
    /// A provider that refuses location permission.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            permitted: false,
            ..Self::default()
        }
    }

    /// Publish a fix to watchers and make it the current position.
    pub fn push(&self, location: Location) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(location);
        // no watchers is fine
        let _ = self.sender.send(location);
    }

    /// Push each point of `track` in turn, waiting `interval` before each.
    pub fn replay(
        self: &Arc<Self>,
        track: Vec<Coordinates>,
        accuracy: f64,
        interval: Duration,
    ) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            for point in track {
                tokio::time::sleep(interval).await;
                tracing::debug!(lat = point.lat, lng = point.lng, "simulated fix");
                provider.push(Location {
                    lat: point.lat,
                    lng: point.lng,
                    accuracy,
                    timestamp: now(),
                });
            }
        })
    }
}

impl LocationProvider for SimulatedLocationProvider {
    async fn request_permission(&self) -> bool {
        self.permitted
    }

    async fn current_position(&self) -> Result<Location, HomeflowError> {
        let current = *self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.ok_or_else(|| {
            NotFoundError {
                entity: "location fix",
                id: "current".to_string(),
            }
            .into()
        })
    }

    fn watch(&self) -> BoxStream<'static, Location> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(|fix| futures::future::ready(fix.ok()))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paris() -> Coordinates {
        Coordinates {
            lat: 48.8566,
            lng: 2.3522,
        }
    }

    #[tokio::test]
    async fn should_have_no_position_before_first_fix() {
        let provider = SimulatedLocationProvider::default();
        assert!(matches!(
            provider.current_position().await,
            Err(HomeflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn should_refuse_permission_when_denied() {
        assert!(!SimulatedLocationProvider::denied().request_permission().await);
        assert!(SimulatedLocationProvider::default().request_permission().await);
    }

    #[tokio::test]
    async fn should_deliver_pushed_fix_to_watchers() {
        let provider = SimulatedLocationProvider::default();
        let mut fixes = provider.watch();
        let fix = Location {
            lat: 1.0,
            lng: 2.0,
            accuracy: 5.0,
            timestamp: now(),
        };

        provider.push(fix);

        assert_eq!(fixes.next().await, Some(fix));
        assert_eq!(provider.current_position().await.unwrap(), fix);
    }

    #[tokio::test(start_paused = true)]
    async fn should_replay_track_in_order() {
        let provider = Arc::new(SimulatedLocationProvider::default());
        let mut fixes = provider.watch();
        let away = Coordinates {
            lat: 48.8666,
            lng: 2.3522,
        };

        let handle = provider.replay(vec![away, paris()], 8.0, Duration::from_secs(5));

        let first = fixes.next().await.unwrap();
        let second = fixes.next().await.unwrap();
        handle.await.unwrap();

        assert_eq!(first.coordinates(), away);
        assert_eq!(second.coordinates(), paris());
        assert_eq!(provider.current_position().await.unwrap().coordinates(), paris());
    }
}
