//! Geofences, locations and great-circle distance.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::GeofenceId;
use crate::time::Timestamp;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Build coordinates, checking latitude and longitude ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCoordinates`] when `lat` is outside
    /// `-90..=90`, `lng` is outside `-180..=180`, or either is not finite.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError::InvalidCoordinates { lat, lng });
        }
        Ok(Self { lat, lng })
    }
}

/// Great-circle distance in metres between two points (Haversine).
#[must_use]
pub fn haversine_distance(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// A position fix from a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    /// Horizontal accuracy radius in metres; larger is worse.
    pub accuracy: f64,
    pub timestamp: Timestamp,
}

impl Location {
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// A circular region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    #[serde(default)]
    pub id: GeofenceId,
    pub name: String,
    pub center: Coordinates,
    /// Radius in metres.
    pub radius: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "crate::time::now")]
    pub created: Timestamp,
}

fn default_enabled() -> bool {
    true
}

impl Geofence {
    /// Create an enabled geofence after validating its parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty name, out-of-range centre
    /// or non-positive radius.
    pub fn new(
        name: impl Into<String>,
        center: Coordinates,
        radius: f64,
    ) -> Result<Self, ValidationError> {
        let geofence = Self {
            id: GeofenceId::new(),
            name: name.into(),
            center,
            radius,
            enabled: true,
            created: crate::time::now(),
        };
        geofence.validate()?;
        Ok(geofence)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// See [`Geofence::new`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Coordinates::new(self.center.lat, self.center.lng)?;
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ValidationError::InvalidRadius(self.radius));
        }
        Ok(())
    }

    /// Distance from the centre to `point`, in metres.
    #[must_use]
    pub fn distance_to(&self, point: Coordinates) -> f64 {
        haversine_distance(self.center, point)
    }

    /// Whether `point` lies inside the fence (boundary inclusive).
    #[must_use]
    pub fn contains(&self, point: Coordinates) -> bool {
        self.distance_to(point) <= self.radius
    }
}

/// Partial update for a [`Geofence`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeofenceUpdate {
    pub name: Option<String>,
    pub center: Option<Coordinates>,
    pub radius: Option<f64>,
    pub enabled: Option<bool>,
}

impl GeofenceUpdate {
    /// Apply the update to a copy of `geofence` and validate the result.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the updated fence is invalid.
    pub fn apply(self, geofence: &Geofence) -> Result<Geofence, ValidationError> {
        let mut updated = geofence.clone();
        if let Some(name) = self.name {
            updated.name = name;
        }
        if let Some(center) = self.center {
            updated.center = center;
        }
        if let Some(radius) = self.radius {
            updated.radius = radius;
        }
        if let Some(enabled) = self.enabled {
            updated.enabled = enabled;
        }
        updated.validate()?;
        Ok(updated)
    }
}

/// Direction of a geofence transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceEventKind {
    Enter,
    Leave,
}

impl std::fmt::Display for GeofenceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enter => f.write_str("enter"),
            Self::Leave => f.write_str("leave"),
        }
    }
}

/// Containment state tracked per geofence.
///
/// `is_inside == None` is the unknown pre-state before the first accepted
/// fix. Both timestamps survive later transitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceState {
    pub geofence_id: GeofenceId,
    pub is_inside: Option<bool>,
    pub last_update: Option<Timestamp>,
    pub entered_at: Option<Timestamp>,
    pub left_at: Option<Timestamp>,
}

impl GeofenceState {
    #[must_use]
    pub fn unknown(geofence_id: GeofenceId) -> Self {
        Self {
            geofence_id,
            is_inside: None,
            last_update: None,
            entered_at: None,
            left_at: None,
        }
    }

    /// Feed a containment observation, returning the transition it causes.
    ///
    /// A first observation of "outside" is absorbed silently; a first
    /// observation of "inside" counts as an enter.
    pub fn observe(&mut self, inside: bool, at: Timestamp) -> Option<GeofenceEventKind> {
        let previous = self.is_inside.replace(inside);
        self.last_update = Some(at);
        match (previous, inside) {
            (None | Some(false), true) => {
                self.entered_at = Some(at);
                Some(GeofenceEventKind::Enter)
            }
            (Some(true), false) => {
                self.left_at = Some(at);
                Some(GeofenceEventKind::Leave)
            }
            _ => None,
        }
    }
}

/// A transition emitted by geofence monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceEvent {
    pub geofence_id: GeofenceId,
    pub geofence_name: String,
    pub kind: GeofenceEventKind,
    pub location: Location,
    pub distance: f64,
    pub timestamp: Timestamp,
}
