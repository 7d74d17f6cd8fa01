//! Shared data model for the intelligence layer.
//!
//! Everything here is supplied by the host (positioning service, motion
//! sensors, camera summarizer) and consumed read-only by the estimators.
//! Unit-specific inputs and outputs live next to the unit that owns them.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Milliseconds on the session's monotonic clock.
pub type TimestampMs = u64;

// ============================================================================
// COORDINATES
// ============================================================================

/// A WGS-84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    #[inline]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// A point in a building-local planar frame, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

// ============================================================================
// SENSOR INPUTS
// ============================================================================

/// A fix from the host positioning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationFix {
    pub position: GeoPoint,

    /// Horizontal accuracy radius in meters
    pub accuracy_m: f64,

    /// Course over ground, degrees clockwise from north
    #[serde(default)]
    pub heading_deg: Option<f64>,

    /// Ground speed in m/s
    #[serde(default)]
    pub speed_mps: Option<f64>,

    pub timestamp_ms: TimestampMs,
}

/// Semantic type of a geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceKind {
    Building,
    IndoorZone,
    OutdoorArea,
}

impl GeofenceKind {
    /// Whether being inside this geofence is evidence of being indoors.
    pub fn is_indoor(&self) -> bool {
        matches!(self, GeofenceKind::Building | GeofenceKind::IndoorZone)
    }
}

/// A named doorway of a building geofence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPoint {
    pub id: String,
    pub name: String,
    pub position: GeoPoint,
}

/// A named polygonal area used for containment tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    pub id: String,
    pub name: String,
    pub kind: GeofenceKind,

    /// Closed ring of vertices; the closing edge is implicit
    pub polygon: Vec<GeoPoint>,

    #[serde(default)]
    pub floor: Option<i32>,

    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
}

/// One sample from the host motion sensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InertialSample {
    /// Linear acceleration in m/s², device frame
    #[serde(default)]
    pub acceleration: Option<Vector3<f64>>,

    /// Angular rate in rad/s, device frame (z = yaw)
    #[serde(default)]
    pub angular_rate: Option<Vector3<f64>>,

    pub timestamp_ms: TimestampMs,
}

/// Compact summary of a camera frame. Never carries pixels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraFrame {
    pub timestamp_ms: TimestampMs,

    #[serde(default)]
    pub features: Option<Vec<f32>>,

    /// Summarizer's verdict that the scene looks like an interior
    #[serde(default)]
    pub indoor_hint: Option<bool>,
}

// ============================================================================
// UNIT OUTCOME
// ============================================================================

/// Result of one unit for one tick.
///
/// A unit either produces a complete value with a confidence, or fails with
/// a reason and zero confidence. There is no partially populated success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome<T> {
    Ok { value: T, confidence: f64 },
    Failed { reason: String, confidence: f64 },
}

impl<T> UnitOutcome<T> {
    /// Successful outcome; confidence is clamped to [0, 1].
    pub fn ok(value: T, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        UnitOutcome::Ok { value, confidence }
    }

    /// Failed outcome with zero confidence.
    pub fn failed(reason: impl Into<String>) -> Self {
        UnitOutcome::Failed {
            reason: reason.into(),
            confidence: 0.0,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, UnitOutcome::Ok { .. })
    }

    pub fn confidence(&self) -> f64 {
        match self {
            UnitOutcome::Ok { confidence, .. } | UnitOutcome::Failed { confidence, .. } => *confidence,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            UnitOutcome::Ok { value, .. } => Some(value),
            UnitOutcome::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            UnitOutcome::Ok { .. } => None,
            UnitOutcome::Failed { reason, .. } => Some(reason),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            UnitOutcome::Ok { value, .. } => Some(value),
            UnitOutcome::Failed { .. } => None,
        }
    }
}
