//! ARNav Core - Intelligence Layer for Pedestrian AR Navigation
//!
//! Four cooperating estimators turn noisy, heterogeneous inputs into a few
//! stable, AR-renderable decisions per tick:
//! 1. **Regime** (Unit A): is the user indoors, outdoors, or in between
//! 2. **Pose** (Unit B): where the user is inside a building
//! 3. **Guidance** (Unit C): the next physical action and its AR anchor
//! 4. **POIs** (Unit D): which nearby points of interest deserve attention
//!
//! The `Orchestrator` runs them in dependency order, isolates failures per
//! unit, and can drive itself on a rate-limited background loop.

pub mod types;
pub mod geometry;
pub mod config;
pub mod regime;
pub mod pose;
pub mod guidance;
pub mod poi;
pub mod orchestrator;
pub mod validation;

// Re-export key types for convenience
pub use config::{ConfigError, IntelligenceConfig, LoopConfig};
pub use guidance::{ActionGuidance, CurrentPose, GuidanceAction, GuidanceGenerator, Route, RoutePoint, RouteStep};
pub use orchestrator::{InputSource, LoopError, Orchestrator, Pipeline, TickInput, TickOutput};
pub use poi::{Poi, PoiCategory, PoiRecognition, PoiRecognizer, UserGoal};
pub use pose::{IndoorMap, IndoorPose, PoseEstimator};
pub use regime::{Regime, RegimeClassifier, RegimeResult};
pub use types::{CameraFrame, GeoPoint, Geofence, InertialSample, LocationFix, PlanarPoint, UnitOutcome};
pub use validation::{GroundTruth, ValidationReport, ValidationSession};
