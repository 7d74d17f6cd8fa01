//! Ground-truth pedestrian model.
//!
//! The walker follows a polyline through the venue at constant speed and,
//! each tick, synthesizes what a phone would report:
//! - a GPS fix whose noise and reported accuracy degrade indoors
//! - an inertial sample consistent with the true displacement
//! - a camera summary, with appearance features near known fixtures
//! - an occasional VPS fix while indoors

use std::sync::Arc;

use arnav_core::geometry::{normalize_angle, planar_bearing, planar_distance};
use arnav_core::pose::VpsFix;
use arnav_core::{CameraFrame, GuidanceAction, InertialSample, LocationFix, PlanarPoint};
use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::venue::{compass_heading, Venue};

/// Noise model and sensor cadence of the simulated phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// Walking speed in m/s (default: 1.2)
    pub speed_mps: f64,

    /// GPS position noise outdoors, 1σ in meters (default: 2.0)
    pub outdoor_gps_sigma_m: f64,

    /// Accuracy radius the phone reports outdoors (default: 4.0)
    pub outdoor_accuracy_m: f64,

    /// GPS position noise indoors, 1σ in meters (default: 6.0)
    pub indoor_gps_sigma_m: f64,

    /// Accuracy radius the phone reports indoors (default: 25.0)
    pub indoor_accuracy_m: f64,

    /// Ground speed noise, m/s (default: 0.1)
    pub speed_sigma_mps: f64,

    /// Course-over-ground noise, degrees (default: 3.0)
    pub heading_sigma_deg: f64,

    /// Accelerometer noise per axis (default: 0.05)
    pub accel_sigma: f64,

    /// Gyro noise, rad/s (default: 0.005)
    pub gyro_sigma: f64,

    /// Constant gyro bias, rad/s (default: 0.0)
    pub gyro_bias: f64,

    /// Camera feature noise per component (default: 0.03)
    pub feature_sigma: f64,

    /// Fixtures closer than this are in view (default: 4.0 m)
    pub visibility_m: f64,

    /// Indoor ticks between VPS fixes, `None` for no VPS (default: 10)
    pub vps_interval_ticks: Option<u64>,

    /// VPS position noise, meters (default: 0.5)
    pub vps_sigma_m: f64,

    /// Confidence the VPS reports (default: 0.85)
    pub vps_confidence: f64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            speed_mps: 1.2,
            outdoor_gps_sigma_m: 2.0,
            outdoor_accuracy_m: 4.0,
            indoor_gps_sigma_m: 6.0,
            indoor_accuracy_m: 25.0,
            speed_sigma_mps: 0.1,
            heading_sigma_deg: 3.0,
            accel_sigma: 0.05,
            gyro_sigma: 0.005,
            gyro_bias: 0.0,
            feature_sigma: 0.03,
            visibility_m: 4.0,
            vps_interval_ticks: Some(10),
            vps_sigma_m: 0.5,
            vps_confidence: 0.85,
        }
    }
}

impl WalkerConfig {
    /// Perfect sensors; useful for checking the estimators' arithmetic.
    pub fn noiseless() -> Self {
        Self {
            outdoor_gps_sigma_m: 0.0,
            indoor_gps_sigma_m: 0.0,
            speed_sigma_mps: 0.0,
            heading_sigma_deg: 0.0,
            accel_sigma: 0.0,
            gyro_sigma: 0.0,
            gyro_bias: 0.0,
            feature_sigma: 0.0,
            vps_sigma_m: 0.0,
            ..Self::default()
        }
    }
}

/// What the phone reports for one tick.
#[derive(Debug, Clone)]
pub struct SensorFrame {
    pub fix: LocationFix,
    pub camera: CameraFrame,
    pub inertial: InertialSample,
    pub vps: Option<VpsFix>,
}

/// Where the walker really is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthState {
    pub position: PlanarPoint,
    pub floor: i32,
    pub heading_deg: f64,
    pub indoor: bool,
}

pub struct Walker {
    config: WalkerConfig,
    venue: Arc<Venue>,
    path: Vec<PlanarPoint>,
    floor: i32,

    /// Index of the path vertex the current segment starts at
    segment: usize,
    position: PlanarPoint,
    heading_deg: f64,
    indoor_ticks: u64,
    rng: ChaCha8Rng,
}

impl Walker {
    pub fn new(
        venue: Arc<Venue>,
        path: Vec<PlanarPoint>,
        floor: i32,
        config: WalkerConfig,
        rng: ChaCha8Rng,
    ) -> Result<Self, SimError> {
        let Some(&start) = path.first() else {
            return Err(SimError::EmptyPath);
        };
        let heading_deg = segment_heading(&path, 0).unwrap_or(0.0);
        Ok(Self {
            config,
            venue,
            path,
            floor,
            segment: 0,
            position: start,
            heading_deg,
            indoor_ticks: 0,
            rng,
        })
    }

    pub fn truth(&self) -> TruthState {
        TruthState {
            position: self.position,
            floor: self.floor,
            heading_deg: self.heading_deg,
            indoor: self.venue.is_inside(self.position),
        }
    }

    /// True once the last waypoint has been reached.
    pub fn finished(&self) -> bool {
        self.segment + 1 >= self.path.len()
    }

    /// The action a human guide would give right now, when unambiguous.
    ///
    /// Only long straight stretches qualify: well past the last corner and
    /// closer to it than to the next one.
    pub fn expected_action(&self) -> Option<GuidanceAction> {
        if self.finished() {
            return None;
        }
        let from_start = planar_distance(self.path[self.segment], self.position);
        let to_end = planar_distance(self.position, self.path[self.segment + 1]);
        (from_start > 4.0 && from_start < to_end).then_some(GuidanceAction::GoStraight)
    }

    /// Advance `dt_s` seconds and report the phone's sensors at `now_ms`.
    pub fn step(&mut self, dt_s: f64, now_ms: u64) -> SensorFrame {
        let previous_heading = self.heading_deg;
        let moved = self.advance(self.config.speed_mps * dt_s);
        let truth = self.truth();

        let fix = self.location_fix(&truth, moved, dt_s, now_ms);
        let inertial = self.inertial_sample(previous_heading, moved, dt_s, now_ms);
        let camera = CameraFrame {
            timestamp_ms: now_ms,
            features: if truth.indoor { self.features_in_view(&truth) } else { None },
            indoor_hint: Some(truth.indoor),
        };
        let vps = if truth.indoor { self.vps_fix(&truth) } else { None };
        if truth.indoor {
            self.indoor_ticks += 1;
        }

        SensorFrame {
            fix,
            camera,
            inertial,
            vps,
        }
    }

    /// Move `distance` meters along the path; returns the distance covered.
    fn advance(&mut self, distance: f64) -> f64 {
        let mut remaining = distance;
        let mut moved = 0.0;

        while remaining > 0.0 && !self.finished() {
            let target = self.path[self.segment + 1];
            let d = planar_distance(self.position, target);
            if d <= remaining {
                self.position = target;
                remaining -= d;
                moved += d;
                self.segment += 1;
                if let Some(h) = segment_heading(&self.path, self.segment) {
                    self.heading_deg = h;
                }
            } else {
                let h = planar_bearing(self.position, target);
                let rad = h.to_radians();
                self.position = PlanarPoint::new(
                    self.position.x + rad.cos() * remaining,
                    self.position.y + rad.sin() * remaining,
                );
                self.heading_deg = h;
                moved += remaining;
                remaining = 0.0;
            }
        }
        moved
    }

    fn location_fix(&mut self, truth: &TruthState, moved: f64, dt_s: f64, now_ms: u64) -> LocationFix {
        let (sigma, accuracy_m) = if truth.indoor {
            (self.config.indoor_gps_sigma_m, self.config.indoor_accuracy_m)
        } else {
            (self.config.outdoor_gps_sigma_m, self.config.outdoor_accuracy_m)
        };
        let noisy = PlanarPoint::new(
            truth.position.x + gaussian(&mut self.rng, sigma),
            truth.position.y + gaussian(&mut self.rng, sigma),
        );
        let speed = if dt_s > 0.0 { moved / dt_s } else { 0.0 };

        // GPS course is meaningless indoors or at a standstill
        let heading_deg = (!truth.indoor && moved > 0.0).then(|| {
            let noise = gaussian(&mut self.rng, self.config.heading_sigma_deg);
            compass_heading(truth.heading_deg + noise)
        });

        LocationFix {
            position: self.venue.to_geo(noisy),
            accuracy_m,
            heading_deg,
            speed_mps: Some((speed + gaussian(&mut self.rng, self.config.speed_sigma_mps)).max(0.0)),
            timestamp_ms: now_ms,
        }
    }

    /// Acceleration magnitude is scaled so that |a|·dt² equals the distance
    /// walked, which is the displacement model the pose estimator inverts.
    fn inertial_sample(&mut self, previous_heading: f64, moved: f64, dt_s: f64, now_ms: u64) -> InertialSample {
        let (accel, yaw_rate) = if dt_s > 0.0 {
            let turn = normalize_angle(self.heading_deg - previous_heading);
            (moved / (dt_s * dt_s), turn.to_radians() / dt_s)
        } else {
            (0.0, 0.0)
        };
        let sigma = self.config.accel_sigma;

        InertialSample {
            acceleration: Some(Vector3::new(
                accel + gaussian(&mut self.rng, sigma),
                gaussian(&mut self.rng, sigma),
                gaussian(&mut self.rng, sigma),
            )),
            angular_rate: Some(Vector3::new(
                0.0,
                0.0,
                yaw_rate + self.config.gyro_bias + gaussian(&mut self.rng, self.config.gyro_sigma),
            )),
            timestamp_ms: now_ms,
        }
    }

    /// Noisy signature of the nearest fixture in view, landmarks first.
    fn features_in_view(&mut self, truth: &TruthState) -> Option<Vec<f32>> {
        let visibility = self.config.visibility_m;
        let landmark = self
            .venue
            .indoor_map
            .zones
            .iter()
            .filter(|z| z.floor == truth.floor)
            .flat_map(|z| z.landmarks.iter())
            .filter_map(|l| Some((planar_distance(l.position, truth.position), l.features.as_ref()?)))
            .filter(|(d, _)| *d <= visibility)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        let poi = || {
            self.venue
                .catalog
                .iter()
                .filter(|p| p.position.floor == truth.floor)
                .filter_map(|p| Some((planar_distance(p.position.planar(), truth.position), p.features.as_ref()?)))
                .filter(|(d, _)| *d <= visibility)
                .min_by(|a, b| a.0.total_cmp(&b.0))
        };
        let signature = landmark.or_else(poi)?.1.clone();

        let sigma = self.config.feature_sigma;
        Some(
            signature
                .iter()
                .map(|v| v + gaussian(&mut self.rng, sigma) as f32)
                .collect(),
        )
    }

    fn vps_fix(&mut self, truth: &TruthState) -> Option<VpsFix> {
        let interval = self.config.vps_interval_ticks.filter(|n| *n > 0)?;
        if self.indoor_ticks % interval != 0 {
            return None;
        }
        let sigma = self.config.vps_sigma_m;
        Some(VpsFix {
            position: PlanarPoint::new(
                truth.position.x + gaussian(&mut self.rng, sigma),
                truth.position.y + gaussian(&mut self.rng, sigma),
            ),
            floor: truth.floor,
            heading_deg: truth.heading_deg + gaussian(&mut self.rng, 2.0 * sigma),
            confidence: self.config.vps_confidence,
        })
    }
}

/// Heading of the first non-degenerate segment starting at `index`.
fn segment_heading(path: &[PlanarPoint], index: usize) -> Option<f64> {
    path[index..]
        .windows(2)
        .find(|w| planar_distance(w[0], w[1]) > f64::EPSILON)
        .map(|w| planar_bearing(w[0], w[1]))
}

/// Zero-mean Gaussian sample; a zero or invalid σ yields no noise.
fn gaussian<R: Rng>(rng: &mut R, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return 0.0;
    }
    Normal::new(0.0, sigma).map_or(0.0, |n| n.sample(rng))
}
