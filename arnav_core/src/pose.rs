//! Unit B: indoor pose estimation.
//!
//! A confident visual positioning (VPS) fix is adopted directly. Otherwise
//! a small set of hypotheses is generated from the available evidence and
//! the highest scoring one wins:
//!
//! - **Landmark**: camera features matched against known landmarks
//! - **DeadReckoning**: last pose propagated with the inertial sample
//! - **Inertia**: last pose unchanged
//! - **MapConstraint**: centroids of nearby zones on the current floor
//!
//! The estimator only sees what it is handed each tick; the orchestrator
//! decides which pose becomes the next tick's `last_pose`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{centroid, cosine_similarity, normalize_heading, planar_distance, planar_point_in_polygon};
use crate::types::{CameraFrame, InertialSample, PlanarPoint, TimestampMs, UnitOutcome};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// VPS fixes above this confidence are adopted directly (default: 0.7)
    pub vps_accept_confidence: f64,

    /// Landmark matches must exceed this similarity (default: 0.6)
    pub landmark_min_similarity: f64,

    /// Landmark hypothesis score = similarity × this (default: 0.8)
    pub landmark_score_weight: f64,

    /// Similarity above which a landmark boosts confidence (default: 0.7)
    pub landmark_boost_similarity: f64,

    /// Boosted confidence = similarity × this (default: 0.9)
    pub landmark_boost_factor: f64,

    pub dead_reckoning_score: f64,
    pub dead_reckoning_confidence: f64,
    pub inertia_score: f64,
    pub map_constraint_score: f64,
    pub map_constraint_confidence: f64,

    /// Zones whose centroid lies within this radius are candidates (default: 20 m)
    pub map_constraint_radius_m: f64,

    /// Displacement from the previous estimate that counts as a jump (default: 10 m)
    pub jump_threshold_m: f64,

    /// Confidence multiplier applied on a jump (default: 0.7)
    pub jump_penalty: f64,

    /// Confidence below which relocalization is requested (default: 0.5)
    pub relocalization_threshold: f64,

    /// Confidence used when the winning hypothesis carries none (default: 0.5)
    pub fallback_confidence: f64,

    /// Upper bound on the dead-reckoning interval (default: 1 s)
    pub max_dead_reckoning_dt_s: f64,

    /// Number of recent estimates retained (default: 10)
    pub history_len: usize,

    /// Orchestrator only adopts poses at or above this confidence (default: 0.3)
    pub min_accept_confidence: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            vps_accept_confidence: 0.7,
            landmark_min_similarity: 0.6,
            landmark_score_weight: 0.8,
            landmark_boost_similarity: 0.7,
            landmark_boost_factor: 0.9,
            dead_reckoning_score: 0.5,
            dead_reckoning_confidence: 0.6,
            inertia_score: 0.3,
            map_constraint_score: 0.2,
            map_constraint_confidence: 0.4,
            map_constraint_radius_m: 20.0,
            jump_threshold_m: 10.0,
            jump_penalty: 0.7,
            relocalization_threshold: 0.5,
            fallback_confidence: 0.5,
            max_dead_reckoning_dt_s: 1.0,
            history_len: 10,
            min_accept_confidence: 0.3,
        }
    }
}

// ============================================================================
// INDOOR MAP
// ============================================================================

/// A visually recognizable fixture with a known position.
///
/// Planar coordinates are floor-plan meters: x right, y down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landmark {
    pub id: String,
    pub name: String,
    pub position: PlanarPoint,

    /// Defaults to the owning zone's floor
    #[serde(default)]
    pub floor: Option<i32>,

    #[serde(default)]
    pub features: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndoorZone {
    pub id: String,
    pub name: String,
    pub floor: i32,
    pub polygon: Vec<PlanarPoint>,

    #[serde(default)]
    pub landmarks: Vec<Landmark>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndoorMap {
    pub zones: Vec<IndoorZone>,
}

impl IndoorMap {
    /// Zone on `floor` whose polygon contains `position`.
    pub fn zone_at(&self, position: PlanarPoint, floor: i32) -> Option<&IndoorZone> {
        self.zones
            .iter()
            .find(|z| z.floor == floor && planar_point_in_polygon(position, &z.polygon))
    }

    pub fn zone(&self, id: &str) -> Option<&IndoorZone> {
        self.zones.iter().find(|z| z.id == id)
    }
}

/// A fix from an external visual positioning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpsFix {
    pub position: PlanarPoint,
    pub floor: i32,
    pub heading_deg: f64,
    pub confidence: f64,
}

// ============================================================================
// POSE
// ============================================================================

/// Estimated indoor pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndoorPose {
    pub position: PlanarPoint,
    pub floor: i32,

    /// Planar heading in [0, 360): 0° along +x, 90° along +y
    pub heading_deg: f64,

    pub zone_id: Option<String>,
    pub confidence: f64,
    pub relocalization_needed: bool,
    pub timestamp_ms: TimestampMs,
}

/// Per-tick input to the estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseInput<'a> {
    pub camera: Option<&'a CameraFrame>,
    pub inertial: Option<&'a InertialSample>,
    pub map: Option<&'a IndoorMap>,

    /// Landmarks supplied outside the map
    pub landmarks: &'a [Landmark],

    pub vps: Option<&'a VpsFix>,
    pub last_pose: Option<&'a IndoorPose>,
}

// ============================================================================
// HYPOTHESES
// ============================================================================

/// Pose proposed by one hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCandidate {
    pub position: PlanarPoint,
    pub floor: i32,
    pub heading_deg: f64,
    pub confidence: f64,
    pub zone_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Hypothesis {
    Landmark { candidate: PoseCandidate, similarity: f64 },
    DeadReckoning { candidate: PoseCandidate },
    Inertia { candidate: PoseCandidate },
    MapConstraint { candidate: PoseCandidate },
}

impl Hypothesis {
    pub fn candidate(&self) -> &PoseCandidate {
        match self {
            Hypothesis::Landmark { candidate, .. }
            | Hypothesis::DeadReckoning { candidate }
            | Hypothesis::Inertia { candidate }
            | Hypothesis::MapConstraint { candidate } => candidate,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Hypothesis::Landmark { .. } => "landmark",
            Hypothesis::DeadReckoning { .. } => "dead_reckoning",
            Hypothesis::Inertia { .. } => "inertia",
            Hypothesis::MapConstraint { .. } => "map_constraint",
        }
    }
}

/// Pure scoring of a hypothesis by kind and evidence.
pub fn hypothesis_score(hypothesis: &Hypothesis, config: &PoseConfig) -> f64 {
    match hypothesis {
        Hypothesis::Landmark { similarity, .. } => similarity * config.landmark_score_weight,
        Hypothesis::DeadReckoning { .. } => config.dead_reckoning_score,
        Hypothesis::Inertia { .. } => config.inertia_score,
        Hypothesis::MapConstraint { .. } => config.map_constraint_score,
    }
}

/// Highest scoring hypothesis; the earliest wins ties.
pub fn select_best<'a>(hypotheses: &'a [Hypothesis], config: &PoseConfig) -> Option<&'a Hypothesis> {
    let mut best: Option<(&Hypothesis, f64)> = None;
    for h in hypotheses {
        let score = hypothesis_score(h, config);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((h, score));
        }
    }
    best.map(|(h, _)| h)
}

/// Best landmark match for a set of camera features.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkMatch {
    pub landmark_id: String,
    pub position: PlanarPoint,
    pub floor: i32,
    pub similarity: f64,
}

/// Match features against every landmark in the map and the extra list.
///
/// Landmarks without features are skipped. Extra landmarks without a floor
/// take `default_floor`.
pub fn match_landmarks(
    features: &[f32],
    map: Option<&IndoorMap>,
    extra: &[Landmark],
    default_floor: i32,
) -> Option<LandmarkMatch> {
    let zoned = map
        .into_iter()
        .flat_map(|m| m.zones.iter())
        .flat_map(|z| z.landmarks.iter().map(move |l| (l, l.floor.unwrap_or(z.floor))));
    let loose = extra.iter().map(|l| (l, l.floor.unwrap_or(default_floor)));

    let mut best: Option<LandmarkMatch> = None;
    for (landmark, floor) in zoned.chain(loose) {
        let Some(reference) = landmark.features.as_deref() else {
            continue;
        };
        let similarity = cosine_similarity(features, reference);
        if best.as_ref().map_or(true, |b| similarity > b.similarity) {
            best = Some(LandmarkMatch {
                landmark_id: landmark.id.clone(),
                position: landmark.position,
                floor,
                similarity,
            });
        }
    }
    best
}

/// Propagate a pose with one inertial sample over `dt_s` seconds.
///
/// Speed is estimated as |a_xy|·dt and the displacement is speed·dt along
/// the current heading. Heading integrates the yaw rate. Missing channels
/// leave the corresponding quantity unchanged.
pub fn dead_reckon(last: &IndoorPose, sample: &InertialSample, dt_s: f64) -> PoseCandidate {
    let mut position = last.position;
    let mut heading = last.heading_deg;

    if let Some(accel) = sample.acceleration {
        let speed = accel.x.hypot(accel.y) * dt_s;
        let distance = speed * dt_s;
        if distance > 0.0 {
            let h = heading.to_radians();
            position.x += h.cos() * distance;
            position.y += h.sin() * distance;
        }
    }

    if let Some(rate) = sample.angular_rate {
        let turn = rate.z * dt_s;
        if turn != 0.0 {
            heading = normalize_heading(heading + turn.to_degrees());
        }
    }

    PoseCandidate {
        position,
        floor: last.floor,
        heading_deg: heading,
        confidence: 0.0,
        zone_id: last.zone_id.clone(),
    }
}

// ============================================================================
// ESTIMATOR
// ============================================================================

pub struct PoseEstimator {
    config: PoseConfig,
    history: VecDeque<IndoorPose>,
}

impl PoseEstimator {
    pub fn new(config: PoseConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PoseConfig::default())
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    pub fn history(&self) -> impl Iterator<Item = &IndoorPose> {
        self.history.iter()
    }

    pub fn initialize(&mut self) {
        self.history.clear();
    }

    pub fn cleanup(&mut self) {
        self.history.clear();
        self.history.shrink_to_fit();
    }

    pub fn tick(&mut self, input: &PoseInput<'_>, now_ms: TimestampMs) -> UnitOutcome<IndoorPose> {
        match self.estimate(input, now_ms) {
            Ok(pose) => {
                let confidence = pose.confidence;
                UnitOutcome::ok(pose, confidence)
            }
            Err(e) => {
                warn!(error = %e, "Indoor pose estimation failed");
                UnitOutcome::failed(e.to_string())
            }
        }
    }

    pub fn estimate(&mut self, input: &PoseInput<'_>, now_ms: TimestampMs) -> Result<IndoorPose, PoseError> {
        if let Some(last) = input.last_pose {
            if now_ms < last.timestamp_ms {
                debug!(now_ms, last = last.timestamp_ms, "Stale tick; keeping last pose");
                return Ok(last.clone());
            }
        }

        if let Some(vps) = input.vps {
            if !vps.position.is_finite() || !vps.heading_deg.is_finite() {
                return Err(PoseError::InvalidInput("non-finite VPS fix".into()));
            }
            if vps.confidence > self.config.vps_accept_confidence {
                let pose = IndoorPose {
                    position: vps.position,
                    floor: vps.floor,
                    heading_deg: normalize_heading(vps.heading_deg),
                    zone_id: input
                        .map
                        .and_then(|m| m.zone_at(vps.position, vps.floor))
                        .map(|z| z.id.clone()),
                    confidence: vps.confidence.clamp(0.0, 1.0),
                    relocalization_needed: false,
                    timestamp_ms: now_ms,
                };
                debug!(x = pose.position.x, y = pose.position.y, "Adopted VPS fix");
                self.remember(pose.clone());
                return Ok(pose);
            }
        }

        let default_floor = input.last_pose.map_or(0, |p| p.floor);
        let landmark = input
            .camera
            .and_then(|c| c.features.as_deref())
            .and_then(|f| match_landmarks(f, input.map, input.landmarks, default_floor));

        let hypotheses = self.generate_hypotheses(input, landmark.as_ref(), now_ms);
        let Some(winner) = select_best(&hypotheses, &self.config) else {
            return Err(PoseError::NoViableHypothesis);
        };
        let chosen = winner.candidate();

        let mut confidence = if chosen.confidence > 0.0 {
            chosen.confidence
        } else {
            self.config.fallback_confidence
        };
        if let Some(m) = &landmark {
            if m.similarity > self.config.landmark_boost_similarity {
                confidence = confidence.max(m.similarity * self.config.landmark_boost_factor);
            }
        }
        if let Some(prev) = self.history.back() {
            if planar_distance(prev.position, chosen.position) > self.config.jump_threshold_m {
                confidence *= self.config.jump_penalty;
            }
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let zone_id = input
            .map
            .and_then(|m| m.zone_at(chosen.position, chosen.floor))
            .map(|z| z.id.clone())
            .or_else(|| chosen.zone_id.clone());

        let pose = IndoorPose {
            position: chosen.position,
            floor: chosen.floor,
            heading_deg: chosen.heading_deg,
            zone_id,
            confidence,
            relocalization_needed: confidence < self.config.relocalization_threshold,
            timestamp_ms: now_ms,
        };

        debug!(
            hypothesis = winner.kind(),
            candidates = hypotheses.len(),
            confidence,
            relocalize = pose.relocalization_needed,
            "Indoor pose estimated"
        );

        self.remember(pose.clone());
        Ok(pose)
    }

    fn generate_hypotheses(
        &self,
        input: &PoseInput<'_>,
        landmark: Option<&LandmarkMatch>,
        now_ms: TimestampMs,
    ) -> Vec<Hypothesis> {
        let mut hypotheses = Vec::new();
        let last = input.last_pose;

        if let Some(m) = landmark.filter(|m| m.similarity > self.config.landmark_min_similarity) {
            hypotheses.push(Hypothesis::Landmark {
                candidate: PoseCandidate {
                    position: m.position,
                    floor: m.floor,
                    heading_deg: last.map_or(0.0, |p| p.heading_deg),
                    confidence: m.similarity,
                    zone_id: None,
                },
                similarity: m.similarity,
            });
        }

        if let (Some(last), Some(sample)) = (last, input.inertial) {
            let elapsed_s = now_ms.saturating_sub(last.timestamp_ms) as f64 / 1000.0;
            let dt = elapsed_s.min(self.config.max_dead_reckoning_dt_s);
            let mut candidate = dead_reckon(last, sample, dt);
            candidate.confidence = self.config.dead_reckoning_confidence;
            hypotheses.push(Hypothesis::DeadReckoning { candidate });
        }

        if let Some(last) = last {
            hypotheses.push(Hypothesis::Inertia {
                candidate: PoseCandidate {
                    position: last.position,
                    floor: last.floor,
                    heading_deg: last.heading_deg,
                    confidence: last.confidence,
                    zone_id: last.zone_id.clone(),
                },
            });

            if let Some(map) = input.map {
                for zone in map.zones.iter().filter(|z| z.floor == last.floor) {
                    let Some(center) = centroid(&zone.polygon) else {
                        continue;
                    };
                    if planar_distance(center, last.position) < self.config.map_constraint_radius_m {
                        hypotheses.push(Hypothesis::MapConstraint {
                            candidate: PoseCandidate {
                                position: center,
                                floor: zone.floor,
                                heading_deg: last.heading_deg,
                                confidence: self.config.map_constraint_confidence,
                                zone_id: Some(zone.id.clone()),
                            },
                        });
                    }
                }
            }
        }

        hypotheses
    }

    fn remember(&mut self, pose: IndoorPose) {
        self.history.push_back(pose);
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PoseError {
    #[error("No pose hypothesis available (no VPS, landmark or prior pose)")]
    NoViableHypothesis,

    #[error("Invalid pose input: {0}")]
    InvalidInput(String),
}
