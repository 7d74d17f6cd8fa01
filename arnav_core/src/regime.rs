//! Unit A: indoor/outdoor regime classification.
//!
//! Each tick fuses four evidence scores into an indoor score in [0, 1]:
//!
//! | Evidence  | Source                                   | Weight |
//! |-----------|------------------------------------------|--------|
//! | Geofence  | containment in building / zone polygons  | 0.4    |
//! | Accuracy  | positioning accuracy radius              | 0.3    |
//! | Movement  | ground speed and acceleration magnitude  | 0.2    |
//! | Camera    | summarizer's indoor hint                 | 0.1    |
//!
//! A dwell bonus rewards consecutive ticks inside a building. The proposed
//! regime then passes through hysteresis so the emitted regime does not
//! oscillate at boundaries.

use std::collections::VecDeque;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::geometry::{geo_point_in_polygon, haversine_distance};
use crate::types::{
    CameraFrame, EntryPoint, GeoPoint, Geofence, GeofenceKind, InertialSample, LocationFix, TimestampMs,
    UnitOutcome,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Linear weights of the four evidence scores. Must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceWeights {
    pub geofence: f64,
    pub accuracy: f64,
    pub movement: f64,
    pub camera: f64,
}

impl Default for EvidenceWeights {
    fn default() -> Self {
        Self {
            geofence: 0.4,
            accuracy: 0.3,
            movement: 0.2,
            camera: 0.1,
        }
    }
}

impl EvidenceWeights {
    pub fn sum(&self) -> f64 {
        self.geofence + self.accuracy + self.movement + self.camera
    }
}

/// Tuning for the regime classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub weights: EvidenceWeights,

    /// Scores above this propose INDOOR (default: 0.7)
    pub indoor_threshold: f64,

    /// Scores below this propose OUTDOOR (default: 0.3)
    pub outdoor_threshold: f64,

    /// Decision confidence below which the current regime is kept (default: 0.3)
    pub hold_confidence: f64,

    /// Floor for the emitted confidence (default: 0.6)
    pub min_emitted_confidence: f64,

    /// Window over which regime flips are counted (default: 60 s)
    pub flip_window_ms: u64,

    /// Flips within the window that pin a TRANSITION regime (default: 2)
    pub max_flips_in_window: usize,

    /// Consecutive confident proposals needed to leave a settled regime (default: 2)
    pub switch_confirm_ticks: u32,

    /// Radius around an entry point that counts as "at the door" (default: 5 m)
    pub entry_point_radius_m: f64,

    /// Maximum dwell bonus added to the indoor score (default: 0.2)
    pub dwell_weight: f64,

    /// Consecutive in-building ticks to earn the full dwell bonus (default: 6)
    pub dwell_ticks: u32,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            weights: EvidenceWeights::default(),
            indoor_threshold: 0.7,
            outdoor_threshold: 0.3,
            hold_confidence: 0.3,
            min_emitted_confidence: 0.6,
            flip_window_ms: 60_000,
            max_flips_in_window: 2,
            switch_confirm_ticks: 2,
            entry_point_radius_m: 5.0,
            dwell_weight: 0.2,
            dwell_ticks: 6, // ~1.2 s at 5 Hz
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Positioning regime of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Outdoor,
    Indoor,
    Transition,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Regime::Outdoor => "OUTDOOR",
            Regime::Indoor => "INDOOR",
            Regime::Transition => "TRANSITION",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeResult {
    pub regime: Regime,
    pub confidence: f64,

    /// Entry point within reach of the fix, if any
    pub entry_point_id: Option<String>,
}

/// Per-tick input to the classifier.
#[derive(Debug, Clone, Copy)]
pub struct RegimeInput<'a> {
    pub fix: &'a LocationFix,
    pub geofences: &'a [Geofence],
    pub camera: Option<&'a CameraFrame>,
    pub inertial: Option<&'a InertialSample>,
}

/// Outcome of testing a fix against the geofence set.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceMatch {
    pub score: f64,
    pub kind: Option<GeofenceKind>,
    pub geofence_id: Option<String>,
    pub entry_point_id: Option<String>,
    pub entry_point_position: Option<GeoPoint>,
}

/// The four evidence scores of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evidence {
    pub geofence: f64,
    pub accuracy: f64,
    pub movement: f64,
    pub camera: f64,
}

// ============================================================================
// EVIDENCE SCORES
// ============================================================================

/// Geofence evidence from the first geofence containing the fix: 0.9 for a
/// building or indoor zone, 0.5 for an outdoor area, 0.1 outside
/// everything. Inside an indoor-kind fence within `entry_radius_m` of one of
/// its entry points the score is 1.0.
///
/// The matched fence's nearest entry point is reported at any distance.
/// When no indoor-kind fence contains the fix, the nearest indoor entry
/// point within `entry_radius_m` is reported instead, so a user standing
/// at a door outside can be told to enter.
pub fn geofence_evidence(
    position: GeoPoint,
    geofences: &[Geofence],
    entry_radius_m: f64,
) -> Result<GeofenceMatch, RegimeError> {
    if let Some(fence) = geofences
        .iter()
        .find(|f| f.polygon.len() < 3 || f.polygon.iter().any(|p| !p.is_finite()))
    {
        return Err(RegimeError::MalformedGeofence(fence.id.clone()));
    }

    let mut found = GeofenceMatch {
        score: 0.1,
        kind: None,
        geofence_id: None,
        entry_point_id: None,
        entry_point_position: None,
    };

    let matched = geofences.iter().find(|f| geo_point_in_polygon(position, &f.polygon));
    let matched_indoor = matched.map_or(false, |f| f.kind.is_indoor());

    if let Some(fence) = matched {
        found.score = if fence.kind.is_indoor() { 0.9 } else { 0.5 };
        found.kind = Some(fence.kind);
        found.geofence_id = Some(fence.id.clone());
    }

    let nearest = if matched_indoor {
        matched.and_then(|f| nearest_entry(position, f.entry_points.iter()))
    } else {
        let doors = geofences
            .iter()
            .filter(|f| f.kind.is_indoor())
            .flat_map(|f| f.entry_points.iter());
        nearest_entry(position, doors)
            .filter(|(d, _)| *d <= entry_radius_m)
            .or_else(|| matched.and_then(|f| nearest_entry(position, f.entry_points.iter())))
    };

    if let Some((distance, entry)) = nearest {
        found.entry_point_id = Some(entry.id.clone());
        found.entry_point_position = Some(entry.position);
        if matched_indoor && distance <= entry_radius_m {
            found.score = 1.0;
        }
    }

    Ok(found)
}

fn nearest_entry<'a>(
    position: GeoPoint,
    entries: impl Iterator<Item = &'a EntryPoint>,
) -> Option<(f64, &'a EntryPoint)> {
    entries
        .map(|e| (haversine_distance(position, e.position), e))
        .min_by(|a, b| a.0.total_cmp(&b.0))
}

/// Coarse accuracy degrades indoors, so a large radius is indoor evidence.
pub fn accuracy_evidence(accuracy_m: f64) -> f64 {
    if accuracy_m > 20.0 {
        0.8
    } else if accuracy_m > 10.0 {
        0.6
    } else if accuracy_m > 5.0 {
        0.4
    } else {
        0.2
    }
}

/// Slow walking hints at browsing indoors; brisk motion hints at outdoors.
pub fn movement_evidence(speed_mps: Option<f64>, acceleration: Option<&Vector3<f64>>) -> f64 {
    let mut score: f64 = 0.5;

    if let Some(speed) = speed_mps.filter(|s| s.is_finite()) {
        if speed < 0.5 {
            score += 0.2;
        } else if speed > 2.0 {
            score -= 0.2;
        }
    }

    if let Some(accel) = acceleration {
        if accel.norm() > 2.0 {
            score += 0.1;
        }
    }

    score.clamp(0.0, 1.0)
}

pub fn camera_evidence(camera: Option<&CameraFrame>) -> f64 {
    match camera.and_then(|c| c.indoor_hint) {
        Some(true) => 0.7,
        _ => 0.5,
    }
}

/// Weighted sum of the evidence scores, clamped to [0, 1].
pub fn indoor_score(evidence: &Evidence, weights: &EvidenceWeights) -> f64 {
    let score = evidence.geofence * weights.geofence
        + evidence.accuracy * weights.accuracy
        + evidence.movement * weights.movement
        + evidence.camera * weights.camera;
    score.clamp(0.0, 1.0)
}

/// Threshold an indoor score into a proposed regime.
pub fn classify_score(score: f64, indoor_threshold: f64, outdoor_threshold: f64) -> Regime {
    if score > indoor_threshold {
        Regime::Indoor
    } else if score < outdoor_threshold {
        Regime::Outdoor
    } else {
        Regime::Transition
    }
}

/// Distance of the score from the undecided midpoint, scaled to [0, 1].
pub fn decision_confidence(score: f64) -> f64 {
    ((score - 0.5).abs() * 2.0).clamp(0.0, 1.0)
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Stateful regime classifier with hysteresis.
pub struct RegimeClassifier {
    config: RegimeConfig,
    current: Regime,

    /// False until the first confident decision of the session
    settled: bool,

    /// Candidate regime and how many consecutive ticks proposed it
    pending: Option<(Regime, u32)>,

    /// Timestamps of actual regime changes
    flips: VecDeque<TimestampMs>,

    dwell_count: u32,
    last_update_ms: Option<TimestampMs>,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            current: Regime::Outdoor,
            settled: false,
            pending: None,
            flips: VecDeque::new(),
            dwell_count: 0,
            last_update_ms: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RegimeConfig::default())
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    pub fn current_regime(&self) -> Regime {
        self.current
    }

    /// Number of regime changes inside the flip window ending at `now_ms`.
    pub fn flips_in_window(&self, now_ms: TimestampMs) -> usize {
        let since = now_ms.saturating_sub(self.config.flip_window_ms);
        self.flips.iter().filter(|&&t| t >= since).count()
    }

    /// Reset to the initial OUTDOOR state.
    pub fn initialize(&mut self) {
        self.current = Regime::Outdoor;
        self.settled = false;
        self.pending = None;
        self.flips.clear();
        self.dwell_count = 0;
        self.last_update_ms = None;
    }

    /// Drop retained history. The current regime is kept.
    pub fn cleanup(&mut self) {
        self.flips.clear();
        self.flips.shrink_to_fit();
        self.pending = None;
    }

    /// Classify one tick. Faults become a failed outcome.
    pub fn tick(&mut self, input: &RegimeInput<'_>, now_ms: TimestampMs) -> UnitOutcome<RegimeResult> {
        match self.classify(input, now_ms) {
            Ok(result) => {
                let confidence = result.confidence;
                UnitOutcome::ok(result, confidence)
            }
            Err(e) => {
                warn!(error = %e, "Regime classification failed");
                UnitOutcome::failed(e.to_string())
            }
        }
    }

    pub fn classify(
        &mut self,
        input: &RegimeInput<'_>,
        now_ms: TimestampMs,
    ) -> Result<RegimeResult, RegimeError> {
        let fix = input.fix;
        if !fix.position.is_finite() || !fix.accuracy_m.is_finite() || fix.accuracy_m < 0.0 {
            return Err(RegimeError::InvalidFix(format!(
                "position {} accuracy {}",
                fix.position, fix.accuracy_m
            )));
        }

        if let Some(last) = self.last_update_ms {
            if now_ms < last {
                debug!(now_ms, last, "Stale regime input ignored");
                return Ok(RegimeResult {
                    regime: self.current,
                    confidence: self.config.min_emitted_confidence,
                    entry_point_id: None,
                });
            }
        }

        let geofence = geofence_evidence(
            fix.position,
            input.geofences,
            self.config.entry_point_radius_m,
        )?;

        if geofence.kind.map_or(false, |k| k.is_indoor()) {
            self.dwell_count = self.dwell_count.saturating_add(1);
        } else {
            self.dwell_count = 0;
        }

        let evidence = Evidence {
            geofence: geofence.score,
            accuracy: accuracy_evidence(fix.accuracy_m),
            movement: movement_evidence(
                fix.speed_mps,
                input.inertial.and_then(|s| s.acceleration.as_ref()),
            ),
            camera: camera_evidence(input.camera),
        };

        let score = (indoor_score(&evidence, &self.config.weights) + self.dwell_bonus()).clamp(0.0, 1.0);
        let proposed = classify_score(
            score,
            self.config.indoor_threshold,
            self.config.outdoor_threshold,
        );
        let raw_confidence = decision_confidence(score);

        let regime = self.apply_hysteresis(proposed, raw_confidence, now_ms);
        self.last_update_ms = Some(now_ms);

        debug!(
            score,
            ?proposed,
            ?regime,
            geofence = evidence.geofence,
            accuracy = evidence.accuracy,
            movement = evidence.movement,
            camera = evidence.camera,
            "Regime evaluated"
        );

        Ok(RegimeResult {
            regime,
            confidence: raw_confidence.max(self.config.min_emitted_confidence),
            entry_point_id: geofence.entry_point_id,
        })
    }

    fn dwell_bonus(&self) -> f64 {
        if self.config.dwell_ticks == 0 {
            return 0.0;
        }
        let ratio = (self.dwell_count as f64 / self.config.dwell_ticks as f64).min(1.0);
        self.config.dwell_weight * ratio
    }

    fn apply_hysteresis(&mut self, proposed: Regime, confidence: f64, now_ms: TimestampMs) -> Regime {
        // History is kept for two windows and counted over one
        let horizon = now_ms.saturating_sub(self.config.flip_window_ms.saturating_mul(2));
        while self.flips.front().map_or(false, |&t| t < horizon) {
            self.flips.pop_front();
        }

        if confidence < self.config.hold_confidence {
            self.pending = None;
            return self.current;
        }

        if proposed == self.current {
            self.pending = None;
            self.settled = true;
            return self.current;
        }

        if self.current == Regime::Transition
            && self.flips_in_window(now_ms) >= self.config.max_flips_in_window
        {
            debug!(?proposed, "Holding TRANSITION after repeated flips");
            return self.current;
        }

        if self.settled && self.config.switch_confirm_ticks > 1 {
            let count = match self.pending {
                Some((candidate, n)) if candidate == proposed => n + 1,
                _ => 1,
            };
            if count < self.config.switch_confirm_ticks {
                self.pending = Some((proposed, count));
                return self.current;
            }
        }

        info!(from = %self.current, to = %proposed, "Regime changed");
        self.pending = None;
        self.settled = true;
        self.current = proposed;
        self.flips.push_back(now_ms);
        self.current
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegimeError {
    #[error("Invalid location fix: {0}")]
    InvalidFix(String),

    #[error("Malformed geofence polygon: {0}")]
    MalformedGeofence(String),
}
