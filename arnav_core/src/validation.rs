//! Validation Module - Ground Truth Comparison for Replays
//! ========================================================
//!
//! Scores intelligence-layer output against known ground truth, tick by
//! tick. Used by the replay harness and by field tests with surveyed
//! walking routes.
//!
//! Key metrics:
//! - Regime accuracy and number of regime changes (flicker)
//! - Indoor position error (RMSE, max error) against surveyed positions
//! - Guidance agreement with the expected action
//! - Per-unit failure counts
//!
//! Usage:
//! ```ignore
//! use arnav_core::validation::{GroundTruth, ValidationSession};
//!
//! let mut session = ValidationSession::new("mall_entry");
//! for (truth, input) in replay {
//!     let output = orchestrator.tick(&input);
//!     session.record(&truth, &output);
//! }
//! session.generate_report().print();
//! ```

use serde::{Deserialize, Serialize};

use crate::geometry::planar_distance;
use crate::guidance::GuidanceAction;
use crate::orchestrator::TickOutput;
use crate::regime::Regime;
use crate::types::PlanarPoint;

// =============================================================================
// GROUND TRUTH
// =============================================================================

/// What was actually true at one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruth {
    pub regime: Regime,

    /// Surveyed indoor position, when indoors
    pub position: Option<PlanarPoint>,

    pub floor: Option<i32>,

    /// Action a human guide would give, when unambiguous
    pub expected_action: Option<GuidanceAction>,
}

#[derive(Debug, Clone)]
struct TickRecord {
    regime_correct: bool,
    emitted_regime: Option<Regime>,
    pose_error_m: Option<f64>,
    floor_correct: Option<bool>,
    relocalization_requested: bool,
    action_correct: Option<bool>,
}

/// Failed outcomes per unit. Skipped units are not failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailureCounts {
    pub regime: usize,
    pub pose: usize,
    pub guidance: usize,
    pub poi: usize,
}

// =============================================================================
// VALIDATION SESSION
// =============================================================================

#[derive(Debug, Clone)]
pub struct ValidationSession {
    name: String,
    records: Vec<TickRecord>,
    failures: UnitFailureCounts,
}

impl ValidationSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            failures: UnitFailureCounts::default(),
        }
    }

    pub fn ticks(&self) -> usize {
        self.records.len()
    }

    /// Compare one tick's output with ground truth.
    pub fn record(&mut self, truth: &GroundTruth, output: &TickOutput) {
        let emitted_regime = output.regime.value().map(|r| r.regime);
        if !output.regime.is_ok() {
            self.failures.regime += 1;
        }
        if output.pose.as_ref().map_or(false, |p| !p.is_ok()) {
            self.failures.pose += 1;
        }
        if !output.guidance.is_ok() {
            self.failures.guidance += 1;
        }
        if output.poi.as_ref().map_or(false, |p| !p.is_ok()) {
            self.failures.poi += 1;
        }

        let pose = output.pose.as_ref().and_then(|p| p.value());
        let pose_error_m = match (pose, truth.position) {
            (Some(estimate), Some(actual)) => Some(planar_distance(estimate.position, actual)),
            _ => None,
        };
        let floor_correct = match (pose, truth.floor) {
            (Some(estimate), Some(actual)) => Some(estimate.floor == actual),
            _ => None,
        };
        let action_correct = match (output.guidance.value(), truth.expected_action) {
            (Some(g), Some(expected)) => Some(g.action == expected),
            _ => None,
        };

        self.records.push(TickRecord {
            regime_correct: emitted_regime == Some(truth.regime),
            emitted_regime,
            pose_error_m,
            floor_correct,
            relocalization_requested: pose.map_or(false, |p| p.relocalization_needed),
            action_correct,
        });
    }

    pub fn generate_report(&self) -> ValidationReport {
        let total = self.records.len();

        let regime_accuracy = ratio(self.records.iter().filter(|r| r.regime_correct).count(), total);
        let emitted: Vec<Regime> = self.records.iter().filter_map(|r| r.emitted_regime).collect();
        let regime_changes = emitted.windows(2).filter(|w| w[0] != w[1]).count();

        let errors: Vec<f64> = self.records.iter().filter_map(|r| r.pose_error_m).collect();
        let pose_rmse_m = if errors.is_empty() {
            None
        } else {
            Some((errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt())
        };
        let max_pose_error_m = errors.iter().copied().fold(None, |acc: Option<f64>, e| {
            Some(acc.map_or(e, |m| m.max(e)))
        });

        let floors: Vec<bool> = self.records.iter().filter_map(|r| r.floor_correct).collect();
        let actions: Vec<bool> = self.records.iter().filter_map(|r| r.action_correct).collect();

        ValidationReport {
            name: self.name.clone(),
            total_ticks: total,
            regime_accuracy,
            regime_changes,
            pose_samples: errors.len(),
            pose_rmse_m,
            max_pose_error_m,
            floor_accuracy: (!floors.is_empty()).then(|| ratio(floors.iter().filter(|&&f| f).count(), floors.len())),
            relocalization_ticks: self.records.iter().filter(|r| r.relocalization_requested).count(),
            action_samples: actions.len(),
            action_agreement: (!actions.is_empty())
                .then(|| ratio(actions.iter().filter(|&&a| a).count(), actions.len())),
            failures: self.failures.clone(),
        }
    }
}

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// =============================================================================
// VALIDATION REPORT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub name: String,
    pub total_ticks: usize,
    pub regime_accuracy: f64,
    pub regime_changes: usize,
    pub pose_samples: usize,
    pub pose_rmse_m: Option<f64>,
    pub max_pose_error_m: Option<f64>,
    pub floor_accuracy: Option<f64>,
    pub relocalization_ticks: usize,
    pub action_samples: usize,
    pub action_agreement: Option<f64>,
    pub failures: UnitFailureCounts,
}

impl ValidationReport {
    pub fn print(&self) {
        let opt_m = |v: Option<f64>| v.map_or("n/a".to_string(), |x| format!("{x:.2} m"));
        let opt_pct = |v: Option<f64>| v.map_or("n/a".to_string(), |x| format!("{:.1}%", x * 100.0));

        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║ VALIDATION REPORT: {:<42}║", self.name);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Ticks:                 {:>10}                            ║", self.total_ticks);
        println!("║ Regime accuracy:       {:>10}                            ║", opt_pct(Some(self.regime_accuracy)));
        println!("║ Regime changes:        {:>10}                            ║", self.regime_changes);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Pose samples:          {:>10}                            ║", self.pose_samples);
        println!("║ Pose RMSE:             {:>10}                            ║", opt_m(self.pose_rmse_m));
        println!("║ Max pose error:        {:>10}                            ║", opt_m(self.max_pose_error_m));
        println!("║ Floor accuracy:        {:>10}                            ║", opt_pct(self.floor_accuracy));
        println!("║ Relocalization ticks:  {:>10}                            ║", self.relocalization_ticks);
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Action agreement:      {:>10}                            ║", opt_pct(self.action_agreement));
        println!(
            "║ Failures (A/B/C/D):    {:>10}                            ║",
            format!(
                "{}/{}/{}/{}",
                self.failures.regime, self.failures.pose, self.failures.guidance, self.failures.poi
            )
        );
        println!("╚══════════════════════════════════════════════════════════════╝");
    }
}
