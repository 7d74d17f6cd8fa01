//! JSON exporter for replay visualization.
//!
//! Exports sampled frames (ground truth next to each unit's output) so a
//! run can be plotted or diffed offline.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use arnav_core::validation::ValidationReport;
use arnav_core::{GuidanceAction, Regime, TickOutput};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::walker::TruthState;

/// A single frame of replay data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub truth: TruthFrame,

    /// Emitted regime, absent when Unit A failed
    pub regime: Option<Regime>,
    pub regime_confidence: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseFrame>,

    pub action: Option<GuidanceAction>,

    /// Ranked POI ids, best first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_pois: Vec<String>,

    /// Regime changes, unit failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

impl SimFrame {
    pub fn from_output(time_sec: f64, truth: &TruthState, output: &TickOutput) -> Self {
        let regime = output.regime.value();
        let pose = output.pose.as_ref().and_then(|p| p.value()).map(|p| PoseFrame {
            x: p.position.x,
            y: p.position.y,
            floor: p.floor,
            confidence: p.confidence,
            relocalization_needed: p.relocalization_needed,
        });
        let top_pois = output
            .poi
            .as_ref()
            .and_then(|p| p.value())
            .map(|r| r.top_pois.iter().map(|p| p.poi_id.clone()).collect())
            .unwrap_or_default();

        let mut events = Vec::new();
        let failures = [
            ("regime", output.regime.failure_reason()),
            ("pose", output.pose.as_ref().and_then(|p| p.failure_reason())),
            ("guidance", output.guidance.failure_reason()),
            ("poi", output.poi.as_ref().and_then(|p| p.failure_reason())),
        ];
        for (unit, reason) in failures {
            if let Some(reason) = reason {
                events.push(SimEvent::warn(format!("{unit} failed: {reason}")));
            }
        }

        Self {
            time_sec,
            truth: TruthFrame::from(truth),
            regime: regime.map(|r| r.regime),
            regime_confidence: output.regime.confidence(),
            pose,
            action: output.guidance.value().map(|g| g.action),
            top_pois,
            events,
        }
    }
}

/// Where the walker really was.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthFrame {
    pub x: f64,
    pub y: f64,
    pub floor: i32,
    pub indoor: bool,
}

impl From<&TruthState> for TruthFrame {
    fn from(t: &TruthState) -> Self {
        Self {
            x: t.position.x,
            y: t.position.y,
            floor: t.floor,
            indoor: t.indoor,
        }
    }
}

/// Estimated indoor pose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseFrame {
    pub x: f64,
    pub y: f64,
    pub floor: i32,
    pub confidence: f64,
    pub relocalization_needed: bool,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".into()),
        }
    }
}

/// Complete replay export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Time of the last frame, seconds
    pub duration_sec: f64,

    /// Sampled frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ValidationReport>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            report: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, report: ValidationReport) {
        self.passed = passed;
        self.report = Some(report);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
