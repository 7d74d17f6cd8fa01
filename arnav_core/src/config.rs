//! Layered configuration for the whole intelligence layer.
//!
//! Every tuning constant has a default; a JSON document only needs to name
//! the values it overrides.
//!
//! ```json
//! { "regime": { "indoor_threshold": 0.75 }, "tick_loop": { "default_rate_hz": 2.0 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::guidance::GuidanceConfig;
use crate::poi::PoiConfig;
use crate::pose::PoseConfig;
use crate::regime::RegimeConfig;

/// Settings for the orchestrator and its self-scheduling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Rate used when the caller does not pick one (default: 5 Hz)
    pub default_rate_hz: f64,

    /// Hard ceiling on any requested rate (default: 30 Hz)
    pub max_rate_hz: f64,

    /// Catalog POIs of a structural kind within this radius become
    /// guidance hints (default: 10 m)
    pub structural_hint_radius_m: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            default_rate_hz: 5.0,
            max_rate_hz: 30.0,
            structural_hint_radius_m: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelligenceConfig {
    pub regime: RegimeConfig,
    pub pose: PoseConfig,
    pub guidance: GuidanceConfig,
    pub poi: PoiConfig,
    pub tick_loop: LoopConfig,
}

impl IntelligenceConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject settings that would make the estimators meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.regime;
        if (r.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "regime evidence weights sum to {:.3}, expected 1",
                r.weights.sum()
            )));
        }
        if !(0.0..=1.0).contains(&r.outdoor_threshold)
            || !(0.0..=1.0).contains(&r.indoor_threshold)
            || r.outdoor_threshold >= r.indoor_threshold
        {
            return Err(ConfigError::Invalid(format!(
                "regime thresholds must satisfy 0 <= outdoor ({}) < indoor ({}) <= 1",
                r.outdoor_threshold, r.indoor_threshold
            )));
        }

        if self.pose.history_len == 0 || self.guidance.history_len == 0 {
            return Err(ConfigError::Invalid("history lengths must be at least 1".into()));
        }
        if self.guidance.smoothing_window == 0 || self.guidance.smoothing_window > self.guidance.history_len {
            return Err(ConfigError::Invalid(format!(
                "guidance smoothing window {} must be within 1..={}",
                self.guidance.smoothing_window, self.guidance.history_len
            )));
        }
        if self.guidance.anchor_min_m > self.guidance.anchor_max_m {
            return Err(ConfigError::Invalid("guidance anchor range is inverted".into()));
        }
        if !(0.0..=1.0).contains(&self.guidance.anchor_retain) {
            return Err(ConfigError::Invalid("guidance anchor_retain must be in [0, 1]".into()));
        }

        if self.poi.default_top_k == 0 {
            return Err(ConfigError::Invalid("poi default_top_k must be at least 1".into()));
        }
        if self.poi.max_distance_m <= 0.0 {
            return Err(ConfigError::Invalid("poi max_distance_m must be positive".into()));
        }

        let l = &self.tick_loop;
        if !(l.default_rate_hz > 0.0 && l.max_rate_hz > 0.0 && l.default_rate_hz <= l.max_rate_hz) {
            return Err(ConfigError::Invalid(format!(
                "loop rates must satisfy 0 < default ({}) <= max ({})",
                l.default_rate_hz, l.max_rate_hz
            )));
        }
        Ok(())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        IntelligenceConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = IntelligenceConfig::from_json_str(
            r#"{ "regime": { "indoor_threshold": 0.75 }, "poi": { "default_top_k": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.regime.indoor_threshold, 0.75);
        assert_eq!(config.regime.outdoor_threshold, 0.3);
        assert_eq!(config.poi.default_top_k, 3);
        assert_eq!(config.tick_loop.default_rate_hz, 5.0);
    }

    #[test]
    fn test_rejects_bad_weights() {
        let err = IntelligenceConfig::from_json_str(r#"{ "regime": { "weights": { "geofence": 0.9 } } }"#);
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = IntelligenceConfig::default();
        config.regime.outdoor_threshold = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            IntelligenceConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            IntelligenceConfig::from_file("/nonexistent/arnav.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
