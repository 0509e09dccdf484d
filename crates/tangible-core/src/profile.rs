//! Engine profiles
//!
//! A profile bundles the recognition tuning of the service with the pattern
//! set trained for a particular screen. The simulator provider runs entirely
//! off a profile.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::pattern::Pattern;

const EPSILON: f32 = f32::EPSILON * 2.0;

/// Tangible and point recovery thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecoveryConfig {
    /// Time in ms a tangible may take to recover
    pub timeout: i32,
    /// Distance threshold for recovering a tangible
    pub tangible_distance: f32,
    /// Distance threshold for recovering a point
    pub point_distance: f32,
}

impl RecoveryConfig {
    pub fn is_equivalent_to(&self, other: &RecoveryConfig) -> bool {
        self.timeout == other.timeout
            && (self.tangible_distance - other.tangible_distance).abs() < EPSILON
            && (self.point_distance - other.point_distance).abs() < EPSILON
    }
}

/// Running-average window sizes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmoothingConfig {
    pub position_history: i32,
    pub rotation_history: i32,
}

impl SmoothingConfig {
    pub fn is_equivalent_to(&self, other: &SmoothingConfig) -> bool {
        self.position_history == other.position_history
            && self.rotation_history == other.rotation_history
    }
}

/// Recognition tuning of the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineConfiguration {
    pub name: String,
    pub sensitivity_multiplier: f32,
    pub recovery: RecoveryConfig,
    pub smoothing: SmoothingConfig,
    /// Delay before admitting 3-point matches while larger patterns are searched
    #[serde(rename = "Pending3PointMatchDelay")]
    pub pending_three_point_match_delay: i32,
}

impl EngineConfiguration {
    /// Field-wise comparison; names compare case-insensitively, floats within epsilon
    pub fn is_equivalent_to(&self, other: &EngineConfiguration) -> bool {
        self.name.to_lowercase() == other.name.to_lowercase()
            && (self.sensitivity_multiplier - other.sensitivity_multiplier).abs() < EPSILON
            && self.pending_three_point_match_delay == other.pending_three_point_match_delay
            && self.recovery.is_equivalent_to(&other.recovery)
            && self.smoothing.is_equivalent_to(&other.smoothing)
    }
}

/// Tuning plus trained patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineProfile {
    pub config: EngineConfiguration,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

impl EngineProfile {
    /// The profile used when none is supplied
    pub fn default_profile() -> Self {
        Self {
            config: EngineConfiguration {
                name: "New Tangible Profile".to_string(),
                sensitivity_multiplier: 1.0,
                recovery: RecoveryConfig {
                    timeout: 200,
                    tangible_distance: 50.0,
                    point_distance: 50.0,
                },
                smoothing: SmoothingConfig {
                    position_history: 1,
                    rotation_history: 10,
                },
                pending_three_point_match_delay: 0,
            },
            patterns: Vec::new(),
        }
    }

    /// Parse a profile from its JSON text
    pub fn try_deserialize(text: &str) -> Result<Self, EngineError> {
        serde_json::from_str(text).map_err(|e| EngineError::Profile(e.to_string()))
    }

    /// Read and parse a profile file
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Profile(format!("{}: {}", path.display(), e)))?;
        Self::try_deserialize(&text)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Profile(e.to_string()))
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self::default_profile()
    }
}
