use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blurring::infrastructure::cpu_box_blurrer::BlurConfig;
use crate::detection::domain::plate_detector::PlateDetectorConfig;
use crate::detection::domain::skin_region_detector::SkinDetectorConfig;
use crate::detection::infrastructure::onnx_models::ModelConfig;
use crate::redaction::domain::overlap_resolver::OverlapConfig;
use crate::redaction::domain::region_policy::RegionPolicyConfig;

use super::privacy_protector::FallbackConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Every tunable of the pipeline. Missing sections and fields take their
/// defaults, so a config file only needs the values it changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub skin: SkinDetectorConfig,
    pub plates: PlateDetectorConfig,
    pub policy: RegionPolicyConfig,
    pub overlap: OverlapConfig,
    pub blur: BlurConfig,
    pub fallback: FallbackConfig,
    pub models: ModelConfig,
}

impl RedactionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    /// Rejects values that would make a stage meaningless rather than just weak.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if self.skin.stride == 0 {
            return Err(ConfigError::Invalid("skin.stride must be positive".into()));
        }
        if self.plates.scan_step == 0 {
            return Err(ConfigError::Invalid("plates.scan_step must be positive".into()));
        }
        if !in_unit(self.models.face_confidence) || !in_unit(self.models.object_confidence) {
            return Err(ConfigError::Invalid(
                "model confidences must be between 0.0 and 1.0".into(),
            ));
        }
        if !in_unit(self.overlap.plate_overlap_threshold)
            || !in_unit(self.overlap.region_overlap_threshold)
        {
            return Err(ConfigError::Invalid(
                "overlap thresholds must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}
