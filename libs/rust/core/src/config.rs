//! Layered configuration: defaults -> optional file (`FINOPS_CONFIG_FILE`) -> `FINOPS__*` env.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DetectionError;
use crate::severity::SeverityPolicy;

/// Number of independent voices in the consensus.
pub const METHOD_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Expected outlier fraction for the ensemble scorer.
    pub contamination: f64,
    pub z_score_threshold: f64,
    pub iqr_multiplier: f64,
    /// Minimum dataset / partition size before a test activates.
    pub min_samples: usize,
    /// Votes required for a record to be anomalous.
    pub min_agreement: usize,
    pub random_seed: u64,
    pub n_estimators: usize,
    /// Subsample size per tree (capped at the dataset size).
    pub max_samples: usize,
    /// Adds day-of-week to the ensemble feature vector.
    pub include_weekday: bool,
    /// Run the four scorers on the rayon pool instead of sequentially.
    pub parallel: bool,
    pub severity: SeverityPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            z_score_threshold: 3.0,
            iqr_multiplier: 1.5,
            min_samples: 7,
            min_agreement: 2,
            random_seed: 42,
            n_estimators: 100,
            max_samples: 256,
            include_weekday: false,
            parallel: false,
            severity: SeverityPolicy::default(),
        }
    }
}

impl DetectorConfig {
    /// Fails fast on the first out-of-range parameter.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(DetectionError::config("contamination", format!("must be in (0, 0.5], got {}", self.contamination)));
        }
        positive("z_score_threshold", self.z_score_threshold)?;
        positive("iqr_multiplier", self.iqr_multiplier)?;
        if self.min_samples < 2 {
            return Err(DetectionError::config("min_samples", format!("must be at least 2, got {}", self.min_samples)));
        }
        if self.min_agreement == 0 || self.min_agreement > METHOD_COUNT {
            return Err(DetectionError::config("min_agreement", format!("must be in [1, {METHOD_COUNT}], got {}", self.min_agreement)));
        }
        if self.n_estimators == 0 {
            return Err(DetectionError::config("n_estimators", "must be at least 1"));
        }
        if self.max_samples < 2 {
            return Err(DetectionError::config("max_samples", format!("must be at least 2, got {}", self.max_samples)));
        }
        self.severity.validate()
    }
}

pub(crate) fn positive(parameter: &'static str, v: f64) -> Result<(), DetectionError> {
    if v.is_finite() && v > 0.0 { Ok(()) } else { Err(DetectionError::config(parameter, format!("must be a positive finite number, got {v}"))) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service_name: String,
    pub log_level: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    /// Wall-clock bound on one detection run.
    pub run_timeout_secs: u64,
    #[serde(default)]
    pub detector: DetectorConfig,
}

pub fn load_config(service: &str) -> Result<AppConfig> {
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("log_level", "info")?
        .set_default("input_path", "data/aws_costs.csv")?
        .set_default("output_dir", "alerts")?
        .set_default("run_timeout_secs", 60_i64)?;

    if let Ok(file) = std::env::var("FINOPS_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("FINOPS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );
    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.detector.validate()?;
    Ok(cfg)
}
