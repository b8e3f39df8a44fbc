// ⚙️ Configuration - typed settings with defaults
//
// Every field has a default so a partial JSON file (or none at all) is a
// valid configuration. `CONTRIB_CONFIG` may point at the file to load.

use crate::record::DEFAULT_MAX_CONTRIBUTION_AMOUNT;
use crate::sql::SqlTarget;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CONTRIB_CONFIG";

// ============================================================================
// SECTIONS
// ============================================================================

/// Where supervised training labels come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSource {
    /// Rule-engine output (bootstrap labels).
    Rules,
    /// The `existing_category` column, for records that have one.
    Existing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    pub random_state: u64,
    pub test_size: f64,
    pub n_estimators: usize,
    pub max_features: usize,
    pub min_df: usize,
    pub ngram_range: (usize, usize),
    pub label_source: LabelSource,
}

impl Default for MlConfig {
    fn default() -> Self {
        MlConfig {
            random_state: 42,
            test_size: 0.2,
            n_estimators: 100,
            max_features: 1000,
            min_df: 2,
            ngram_range: (1, 2),
            label_source: LabelSource::Rules,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// ML overrides the rule only above this confidence.
    pub high_confidence: f64,
    /// Lower edge of the medium band; medium-band disagreements with the
    /// rules are reported for review.
    pub medium_confidence: f64,
    /// Amount above which an unclassified contribution is "high value".
    pub high_value_contribution: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            high_confidence: 0.7,
            medium_confidence: 0.5,
            high_value_contribution: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountConfig {
    pub max_contribution_amount: f64,
}

impl Default for AmountConfig {
    fn default() -> Self {
        AmountConfig {
            max_contribution_amount: DEFAULT_MAX_CONTRIBUTION_AMOUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub n_clusters: usize,
    pub min_records: usize,
    pub max_features: usize,
    pub top_n: usize,
    pub sample_size: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            n_clusters: 10,
            min_records: 10,
            max_features: 500,
            top_n: 5,
            sample_size: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub models_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            output_dir: PathBuf::from("output"),
            reports_dir: PathBuf::from("output/reports"),
            models_dir: PathBuf::from("output/models"),
        }
    }
}

// ============================================================================
// CLASSIFIER CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub ml: MlConfig,
    pub thresholds: Thresholds,
    pub amounts: AmountConfig,
    pub clustering: ClusteringConfig,
    pub output: OutputConfig,
    pub sql: SqlTarget,
    /// Rule tables to load instead of the builtin ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<PathBuf>,
}

impl ClassifierConfig {
    /// Load configuration from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: ClassifierConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;

        Ok(config)
    }

    /// Load from `$CONTRIB_CONFIG` if set, else defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => {
                tracing::info!(path = ?path, "loading configuration");
                Self::from_file(PathBuf::from(path))
            }
            _ => Ok(Self::default()),
        }
    }

    /// Reject out-of-range settings.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [
            ("thresholds.high_confidence", t.high_confidence),
            ("thresholds.medium_confidence", t.medium_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if t.medium_confidence > t.high_confidence {
            bail!(
                "thresholds.medium_confidence ({}) must not exceed thresholds.high_confidence ({})",
                t.medium_confidence,
                t.high_confidence
            );
        }

        if !(self.ml.test_size > 0.0 && self.ml.test_size < 1.0) {
            bail!("ml.test_size must be within (0, 1), got {}", self.ml.test_size);
        }
        if self.ml.n_estimators == 0 {
            bail!("ml.n_estimators must be at least 1");
        }
        if self.ml.max_features == 0 {
            bail!("ml.max_features must be at least 1");
        }
        let (min_n, max_n) = self.ml.ngram_range;
        if min_n == 0 || min_n > max_n {
            bail!("ml.ngram_range must satisfy 1 <= min <= max, got ({}, {})", min_n, max_n);
        }

        if self.clustering.n_clusters == 0 {
            bail!("clustering.n_clusters must be at least 1");
        }
        if !(self.amounts.max_contribution_amount > 0.0) {
            bail!(
                "amounts.max_contribution_amount must be positive, got {}",
                self.amounts.max_contribution_amount
            );
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClassifierConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.high_confidence, 0.7);
        assert_eq!(config.ml.random_state, 42);
        assert_eq!(config.ml.label_source, LabelSource::Rules);
        assert_eq!(config.clustering.n_clusters, 10);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "thresholds": { "high_confidence": 0.9 }, "ml": { "label_source": "existing" } }"#,
        )
        .unwrap();

        let config = ClassifierConfig::from_file(&path).unwrap();
        assert_eq!(config.thresholds.high_confidence, 0.9);
        assert_eq!(config.thresholds.medium_confidence, 0.5);
        assert_eq!(config.ml.label_source, LabelSource::Existing);
        assert_eq!(config.ml.n_estimators, 100);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = ClassifierConfig::default();
        config.thresholds.high_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = ClassifierConfig::default();
        config.thresholds.medium_confidence = 0.8;
        assert!(config.validate().is_err());

        let mut config = ClassifierConfig::default();
        config.ml.test_size = 1.0;
        assert!(config.validate().is_err());

        let mut config = ClassifierConfig::default();
        config.ml.n_estimators = 0;
        assert!(config.validate().is_err());

        let mut config = ClassifierConfig::default();
        config.ml.ngram_range = (2, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "ml": { "test_size": 0 } }"#).unwrap();
        assert!(ClassifierConfig::from_file(&path).is_err());
    }
}
