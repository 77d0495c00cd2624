//! Batch configuration loaded from TOML.
//!
//! The default configuration in `config/default.toml` is baked into the
//! binary at compile time via [`include_str!`]; a file passed at runtime
//! replaces it entirely.

use std::path::Path;

use council_diversity_models::{CouncilorType, Factor, HistogramScope, LocalityId, Metric};
use serde::{Deserialize, Serialize};

/// Default configuration embedded at compile time.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML is malformed or has unexpected fields.
    #[error("TOML error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but holds an unusable value.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Top-level batch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiversityConfig {
    /// Settings for the current-council snapshot.
    pub snapshot: SnapshotSettings,
    /// Settings for the historical age series.
    pub history: HistorySettings,
    /// Localities to process. When absent, every locality with councilor
    /// records in the store is processed.
    #[serde(default)]
    pub localities: Option<LocalityRange>,
}

/// How the snapshot orchestrator scores each locality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSettings {
    /// Diversity metric.
    #[serde(default)]
    pub metric: Metric,
    /// Whether to normalize scores into `[0, 1]`.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    /// Factors to score and rank.
    #[serde(default = "default_factors")]
    pub factors: Vec<Factor>,
    /// Bin width per factor.
    #[serde(default)]
    pub bin_widths: BinWidths,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            metric: Metric::GiniSimpson,
            normalize: true,
            factors: default_factors(),
            bin_widths: BinWidths::default(),
        }
    }
}

/// Bin width applied to each factor before counting. Zero groups by exact
/// value; categorical factors must stay at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinWidths {
    /// Width for councilor ages.
    #[serde(default)]
    pub age: f64,
    /// Width for gender labels.
    #[serde(default)]
    pub gender: f64,
    /// Width for party names.
    #[serde(default)]
    pub party: f64,
}

impl BinWidths {
    /// Width configured for `factor`.
    #[must_use]
    pub const fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Age => self.age,
            Factor::Gender => self.gender,
            Factor::Party => self.party,
        }
    }
}

/// How the historical orchestrator scores the age histograms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistorySettings {
    /// Diversity metric.
    #[serde(default)]
    pub metric: Metric,
    /// Whether to normalize scores into `[0, 1]`.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    /// Upstream bucketing method label of the series to score.
    pub method: String,
    /// Upstream bucketing granularity level of the series to score.
    pub level: u8,
    /// Width of the upstream age buckets. Reconstructed ages are re-binned
    /// at this width, so it must match the width the histograms were built
    /// with.
    pub age_bucket_width: f64,
    /// Councilor series to process.
    #[serde(default = "default_councilor_types")]
    pub councilor_types: Vec<CouncilorType>,
}

impl HistorySettings {
    /// Histogram scope for one councilor series.
    #[must_use]
    pub fn scope(&self, councilor_type: CouncilorType) -> HistogramScope {
        HistogramScope::new(councilor_type, self.method.clone(), self.level)
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            metric: Metric::GiniSimpson,
            normalize: true,
            method: "equal".to_string(),
            level: 2,
            age_bucket_width: 10.0,
            councilor_types: default_councilor_types(),
        }
    }
}

/// Inclusive range of locality ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalityRange {
    /// First locality id.
    pub first: LocalityId,
    /// Last locality id.
    pub last: LocalityId,
}

impl LocalityRange {
    /// Every id in the range, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<LocalityId> {
        (self.first..=self.last).collect()
    }
}

const fn default_normalize() -> bool {
    true
}

fn default_factors() -> Vec<Factor> {
    Factor::all().to_vec()
}

fn default_councilor_types() -> Vec<CouncilorType> {
    CouncilorType::all().to_vec()
}

impl DiversityConfig {
    /// Parses and validates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is
    /// unusable.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading configuration from {}", path.display());
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// The configuration embedded at compile time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded TOML is invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Loads `path` if given, otherwise the embedded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the selected configuration is invalid.
    pub fn load_or_embedded(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(Self::embedded, Self::load)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for factor in Factor::all() {
            let width = self.snapshot.bin_widths.get(*factor);
            if !width.is_finite() || width < 0.0 {
                return Err(invalid(format!(
                    "bin width for {factor} must be finite and non-negative, got {width}"
                )));
            }
        }

        let width = self.history.age_bucket_width;
        if !width.is_finite() || width <= 0.0 {
            return Err(invalid(format!(
                "age_bucket_width must be finite and positive, got {width}"
            )));
        }

        if self.history.method.trim().is_empty() {
            return Err(invalid("history method label is empty".to_string()));
        }

        if let Some(range) = self.localities
            && range.first > range.last
        {
            return Err(invalid(format!(
                "locality range {}..={} is empty",
                range.first, range.last
            )));
        }

        Ok(())
    }
}

const fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}
