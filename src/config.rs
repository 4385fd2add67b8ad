//! TOML-based billing configuration.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::CsvPriceLoader;
use crate::pricing::{DynamicPolicy, FlatPolicy, PolicyKind, PricingPolicy, TouPolicy};
use crate::source::TextEncoding;

/// Top-level billing configuration parsed from TOML.
///
/// All sections have defaults matching the 2018 Massachusetts tariffs. Load
/// from TOML with [`BillingConfig::from_toml_file`] or use
/// [`BillingConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Chunking, parallelism and which policies to bill.
    #[serde(default)]
    pub run: RunConfig,
    /// Where timeseries and metadata are read from.
    #[serde(default)]
    pub source: SourceConfig,
    /// Flat seasonal tariff.
    #[serde(default)]
    pub flat: FlatPolicy,
    /// Time-of-use tariff with conservation events.
    #[serde(default)]
    pub tou: TouPolicy,
    /// Real-time price tariff.
    #[serde(default)]
    pub dynamic: DynamicPolicy,
}

/// Chunking, parallelism and active policies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Buildings per chunk (must be > 0).
    pub chunk_size: usize,
    /// Worker threads; 1 runs chunks sequentially.
    pub threads: usize,
    /// End-use columns summed into `kwh_total`.
    pub end_use_columns: Vec<String>,
    /// Policies to bill, in output column order.
    pub policies: Vec<PolicyKind>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            threads: 1,
            end_use_columns: vec!["out.electricity.total.energy_consumption".to_string()],
            policies: PolicyKind::ALL.to_vec(),
        }
    }
}

/// Input locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Directory of `<building>-<upgrade>.csv` files.
    pub timeseries_dir: PathBuf,
    /// Name of the timestamp column in timeseries files.
    pub timestamp_column: String,
    /// Optional building metadata CSV keyed by `bldg_id`.
    pub metadata_csv: Option<PathBuf>,
    /// Metadata attribute used as each building's region code.
    pub region_column: Option<String>,
    /// Encoding retried when a reference table is not valid UTF-8.
    pub fallback_encoding: Option<TextEncoding>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            timeseries_dir: PathBuf::from("OEDIDataset"),
            timestamp_column: "timestamp".to_string(),
            metadata_csv: None,
            region_column: None,
            fallback_encoding: Some(TextEncoding::Latin1),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, thiserror::Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"run.chunk_size"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl BillingConfig {
    /// Returns the built-in configuration.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// The configured policies, in `run.policies` order.
    pub fn active_policies(&self) -> Vec<PricingPolicy> {
        self.run
            .policies
            .iter()
            .map(|kind| match kind {
                PolicyKind::Flat => PricingPolicy::Flat(self.flat.clone()),
                PolicyKind::TimeOfUse => PricingPolicy::TimeOfUse(self.tou.clone()),
                PolicyKind::Dynamic => PricingPolicy::Dynamic(self.dynamic.clone()),
            })
            .collect()
    }

    /// Loader for the dynamic policy's price table.
    pub fn price_loader(&self) -> CsvPriceLoader {
        CsvPriceLoader {
            fallback_encoding: self.source.fallback_encoding,
            ..self.dynamic.loader()
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let run = &self.run;

        if run.chunk_size == 0 {
            errors.push(ConfigError::new("run.chunk_size", "must be > 0"));
        }
        if run.threads == 0 {
            errors.push(ConfigError::new("run.threads", "must be > 0"));
        }
        if run.end_use_columns.is_empty() {
            errors.push(ConfigError::new("run.end_use_columns", "must name at least one column"));
        }
        if run.policies.is_empty() {
            errors.push(ConfigError::new("run.policies", "must name at least one policy"));
        }
        let mut seen = HashSet::new();
        for kind in &run.policies {
            if !seen.insert(kind) {
                errors.push(ConfigError::new("run.policies", format!("\"{kind}\" listed more than once")));
            }
        }

        for (i, w) in self.flat.windows.iter().enumerate() {
            if w.start >= w.end {
                errors.push(ConfigError::new(format!("flat.windows[{i}]"), "start must be before end"));
            }
            if !(w.rate.is_finite() && w.rate >= 0.0) {
                errors.push(ConfigError::new(format!("flat.windows[{i}].rate"), "must be >= 0"));
            }
        }

        let tou = &self.tou;
        if tou.peak_start_hour >= tou.peak_end_hour {
            errors.push(ConfigError::new("tou.peak_start_hour", "must be < tou.peak_end_hour"));
        }
        if tou.peak_end_hour > 24 {
            errors.push(ConfigError::new("tou.peak_end_hour", "must be <= 24"));
        }
        for (field, rate) in [
            ("tou.offpeak_rate", tou.offpeak_rate),
            ("tou.peak_rate", tou.peak_rate),
            ("tou.conservation_rate", tou.conservation_rate),
        ] {
            if !(rate.is_finite() && rate >= 0.0) {
                errors.push(ConfigError::new(field, "must be >= 0"));
            }
        }
        if !(tou.conservation_hours.is_finite() && tou.conservation_hours >= 0.0) {
            errors.push(ConfigError::new("tou.conservation_hours", "must be >= 0"));
        }

        let dynamic = &self.dynamic;
        if run.policies.contains(&PolicyKind::Dynamic) && dynamic.price_source.trim().is_empty() {
            errors.push(ConfigError::new("dynamic.price_source", "must not be empty"));
        }
        if !(dynamic.price_scale.is_finite() && dynamic.price_scale > 0.0) {
            errors.push(ConfigError::new("dynamic.price_scale", "must be > 0"));
        }

        errors
    }
}
