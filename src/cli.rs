use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::BillingConfig;
use crate::model::BuildingId;
use crate::pricing::PolicyKind;

/// Output encoding of the bill table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Annual electricity bills for a building population under several tariffs.
#[derive(Debug, Parser)]
#[command(name = "tariff-bills", version)]
pub struct CliOptions {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory of `<building>-<upgrade>.csv` timeseries files
    #[arg(long, value_name = "DIR")]
    pub timeseries_dir: Option<PathBuf>,

    /// Building metadata CSV keyed by `bldg_id`
    #[arg(long, value_name = "PATH")]
    pub metadata: Option<PathBuf>,

    /// Reference price CSV for the dynamic tariff
    #[arg(long, value_name = "PATH")]
    pub price_source: Option<PathBuf>,

    /// Output file; the table goes to stdout when omitted
    #[arg(long, short, value_name = "PATH")]
    pub out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Buildings per chunk
    #[arg(long, value_parser = parse_usize_positive)]
    pub chunk_size: Option<usize>,

    /// Worker threads (1 = sequential)
    #[arg(long, short, value_parser = parse_usize_positive)]
    pub threads: Option<usize>,

    /// Bill only the first N index entries
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Bill only these building ids (repeatable)
    #[arg(long = "building", value_name = "ID")]
    pub buildings: Vec<BuildingId>,

    /// Comma-separated policies to bill, in column order
    #[arg(long, value_delimiter = ',', value_parser = parse_policy)]
    pub policies: Vec<PolicyKind>,
}

impl CliOptions {
    /// Writes every flag that was given over the matching config field.
    pub fn apply(&self, cfg: &mut BillingConfig) {
        if let Some(dir) = &self.timeseries_dir {
            cfg.source.timeseries_dir = dir.clone();
        }
        if let Some(path) = &self.metadata {
            cfg.source.metadata_csv = Some(path.clone());
        }
        if let Some(path) = &self.price_source {
            cfg.dynamic.price_source = path.display().to_string();
        }
        if let Some(n) = self.chunk_size {
            cfg.run.chunk_size = n;
        }
        if let Some(n) = self.threads {
            cfg.run.threads = n;
        }
        if !self.policies.is_empty() {
            cfg.run.policies = self.policies.clone();
        }
    }
}

pub fn parse_args() -> CliOptions {
    CliOptions::parse()
}

/// Parses an explicit argument list, the first item being the program name.
pub fn parse_args_from<I, T>(args: I) -> Result<CliOptions, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CliOptions::try_parse_from(args)
}

fn parse_usize_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be a positive integer".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("not a valid number: {e}")),
    }
}

fn parse_policy(s: &str) -> Result<PolicyKind, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_config_untouched() {
        let opts = parse_args_from(["tariff-bills"]).expect("parse should succeed");
        assert!(opts.config.is_none());
        assert_eq!(opts.format, OutputFormat::Csv);

        let mut cfg = BillingConfig::baseline();
        opts.apply(&mut cfg);
        assert_eq!(cfg.run.chunk_size, 100);
        assert_eq!(cfg.run.policies, PolicyKind::ALL.to_vec());
    }

    #[test]
    fn overrides_are_applied() {
        let opts = parse_args_from([
            "tariff-bills",
            "--timeseries-dir",
            "data",
            "--chunk-size",
            "7",
            "--threads",
            "3",
            "--policies",
            "tou,flat",
            "--price-source",
            "lmp.csv",
            "--format",
            "json",
        ])
        .expect("parse should succeed");
        assert_eq!(opts.format, OutputFormat::Json);

        let mut cfg = BillingConfig::baseline();
        opts.apply(&mut cfg);
        assert_eq!(cfg.source.timeseries_dir, PathBuf::from("data"));
        assert_eq!(cfg.run.chunk_size, 7);
        assert_eq!(cfg.run.threads, 3);
        assert_eq!(cfg.run.policies, vec![PolicyKind::TimeOfUse, PolicyKind::Flat]);
        assert_eq!(cfg.dynamic.price_source, "lmp.csv");
    }

    #[test]
    fn building_flag_repeats() {
        let opts = parse_args_from(["tariff-bills", "--building", "5", "--building", "12", "--limit", "1"])
            .expect("parse should succeed");
        assert_eq!(opts.buildings, vec![5, 12]);
        assert_eq!(opts.limit, Some(1));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(parse_args_from(["tariff-bills", "--chunk-size", "0"]).is_err());
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(parse_args_from(["tariff-bills", "--policies", "flat,cpp"]).is_err());
    }
}
