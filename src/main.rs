//! tariff-bills entry point: CLI wiring and config-driven driver construction.

use std::io;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use tracing::{error, info};

use tariff_bills::cache::PriceCache;
use tariff_bills::cli::{CliOptions, OutputFormat, parse_args};
use tariff_bills::config::BillingConfig;
use tariff_bills::driver::{BillDriver, BillRun, worker_pool};
use tariff_bills::io::export::{export_csv, export_json, write_csv, write_json};
use tariff_bills::reporting::BillSummary;
use tariff_bills::source::{CsvDirectorySource, MetadataTable, build_index};
use tariff_bills::telemetry::init_tracing;
use tariff_bills::{BillingError, Result};

fn load_config(cli: &CliOptions) -> std::result::Result<BillingConfig, Vec<String>> {
    let mut cfg = match &cli.config {
        Some(path) => BillingConfig::from_toml_file(path).map_err(|e| vec![e.to_string()])?,
        None => BillingConfig::baseline(),
    };
    cli.apply(&mut cfg);

    let errors = cfg.validate();
    if errors.is_empty() {
        Ok(cfg)
    } else {
        Err(errors.iter().map(ToString::to_string).collect())
    }
}

/// Builds the index, source, cache and driver from `cfg` and bills every selected building.
fn bill(cli: &CliOptions, cfg: &BillingConfig) -> Result<BillRun> {
    let mut index = build_index(&cfg.source.timeseries_dir)?;
    if !cli.buildings.is_empty() {
        index = index.select(&cli.buildings);
    }
    if let Some(n) = cli.limit {
        index = index.truncate(n);
    }

    let metadata = cfg
        .source
        .metadata_csv
        .as_deref()
        .map(|path| MetadataTable::from_csv_path(path, cfg.source.fallback_encoding))
        .transpose()?;
    if let (Some(meta), Some(column)) = (&metadata, &cfg.source.region_column) {
        index = index.with_regions(|id| meta.attribute(id, column));
    }
    info!(buildings = index.len(), chunk_size = cfg.run.chunk_size, "building index ready");

    let source = CsvDirectorySource::new(cfg.source.timestamp_column.clone())
        .with_columns(cfg.run.end_use_columns.iter().cloned());
    let policies = cfg.active_policies();
    let cache = PriceCache::new(cfg.price_loader());
    let driver = BillDriver::new(&source, &policies, &cache).with_metadata(metadata.as_ref());
    let columns = &cfg.run.end_use_columns;

    let run = if cfg.run.threads > 1 {
        let pool = worker_pool(cfg.run.threads)?;
        driver.run_parallel(&index, columns, cfg.run.chunk_size, &pool, &AtomicBool::new(false))
    } else {
        driver.run(&index, columns, cfg.run.chunk_size)
    };
    Ok(run)
}

fn write_output(cli: &CliOptions, run: &BillRun) -> io::Result<()> {
    match (&cli.out, cli.format) {
        (Some(path), OutputFormat::Csv) => export_csv(&run.bills, path),
        (Some(path), OutputFormat::Json) => export_json(&run.bills, path),
        (None, OutputFormat::Csv) => write_csv(&run.bills, io::stdout().lock()),
        (None, OutputFormat::Json) => write_json(&run.bills, io::stdout().lock()),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = parse_args();

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(errors) => {
            for e in &errors {
                eprintln!("{e}");
            }
            return ExitCode::FAILURE;
        }
    };

    let run = match bill(&cli, &cfg) {
        Ok(run) => run,
        Err(e) => {
            error!(error = %e, "billing could not start");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = write_output(&cli, &run) {
        let e = BillingError::from_io(cli.out.clone().unwrap_or_else(|| "<stdout>".into()), e);
        eprintln!("error: failed to write bills: {e}");
        return ExitCode::FAILURE;
    }
    if let Some(path) = &cli.out {
        eprintln!("Bills written to {}", path.display());
    }
    eprintln!("{}", BillSummary::from_table(&run.bills));

    match &run.stop {
        None => ExitCode::SUCCESS,
        Some(stop) => {
            eprintln!("error: {stop}");
            ExitCode::FAILURE
        }
    }
}
