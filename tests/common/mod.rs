//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Datelike, NaiveDateTime, Timelike};

use tariff_bills::cache::{PriceLoader, resample_forward_fill};
use tariff_bills::calendar::year_grid;
use tariff_bills::model::{
    BillTable, BuildingId, BuildingIndex, BuildingIndexEntry, PriceCurve, RecordBatch, TimeseriesRecord,
};
use tariff_bills::source::TimeseriesSource;
use tariff_bills::{BillingError, Result};

/// End-use columns of every synthetic building.
pub fn columns() -> Vec<String> {
    vec!["heating".to_string(), "plug_loads".to_string()]
}

/// A full 2018 year for one building.
///
/// Consumption follows a daily shape scaled by the building id, so different
/// buildings get different bills.
pub fn synthetic_year(building_id: BuildingId) -> Vec<TimeseriesRecord> {
    let scale = 0.05 + (building_id % 11) as f64 * 0.01;
    year_grid(2018)
        .into_iter()
        .map(|timestamp| {
            let hour = timestamp.hour() as f64;
            let heating = if timestamp.month() <= 3 || timestamp.month() >= 11 {
                scale * 2.0
            } else {
                scale * 0.2
            };
            let plug = scale * (1.0 + (hour / 24.0));
            TimeseriesRecord {
                building_id,
                upgrade_id: 0,
                timestamp,
                end_uses: vec![heating, plug],
                kwh_total: 0.0,
            }
        })
        .collect()
}

/// In-memory timeseries source keyed by building id.
pub struct MemorySource {
    buildings: HashMap<BuildingId, Vec<TimeseriesRecord>>,
    pub loads: AtomicUsize,
}

impl MemorySource {
    pub fn new(ids: &[BuildingId]) -> Self {
        Self {
            buildings: ids.iter().map(|&id| (id, synthetic_year(id))).collect(),
            loads: AtomicUsize::new(0),
        }
    }
}

impl TimeseriesSource for MemorySource {
    fn load(&self, entries: &[BuildingIndexEntry]) -> Result<RecordBatch> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let mut records = Vec::new();
        for entry in entries {
            let year = self
                .buildings
                .get(&entry.building_id)
                .ok_or_else(|| BillingError::MissingResource {
                    path: entry.path.clone(),
                    reason: "building not in memory source".to_string(),
                })?;
            records.extend(year.iter().cloned());
        }
        Ok(RecordBatch::new(columns(), records))
    }
}

/// Index over `ids` in the given order, baseline upgrade only.
pub fn index(ids: &[BuildingId]) -> BuildingIndex {
    BuildingIndex::new(
        ids.iter()
            .map(|&id| BuildingIndexEntry {
                building_id: id,
                upgrade_id: 0,
                region: None,
                path: PathBuf::from(format!("{id}-0.csv")),
            })
            .collect(),
    )
}

/// Hourly 2018 price points: cheap overnight, expensive in the evening.
pub fn hourly_prices() -> Vec<(NaiveDateTime, f64)> {
    year_grid(2018)
        .into_iter()
        .filter(|ts| ts.minute() == 0)
        .map(|ts| {
            let price = match ts.hour() {
                0..=5 => 0.02,
                17..=20 => 0.09,
                _ => 0.04,
            };
            (ts, price)
        })
        .collect()
}

/// Price loader serving [`hourly_prices`] for any source id and counting loads.
#[derive(Default)]
pub struct StaticLoader {
    pub loads: AtomicUsize,
}

impl PriceLoader for StaticLoader {
    fn load(&self, source_id: &str) -> Result<PriceCurve> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        resample_forward_fill(hourly_prices()).ok_or_else(|| BillingError::EmptyPriceSource {
            source_id: source_id.to_string(),
        })
    }
}

/// Writes [`hourly_prices`] as `timestamp,RT_LMP_kWh` and returns the path.
pub fn write_price_csv(dir: &Path) -> PathBuf {
    let mut text = String::from("timestamp,RT_LMP_kWh\n");
    for (ts, price) in hourly_prices() {
        let _ = writeln!(text, "{},{price}", ts.format("%Y-%m-%d %H:%M:%S"));
    }
    let path = dir.join("RT_LMP_kWh.csv");
    fs::write(&path, text).expect("price CSV should be written");
    path
}

/// Writes `<id>-0.csv` files holding the first `days` days of each synthetic year.
pub fn write_timeseries_dir(dir: &Path, ids: &[BuildingId], days: usize) {
    let cols = columns();
    for &id in ids {
        let mut text = format!("timestamp,{}\n", cols.join(","));
        for record in synthetic_year(id).into_iter().take(days * 96) {
            let _ = writeln!(
                text,
                "{},{},{}",
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.end_uses[0],
                record.end_uses[1]
            );
        }
        fs::write(dir.join(format!("{id}-0.csv")), text).expect("timeseries CSV should be written");
    }
}

/// Rows of `table` keyed by building id, with costs in policy order.
pub fn by_building(table: &BillTable) -> HashMap<BuildingId, (f64, Vec<f64>)> {
    table
        .rows()
        .iter()
        .map(|r| (r.building_id, (r.annual_kwh, r.costs.clone())))
        .collect()
}

/// Relative comparison used for floating-point sums in different orders.
pub fn approx_eq(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Asserts two tables hold the same bills regardless of row order.
pub fn assert_same_bills(a: &BillTable, b: &BillTable) {
    assert_eq!(a.policies(), b.policies(), "policy columns differ");
    let (a, b) = (by_building(a), by_building(b));
    assert_eq!(a.len(), b.len(), "building counts differ");
    for (id, (kwh, costs)) in &a {
        let (other_kwh, other_costs) = b.get(id).unwrap_or_else(|| panic!("building {id} missing"));
        assert!(approx_eq(*kwh, *other_kwh), "kWh differs for {id}: {kwh} vs {other_kwh}");
        for (x, y) in costs.iter().zip(other_costs) {
            assert!(approx_eq(*x, *y), "cost differs for {id}: {x} vs {y}");
        }
    }
}
