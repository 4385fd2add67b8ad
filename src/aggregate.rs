//! Per-building aggregation of consumption and interval cost.

use std::collections::BTreeMap;

use crate::model::{BillRecord, BillTable, BuildingId, RecordBatch};
use crate::pricing::PolicyKind;

/// Price series for one policy, aligned with the records of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyPrices {
    pub kind: PolicyKind,
    pub prices: Vec<f64>,
}

/// Sums `kwh_total` and `kwh_total * price` for every policy, per building.
///
/// Records are grouped by building id only: rows for different upgrades of
/// the same building within one batch are merged. The result has one row per
/// distinct building id, ordered by id, with cost columns in the order of
/// `series`.
///
/// # Panics
///
/// Panics if any price series is not the same length as `batch.records`.
pub fn aggregate(batch: &RecordBatch, series: &[PolicyPrices]) -> BillTable {
    for s in series {
        assert_eq!(
            s.prices.len(),
            batch.len(),
            "{} prices are not aligned with the batch",
            s.kind
        );
    }

    let mut totals: BTreeMap<BuildingId, (f64, Vec<f64>)> = BTreeMap::new();
    for (i, record) in batch.records.iter().enumerate() {
        let (kwh, costs) = totals
            .entry(record.building_id)
            .or_insert_with(|| (0.0, vec![0.0; series.len()]));
        *kwh += record.kwh_total;
        for (cost, s) in costs.iter_mut().zip(series) {
            *cost += record.kwh_total * s.prices[i];
        }
    }

    let rows = totals
        .into_iter()
        .map(|(building_id, (annual_kwh, costs))| BillRecord {
            building_id,
            annual_kwh,
            costs,
        })
        .collect();
    BillTable::new(series.iter().map(|s| s.kind).collect(), rows)
}
