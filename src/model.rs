//! Core data types: interval records, the building index, price curves and bills.

use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::pricing::PolicyKind;

/// Building identifier as it appears in timeseries file names and metadata.
pub type BuildingId = u64;
/// Upgrade scenario identifier (0 is the baseline stock).
pub type UpgradeId = u32;

/// One 15-minute interval of metered consumption for a building.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesRecord {
    pub building_id: BuildingId,
    pub upgrade_id: UpgradeId,
    pub timestamp: NaiveDateTime,
    /// End-use consumption (kWh), aligned with [`RecordBatch::columns`].
    pub end_uses: Vec<f64>,
    /// Sum of the designated end-use fields; filled in by the driver.
    pub kwh_total: f64,
}

/// A table of interval records handed over by a timeseries source.
///
/// Records of one building are contiguous and ordered by timestamp.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub records: Vec<TimeseriesRecord>,
}

impl RecordBatch {
    pub fn new(columns: Vec<String>, records: Vec<TimeseriesRecord>) -> Self {
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of `name` in [`RecordBatch::columns`].
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index ranges of maximal runs sharing one (building, upgrade) pair.
    pub fn building_runs(&self) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        let mut start = 0;
        for i in 1..=self.records.len() {
            let boundary = i == self.records.len() || {
                let (a, b) = (&self.records[i - 1], &self.records[i]);
                a.building_id != b.building_id || a.upgrade_id != b.upgrade_id
            };
            if boundary {
                if start < i {
                    runs.push(start..i);
                }
                start = i;
            }
        }
        runs
    }
}

/// Where one building-year of interval data lives.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingIndexEntry {
    pub building_id: BuildingId,
    pub upgrade_id: UpgradeId,
    pub region: Option<String>,
    pub path: PathBuf,
}

/// Ordered list of buildings to bill. Built once per run.
#[derive(Debug, Clone, Default)]
pub struct BuildingIndex {
    entries: Vec<BuildingIndexEntry>,
}

impl BuildingIndex {
    pub fn new(entries: Vec<BuildingIndexEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BuildingIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps only entries whose building id is in `ids`, preserving order.
    pub fn select(self, ids: &[BuildingId]) -> Self {
        let wanted: HashSet<BuildingId> = ids.iter().copied().collect();
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|e| wanted.contains(&e.building_id))
                .collect(),
        }
    }

    /// Keeps at most the first `n` entries.
    pub fn truncate(mut self, n: usize) -> Self {
        self.entries.truncate(n);
        self
    }

    /// Attaches a region code to every entry for which `lookup` returns one.
    pub fn with_regions(mut self, lookup: impl Fn(BuildingId) -> Option<String>) -> Self {
        for entry in &mut self.entries {
            entry.region = lookup(entry.building_id);
        }
        self
    }
}

/// Gap-free price series on the 15-minute grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceCurve {
    timestamps: Vec<NaiveDateTime>,
    prices: Vec<f64>,
}

impl PriceCurve {
    /// Builds a curve, returning `None` unless timestamps strictly increase and
    /// both vectors have the same length.
    pub fn new(timestamps: Vec<NaiveDateTime>, prices: Vec<f64>) -> Option<Self> {
        if timestamps.len() != prices.len() || timestamps.windows(2).any(|w| w[0] >= w[1]) {
            return None;
        }
        Some(Self { timestamps, prices })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    /// Most recent price at or before `ts`; `NaN` when `ts` precedes the curve.
    pub fn price_at(&self, ts: NaiveDateTime) -> f64 {
        match self.timestamps.partition_point(|t| *t <= ts) {
            0 => f64::NAN,
            i => self.prices[i - 1],
        }
    }
}

/// Annual consumption and cost for one building.
#[derive(Debug, Clone, PartialEq)]
pub struct BillRecord {
    pub building_id: BuildingId,
    pub annual_kwh: f64,
    /// One annual cost per policy, aligned with [`BillTable::policies`].
    pub costs: Vec<f64>,
}

/// Per-building bills under a fixed list of policies.
#[derive(Debug, Clone, PartialEq)]
pub struct BillTable {
    policies: Vec<PolicyKind>,
    rows: Vec<BillRecord>,
}

impl BillTable {
    /// Empty table with the given policy columns.
    pub fn empty(policies: Vec<PolicyKind>) -> Self {
        Self {
            policies,
            rows: Vec::new(),
        }
    }

    pub fn new(policies: Vec<PolicyKind>, rows: Vec<BillRecord>) -> Self {
        Self { policies, rows }
    }

    pub fn policies(&self) -> &[PolicyKind] {
        &self.policies
    }

    pub fn rows(&self) -> &[BillRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names of the output artifact, in order.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["bldg_id".to_string(), "annual_kwh".to_string()];
        header.extend(self.policies.iter().map(|p| p.cost_column()));
        header
    }

    /// Appends the rows of `other`, which must carry the same policy columns.
    pub fn append(&mut self, other: BillTable) {
        debug_assert_eq!(self.policies, other.policies);
        self.rows.extend(other.rows);
    }

    /// Annual cost of `row` under `kind`, if that policy is a column of this table.
    pub fn cost(&self, row: &BillRecord, kind: PolicyKind) -> Option<f64> {
        let col = self.policies.iter().position(|p| *p == kind)?;
        row.costs.get(col).copied()
    }

    /// First row billed for `building_id`.
    pub fn find(&self, building_id: BuildingId) -> Option<&BillRecord> {
        self.rows.iter().find(|r| r.building_id == building_id)
    }
}
