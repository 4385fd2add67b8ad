//! Time-of-use tariff with randomly placed conservation events.

use std::ops::Range;

use chrono::{Datelike, Timelike};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Deserialize;

use crate::calendar::INTERVALS_PER_HOUR;
use crate::model::{RecordBatch, TimeseriesRecord};

/// Peak/off-peak rates plus a demand-response overlay.
///
/// Weekdays inside `[peak_start_hour, peak_end_hour)` are peak; everything
/// else, including all weekend intervals, is off-peak. Conservation events
/// are blocks of `conservation_hours` worth of consecutive peak intervals
/// re-priced at `conservation_rate`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TouPolicy {
    pub offpeak_rate: f64,
    pub peak_rate: f64,
    pub peak_start_hour: u32,
    pub peak_end_hour: u32,
    pub conservation_rate: f64,
    pub conservation_hours: f64,
    /// Number of shuffled candidate positions examined when placing events.
    pub max_trials: usize,
    pub seed: u64,
}

impl Default for TouPolicy {
    fn default() -> Self {
        Self {
            offpeak_rate: 0.0991,
            peak_rate: 0.1211,
            peak_start_hour: 8,
            peak_end_hour: 20,
            conservation_rate: 0.6137,
            conservation_hours: 8.0,
            max_trials: 30,
            seed: 100,
        }
    }
}

impl TouPolicy {
    /// Length of one conservation block in intervals.
    pub fn block_intervals(&self) -> usize {
        (self.conservation_hours * INTERVALS_PER_HOUR as f64).round().max(0.0) as usize
    }

    /// Whether `record` falls in a weekday peak hour.
    pub fn is_peak(&self, record: &TimeseriesRecord) -> bool {
        let hour = record.timestamp.hour();
        let weekend = record.timestamp.weekday().num_days_from_monday() >= 5;
        !weekend && hour >= self.peak_start_hour && hour < self.peak_end_hour
    }

    /// Prices one building-year worth of records, placing events over its peak intervals.
    pub fn price_run(&self, records: &[TimeseriesRecord]) -> Vec<f64> {
        let peak: Vec<bool> = records.iter().map(|r| self.is_peak(r)).collect();
        let mut prices: Vec<f64> = peak
            .iter()
            .map(|&p| if p { self.peak_rate } else { self.offpeak_rate })
            .collect();
        for block in self.conservation_blocks(&peak) {
            prices[block].fill(self.conservation_rate);
        }
        prices
    }

    /// Chooses non-overlapping all-peak blocks with a seeded shuffle.
    ///
    /// Every start position whose whole block is peak is a candidate. The
    /// candidates are shuffled with `seed`, then the first `max_trials` of them
    /// are walked in order. A candidate is accepted when it overlaps no
    /// accepted block and keeps the accepted interval count within
    /// [`TouPolicy::block_intervals`]. Returned blocks are sorted by start.
    pub fn conservation_blocks(&self, peak: &[bool]) -> Vec<Range<usize>> {
        let n = self.block_intervals();
        if n == 0 || peak.len() < n {
            return Vec::new();
        }

        // run[i] = length of the all-peak stretch starting at i
        let mut run = vec![0usize; peak.len() + 1];
        for i in (0..peak.len()).rev() {
            run[i] = if peak[i] { run[i + 1] + 1 } else { 0 };
        }
        let mut candidates: Vec<usize> = (0..=peak.len() - n).filter(|&i| run[i] >= n).collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        candidates.shuffle(&mut rng);

        let target = n;
        let mut placed = 0;
        let mut used = vec![false; peak.len()];
        let mut accepted = Vec::new();
        for &start in candidates.iter().take(self.max_trials) {
            if placed + n > target {
                break;
            }
            let block = start..start + n;
            if used[block.clone()].iter().any(|&u| u) {
                continue;
            }
            used[block.clone()].fill(true);
            placed += n;
            accepted.push(block);
        }
        accepted.sort_by_key(|b| b.start);
        accepted
    }

    /// Prices a batch, placing events independently within each building's records.
    pub fn price(&self, batch: &RecordBatch) -> Vec<f64> {
        let mut prices = Vec::with_capacity(batch.len());
        for run in batch.building_runs() {
            prices.extend(self.price_run(&batch.records[run]));
        }
        prices
    }
}
