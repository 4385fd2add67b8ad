//! Lazily-filled, memoized reference price curves.
//!
//! A [`PriceCache`] is created once per run and passed by reference to the
//! driver and the dynamic pricing policy. Each source id is loaded at most
//! once until [`PriceCache::clear`] is called; concurrent first users of the
//! same source wait on a single load.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::calendar::{ceil_to_interval, interval_grid, parse_timestamp};
use crate::error::{BillingError, Result};
use crate::model::PriceCurve;
use crate::source::text::{TextEncoding, read_text};

/// Produces the resampled price curve for a source id.
pub trait PriceLoader: Sync {
    /// # Errors
    ///
    /// Missing or unreadable source data is an error; loaders never substitute
    /// a default price.
    fn load(&self, source_id: &str) -> Result<PriceCurve>;
}

/// Loads a two-column (timestamp, price) CSV whose source id is its path.
#[derive(Debug, Clone)]
pub struct CsvPriceLoader {
    pub timestamp_column: String,
    pub price_column: String,
    /// Multiplier applied to every price, e.g. `0.001` for $/MWh input.
    pub price_scale: f64,
    pub fallback_encoding: Option<TextEncoding>,
}

impl Default for CsvPriceLoader {
    fn default() -> Self {
        Self {
            timestamp_column: "timestamp".to_string(),
            price_column: "RT_LMP_kWh".to_string(),
            price_scale: 1.0,
            fallback_encoding: Some(TextEncoding::Latin1),
        }
    }
}

impl CsvPriceLoader {
    fn parse(&self, text: &str, source_id: &str) -> Result<Vec<(NaiveDateTime, f64)>> {
        let mut rdr = csv::Reader::from_reader(text.as_bytes());
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| BillingError::MissingColumn {
                    column: name.to_string(),
                    context: source_id.to_string(),
                })
        };
        let ts_idx = column(&self.timestamp_column)?;
        let price_idx = column(&self.price_column)?;

        let mut points = Vec::new();
        for (line, row) in rdr.records().enumerate() {
            let row = row?;
            let raw_ts = row.get(ts_idx).unwrap_or_default();
            let raw_price = row.get(price_idx).unwrap_or_default().trim();
            match (parse_timestamp(raw_ts), raw_price.parse::<f64>()) {
                (Some(ts), Ok(price)) => points.push((ts, price * self.price_scale)),
                _ => warn!(source = source_id, line = line + 2, "skipping unparsable price row"),
            }
        }
        Ok(points)
    }
}

impl PriceLoader for CsvPriceLoader {
    fn load(&self, source_id: &str) -> Result<PriceCurve> {
        let text = read_text(Path::new(source_id), self.fallback_encoding)?;
        let points = self.parse(&text, source_id)?;
        resample_forward_fill(points).ok_or_else(|| BillingError::EmptyPriceSource {
            source_id: source_id.to_string(),
        })
    }
}

/// Resamples sparse `(timestamp, price)` points onto the 15-minute grid.
///
/// The grid runs from the first timestamp (rounded up to the grid) through
/// the last; each grid point takes the latest price at or before it. Points
/// are sorted first and, for duplicate timestamps, the last one wins.
/// Returns `None` when there are no points.
pub fn resample_forward_fill(mut points: Vec<(NaiveDateTime, f64)>) -> Option<PriceCurve> {
    points.sort_by_key(|(ts, _)| *ts);
    // keep the last of each run of equal timestamps
    points.reverse();
    points.dedup_by_key(|(ts, _)| *ts);
    points.reverse();

    let (first, last) = (points.first()?.0, points.last()?.0);
    let mut timestamps = Vec::new();
    let mut prices = Vec::new();
    let mut next = 0;
    let mut current = points[0].1;
    for t in interval_grid(ceil_to_interval(first), last) {
        while next < points.len() && points[next].0 <= t {
            current = points[next].1;
            next += 1;
        }
        timestamps.push(t);
        prices.push(current);
    }
    PriceCurve::new(timestamps, prices)
}

/// Memoizing cache of price curves keyed by source id.
pub struct PriceCache<L> {
    loader: L,
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<PriceCurve>>>>>,
}

impl<L: PriceLoader> PriceCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<Arc<PriceCurve>>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the curve for `source_id`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error; a failed load is not cached, so a later
    /// call retries.
    pub fn get(&self, source_id: &str) -> Result<Arc<PriceCurve>> {
        let cell = self.entries().entry(source_id.to_string()).or_default().clone();
        if let Some(curve) = cell.get() {
            debug!(source = source_id, "price cache hit");
            return Ok(Arc::clone(curve));
        }
        cell.get_or_try_init(|| {
            info!(source = source_id, "loading price curve");
            let curve = self.loader.load(source_id)?;
            info!(source = source_id, intervals = curve.len(), "price curve cached");
            Ok::<_, BillingError>(Arc::new(curve))
        })
        .map(Arc::clone)
    }

    /// Evicts every cached curve; the next `get` reloads.
    pub fn clear(&self) {
        self.entries().clear();
        info!("price cache cleared");
    }

    /// Number of curves currently cached.
    pub fn len(&self) -> usize {
        self.entries().values().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}
