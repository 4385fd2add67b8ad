//! Real-time pricing from a reference price curve.

use serde::Deserialize;

use crate::cache::{CsvPriceLoader, PriceCache, PriceLoader};
use crate::error::Result;
use crate::model::{PriceCurve, TimeseriesRecord};

/// Prices each interval at the most recent reference price at or before it.
///
/// Intervals earlier than the curve's first entry get `NaN`, which carries
/// through to that building's dynamic cost.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DynamicPolicy {
    /// Cache key of the price curve; the CSV path for [`CsvPriceLoader`].
    pub price_source: String,
    pub timestamp_column: String,
    pub price_column: String,
    pub price_scale: f64,
}

impl Default for DynamicPolicy {
    fn default() -> Self {
        Self {
            price_source: "RT_LMP_kWh.csv".to_string(),
            timestamp_column: "timestamp".to_string(),
            price_column: "RT_LMP_kWh".to_string(),
            price_scale: 1.0,
        }
    }
}

impl DynamicPolicy {
    /// CSV loader matching this policy's column layout.
    pub fn loader(&self) -> CsvPriceLoader {
        CsvPriceLoader {
            timestamp_column: self.timestamp_column.clone(),
            price_column: self.price_column.clone(),
            price_scale: self.price_scale,
            ..CsvPriceLoader::default()
        }
    }

    /// Looks up the curve through `cache` and aligns it onto `records`.
    ///
    /// # Errors
    ///
    /// Fails when the price source cannot be loaded.
    pub fn price<L: PriceLoader>(&self, records: &[TimeseriesRecord], cache: &PriceCache<L>) -> Result<Vec<f64>> {
        let curve = cache.get(&self.price_source)?;
        Ok(align(&curve, records))
    }
}

/// Forward-fill alignment of `curve` onto the record timestamps.
pub fn align(curve: &PriceCurve, records: &[TimeseriesRecord]) -> Vec<f64> {
    records.iter().map(|r| curve.price_at(r.timestamp)).collect()
}
