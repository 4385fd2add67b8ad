//! Pricing policies: map a batch of interval records to per-interval $/kWh.

pub mod dynamic;
pub mod flat;
pub mod tou;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::{PriceCache, PriceLoader};
use crate::error::Result;
use crate::model::RecordBatch;
use crate::source::MetadataTable;

pub use dynamic::DynamicPolicy;
pub use flat::{FlatPolicy, SeasonWindow};
pub use tou::TouPolicy;

/// Identifies a policy and names its output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum PolicyKind {
    #[serde(rename = "flat")]
    Flat,
    #[serde(rename = "tou")]
    TimeOfUse,
    #[serde(rename = "dynamic")]
    Dynamic,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [PolicyKind::Flat, PolicyKind::TimeOfUse, PolicyKind::Dynamic];

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Flat => "flat",
            PolicyKind::TimeOfUse => "tou",
            PolicyKind::Dynamic => "dynamic",
        }
    }

    /// Output column holding this policy's annual cost.
    pub fn cost_column(self) -> String {
        format!("annual_cost_{}", self.name())
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PolicyKind::ALL
            .into_iter()
            .find(|k| k.name() == s.trim())
            .ok_or_else(|| format!("unknown policy \"{s}\", expected one of: flat, tou, dynamic"))
    }
}

/// A configured pricing policy.
///
/// Every policy is invoked through [`PricingPolicy::price`], which returns one
/// price per record, positionally aligned with `batch.records`.
#[derive(Debug, Clone, PartialEq)]
pub enum PricingPolicy {
    Flat(FlatPolicy),
    TimeOfUse(TouPolicy),
    Dynamic(DynamicPolicy),
}

impl PricingPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PricingPolicy::Flat(_) => PolicyKind::Flat,
            PricingPolicy::TimeOfUse(_) => PolicyKind::TimeOfUse,
            PricingPolicy::Dynamic(_) => PolicyKind::Dynamic,
        }
    }

    /// Prices every record of `batch`.
    ///
    /// `metadata` is available to policies that differentiate by building;
    /// the built-in ones ignore it.
    ///
    /// # Errors
    ///
    /// Only the dynamic policy can fail, when its price source cannot be loaded.
    pub fn price<L: PriceLoader>(
        &self,
        batch: &RecordBatch,
        _metadata: Option<&MetadataTable>,
        cache: &PriceCache<L>,
    ) -> Result<Vec<f64>> {
        match self {
            PricingPolicy::Flat(p) => Ok(p.price(&batch.records)),
            PricingPolicy::TimeOfUse(p) => Ok(p.price(batch)),
            PricingPolicy::Dynamic(p) => p.price(&batch.records, cache),
        }
    }

    /// Price source this policy needs cached, if any.
    pub fn price_source(&self) -> Option<&str> {
        match self {
            PricingPolicy::Dynamic(p) => Some(&p.price_source),
            _ => None,
        }
    }
}
