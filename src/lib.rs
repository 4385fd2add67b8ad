//! Annual electricity bills for a building population under alternative tariffs.
//!
//! Interval consumption is read one chunk of buildings at a time, priced
//! under flat seasonal, time-of-use and real-time tariffs, and reduced to one
//! bill row per building.

pub mod aggregate;
pub mod cache;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
/// Bill table export.
pub mod io;
pub mod model;
pub mod pricing;
pub mod reporting;
pub mod source;
pub mod telemetry;

pub use error::{BillingError, Result};
