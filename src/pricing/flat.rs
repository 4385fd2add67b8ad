//! Flat seasonal tariff.

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::calendar::parse_timestamp;
use crate::model::TimeseriesRecord;

/// One seasonal rate applying to timestamps in `[start, end)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct SeasonWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub rate: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWindow {
    start: String,
    end: String,
    rate: f64,
}

impl TryFrom<RawWindow> for SeasonWindow {
    type Error = String;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        let parse = |s: &str| parse_timestamp(s).ok_or_else(|| format!("invalid window timestamp `{s}`"));
        Ok(Self {
            start: parse(&raw.start)?,
            end: parse(&raw.end)?,
            rate: raw.rate,
        })
    }
}

impl SeasonWindow {
    /// Builds a window from `%Y-%m-%d` dates (midnight boundaries).
    ///
    /// # Panics
    ///
    /// Panics if either date is not a valid `%Y-%m-%d` literal.
    pub fn from_dates(start: &str, end: &str, rate: f64) -> Self {
        let parse = |s: &str| parse_timestamp(s).unwrap_or_else(|| panic!("invalid date literal `{s}`"));
        Self {
            start: parse(start),
            end: parse(end),
            rate,
        }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Seasonal flat rates selected purely by calendar window.
///
/// Windows are half-open at midnight, so the last day named by each default
/// window (Apr 30, Oct 31, Dec 31 of 2018) falls outside every window and is
/// priced at 0. Later windows override earlier ones where they overlap.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlatPolicy {
    pub windows: Vec<SeasonWindow>,
}

impl Default for FlatPolicy {
    fn default() -> Self {
        Self {
            windows: vec![
                SeasonWindow::from_dates("2018-01-01", "2018-04-30", 0.12673),
                SeasonWindow::from_dates("2018-05-01", "2018-10-31", 0.10870),
                SeasonWindow::from_dates("2018-11-01", "2018-12-31", 0.13718),
            ],
        }
    }
}

impl FlatPolicy {
    /// Price of one timestamp; 0 outside every window.
    pub fn price_at(&self, ts: NaiveDateTime) -> f64 {
        self.windows
            .iter()
            .rev()
            .find(|w| w.contains(ts))
            .map_or(0.0, |w| w.rate)
    }

    pub fn price(&self, records: &[TimeseriesRecord]) -> Vec<f64> {
        records.iter().map(|r| self.price_at(r.timestamp)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).expect("valid timestamp")
    }

    #[test]
    fn seasonal_rates() {
        let policy = FlatPolicy::default();
        assert_eq!(policy.price_at(ts("2018-03-01")), 0.12673);
        assert_eq!(policy.price_at(ts("2018-07-04")), 0.10870);
        assert_eq!(policy.price_at(ts("2018-12-25")), 0.13718);
    }

    #[test]
    fn window_end_days_are_unpriced() {
        let policy = FlatPolicy::default();
        assert_eq!(policy.price_at(ts("2018-04-29 23:45")), 0.12673);
        assert_eq!(policy.price_at(ts("2018-04-30 00:00")), 0.0);
        assert_eq!(policy.price_at(ts("2018-10-31 12:00")), 0.0);
        assert_eq!(policy.price_at(ts("2018-12-31 23:45")), 0.0);
        assert_eq!(policy.price_at(ts("2019-01-01 00:00")), 0.0);
        assert_eq!(policy.price_at(ts("2018-05-01 00:00")), 0.10870);
    }

    #[test]
    fn windows_deserialize_from_toml() {
        let policy: FlatPolicy = toml::from_str(
            r#"
windows = [
  { start = "2019-01-01", end = "2020-01-01", rate = 0.2 },
]
"#,
        )
        .expect("parse");
        assert_eq!(policy.price_at(ts("2019-06-01 12:00")), 0.2);
        assert_eq!(policy.price_at(ts("2018-06-01 12:00")), 0.0);
    }

    #[test]
    fn bad_window_timestamp_is_rejected() {
        let parsed: Result<FlatPolicy, _> =
            toml::from_str(r#"windows = [{ start = "June", end = "2020-01-01", rate = 0.2 }]"#);
        assert!(parsed.is_err());
    }
}
