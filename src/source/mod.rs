//! Timeseries sources: where interval records for a chunk of buildings come from.

pub mod metadata;
pub mod text;

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::calendar::parse_timestamp;
use crate::error::{BillingError, Result};
use crate::model::{
    BuildingId, BuildingIndex, BuildingIndexEntry, RecordBatch, TimeseriesRecord, UpgradeId,
};

pub use metadata::{BuildingMetadata, MetadataTable};
pub use text::{TextEncoding, read_text};

/// Supplies the interval records for a set of index entries.
///
/// Implementations must return every record of every requested building,
/// keeping each building's records contiguous and time-ordered. `Sync` lets
/// the driver share one source across worker threads.
pub trait TimeseriesSource: Sync {
    /// Loads the full-year records of exactly `entries`.
    ///
    /// # Errors
    ///
    /// Fails when a requested building's data cannot be found or read.
    fn load(&self, entries: &[BuildingIndexEntry]) -> Result<RecordBatch>;
}

/// Reads one CSV file per building-year, named `<building>-<upgrade>.csv`.
///
/// Each file has a timestamp column and one column per end use. Only the
/// timestamp and the selected end-use columns are parsed; other columns
/// (secondary time stamps, labels) are ignored. With no selection every
/// non-timestamp column of the first file is read.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    timestamp_column: String,
    end_use_columns: Vec<String>,
}

impl Default for CsvDirectorySource {
    fn default() -> Self {
        Self::new("timestamp")
    }
}

impl CsvDirectorySource {
    pub fn new(timestamp_column: impl Into<String>) -> Self {
        Self {
            timestamp_column: timestamp_column.into(),
            end_use_columns: Vec::new(),
        }
    }

    /// Restricts parsing to `columns`, in that order.
    pub fn with_columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.end_use_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    fn read_file(&self, entry: &BuildingIndexEntry, columns: &mut Vec<String>) -> Result<Vec<TimeseriesRecord>> {
        let file = File::open(&entry.path).map_err(|e| BillingError::from_io(&entry.path, e))?;
        let mut rdr = csv::Reader::from_reader(file);
        let headers = rdr.headers()?.clone();
        let context = || entry.path.display().to_string();

        let ts_idx = headers
            .iter()
            .position(|h| h == self.timestamp_column)
            .ok_or_else(|| BillingError::MissingColumn {
                column: self.timestamp_column.clone(),
                context: context(),
            })?;

        if columns.is_empty() {
            columns.extend(
                headers
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != ts_idx)
                    .map(|(_, h)| h.to_string()),
            );
        }
        let value_idx = columns
            .iter()
            .map(|col| {
                headers.iter().position(|h| h == col).ok_or_else(|| BillingError::MissingColumn {
                    column: col.clone(),
                    context: context(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (line, row) in rdr.records().enumerate() {
            let parsed = row
                .map_err(BillingError::from)
                .and_then(|row| parse_row(entry, &row, ts_idx, &value_idx));
            match parsed {
                Ok(record) => records.push(record),
                Err(err) => {
                    skipped += 1;
                    // header is line 1
                    warn!(file = %context(), line = line + 2, error = %err, "skipping record");
                }
            }
        }
        if records.is_empty() {
            return Err(BillingError::MalformedRecord {
                context: context(),
                reason: format!("no usable records ({skipped} rows skipped)"),
            });
        }
        records.sort_by_key(|r| r.timestamp);
        debug!(file = %context(), records = records.len(), skipped, "loaded timeseries file");
        Ok(records)
    }
}

fn parse_row(
    entry: &BuildingIndexEntry,
    row: &StringRecord,
    ts_idx: usize,
    value_idx: &[usize],
) -> Result<TimeseriesRecord> {
    let malformed = |reason: String| BillingError::MalformedRecord {
        context: entry.path.display().to_string(),
        reason,
    };
    let raw_ts = row.get(ts_idx).unwrap_or_default();
    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| malformed(format!("invalid timestamp `{raw_ts}`")))?;
    let end_uses = value_idx
        .iter()
        .map(|&i| {
            let raw = row.get(i).unwrap_or_default().trim();
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| malformed(format!("invalid consumption value `{raw}`")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(TimeseriesRecord {
        building_id: entry.building_id,
        upgrade_id: entry.upgrade_id,
        timestamp,
        end_uses,
        kwh_total: 0.0,
    })
}

impl TimeseriesSource for CsvDirectorySource {
    fn load(&self, entries: &[BuildingIndexEntry]) -> Result<RecordBatch> {
        let mut columns = self.end_use_columns.clone();
        let mut records = Vec::new();
        for entry in entries {
            records.extend(self.read_file(entry, &mut columns)?);
        }
        Ok(RecordBatch::new(columns, records))
    }
}

/// Splits a file stem of the form `<building>-<upgrade>` into its identifiers.
///
/// # Errors
///
/// `MalformedRecord` when the stem does not have exactly two integer parts.
pub fn parse_index_name(stem: &str) -> Result<(BuildingId, UpgradeId)> {
    let malformed = |reason: &str| BillingError::MalformedRecord {
        context: format!("index entry `{stem}`"),
        reason: reason.to_string(),
    };
    let (bldg, upgrade) = stem
        .split_once('-')
        .filter(|(_, rest)| !rest.contains('-'))
        .ok_or_else(|| malformed("expected `<building>-<upgrade>`"))?;
    let building_id = bldg.parse().map_err(|_| malformed("building id is not an integer"))?;
    let upgrade_id = upgrade.parse().map_err(|_| malformed("upgrade id is not an integer"))?;
    Ok((building_id, upgrade_id))
}

/// Indexes the `.csv` files directly under `dir` (not recursive), sorted by name.
///
/// Files whose names do not parse are skipped with a warning.
///
/// # Errors
///
/// `MissingResource` when `dir` cannot be read.
pub fn build_index(dir: &Path) -> Result<BuildingIndex> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| BillingError::from_io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        match parse_index_name(stem) {
            Ok((building_id, upgrade_id)) => entries.push(BuildingIndexEntry {
                building_id,
                upgrade_id,
                region: None,
                path,
            }),
            Err(err) => warn!(error = %err, "skipping unexpected file name"),
        }
    }
    info!(dir = %dir.display(), files = entries.len(), "built timeseries index");
    Ok(BuildingIndex::new(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).expect("create fixture");
        file.write_all(body.as_bytes()).expect("write fixture");
        path
    }

    #[test]
    fn index_names_parse() {
        assert_eq!(parse_index_name("1234567-0").ok(), Some((1234567, 0)));
        assert!(parse_index_name("1234567").is_err());
        assert!(parse_index_name("abc-0").is_err());
        assert!(parse_index_name("1-2-3").is_err());
        assert!(parse_index_name("12-up").is_err());
    }

    #[test]
    fn build_index_skips_unexpected_names() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_file(tmp.path(), "20-0.csv", "timestamp,a\n");
        write_file(tmp.path(), "10-1.csv", "timestamp,a\n");
        write_file(tmp.path(), "notes.csv", "x\n");
        write_file(tmp.path(), "30-0.txt", "x\n");

        let index = build_index(tmp.path()).expect("index");
        let ids: Vec<_> = index.entries().iter().map(|e| (e.building_id, e.upgrade_id)).collect();
        assert_eq!(ids, vec![(10, 1), (20, 0)]);
    }

    #[test]
    fn build_index_on_missing_dir_fails() {
        let err = build_index(Path::new("/nonexistent/timeseries")).expect_err("must fail");
        assert!(matches!(err, BillingError::MissingResource { .. }));
    }

    #[test]
    fn load_skips_malformed_rows_and_sorts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = write_file(
            tmp.path(),
            "7-0.csv",
            "timestamp,heating,cooling\n\
             2018-01-01 00:15:00,1.0,0.5\n\
             not-a-date,1.0,0.5\n\
             2018-01-01 00:00:00,2.0,0.25\n\
             2018-01-01 00:30:00,oops,0.5\n",
        );
        let entry = BuildingIndexEntry {
            building_id: 7,
            upgrade_id: 0,
            region: None,
            path,
        };
        let batch = CsvDirectorySource::default().load(&[entry]).expect("load");
        assert_eq!(batch.columns, vec!["heating", "cooling"]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records[0].end_uses, vec![2.0, 0.25]);
        assert!(batch.records[0].timestamp < batch.records[1].timestamp);
    }

    #[test]
    fn unselected_text_columns_are_ignored() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = write_file(
            tmp.path(),
            "5-0.csv",
            "timestamp,TimeDST,heating,label\n\
             2018-01-01 00:00:00,2018-01-01 01:00:00,1.5,north\n\
             2018-01-01 00:15:00,2018-01-01 01:15:00,2.5,north\n",
        );
        let entry = BuildingIndexEntry {
            building_id: 5,
            upgrade_id: 0,
            region: None,
            path,
        };
        let batch = CsvDirectorySource::default()
            .with_columns(["heating"])
            .load(&[entry])
            .expect("load");
        assert_eq!(batch.columns, vec!["heating"]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records[1].end_uses, vec![2.5]);
    }

    #[test]
    fn file_without_usable_rows_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = write_file(
            tmp.path(),
            "5-0.csv",
            "timestamp,TimeDST,heating\n2018-01-01 00:00:00,2018-01-01 01:00:00,1.5\n",
        );
        let entry = BuildingIndexEntry {
            building_id: 5,
            upgrade_id: 0,
            region: None,
            path,
        };
        let err = CsvDirectorySource::default().load(&[entry]).expect_err("must fail");
        assert!(matches!(err, BillingError::MalformedRecord { .. }), "got {err:?}");
    }

    #[test]
    fn load_of_missing_file_is_missing_resource() {
        let entry = BuildingIndexEntry {
            building_id: 1,
            upgrade_id: 0,
            region: None,
            path: PathBuf::from("/nonexistent/1-0.csv"),
        };
        let err = CsvDirectorySource::default().load(&[entry]).expect_err("must fail");
        assert!(matches!(err, BillingError::MissingResource { .. }));
    }

    #[test]
    fn missing_timestamp_column_is_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = write_file(tmp.path(), "1-0.csv", "time,a\n2018-01-01,1\n");
        let entry = BuildingIndexEntry {
            building_id: 1,
            upgrade_id: 0,
            region: None,
            path,
        };
        let err = CsvDirectorySource::default().load(&[entry]).expect_err("must fail");
        assert!(matches!(err, BillingError::MissingColumn { .. }));
    }
}
