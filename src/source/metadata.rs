//! Optional per-building metadata, keyed by building id.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{info, warn};

use super::text::{TextEncoding, read_text};
use crate::error::{BillingError, Result};
use crate::model::BuildingId;

/// Name of the key column in metadata tables.
pub const BUILDING_ID_COLUMN: &str = "bldg_id";

/// Descriptive attributes of one building (e.g. county, vintage, floor area).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildingMetadata {
    pub attributes: BTreeMap<String, String>,
}

impl BuildingMetadata {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Read-only metadata lookup handed to pricing policies.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    rows: HashMap<BuildingId, BuildingMetadata>,
}

impl MetadataTable {
    pub fn new(rows: HashMap<BuildingId, BuildingMetadata>) -> Self {
        Self { rows }
    }

    /// Loads a CSV metadata table, falling back to `fallback` when it is not UTF-8.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing, undecodable, or lacks a `bldg_id` column.
    /// Rows with an unparsable building id are skipped with a warning.
    pub fn from_csv_path(path: &Path, fallback: Option<TextEncoding>) -> Result<Self> {
        let text = read_text(path, fallback)?;
        let table = Self::from_csv_str(&text, &path.display().to_string())?;
        info!(file = %path.display(), buildings = table.len(), "loaded building metadata");
        Ok(table)
    }

    /// Parses a metadata table from CSV text; `context` names the source in diagnostics.
    pub fn from_csv_str(text: &str, context: &str) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(text.as_bytes());
        let headers = rdr.headers()?.clone();
        let id_idx = headers
            .iter()
            .position(|h| h == BUILDING_ID_COLUMN)
            .ok_or_else(|| BillingError::MissingColumn {
                column: BUILDING_ID_COLUMN.to_string(),
                context: context.to_string(),
            })?;

        let mut rows = HashMap::new();
        for row in rdr.records() {
            let row = row?;
            let raw_id = row.get(id_idx).unwrap_or_default().trim();
            let Ok(building_id) = raw_id.parse::<BuildingId>() else {
                let err = BillingError::MalformedRecord {
                    context: context.to_string(),
                    reason: format!("building id `{raw_id}` is not an integer"),
                };
                warn!(error = %err, "skipping metadata row");
                continue;
            };
            let attributes = headers
                .iter()
                .zip(row.iter())
                .enumerate()
                .filter(|(i, _)| *i != id_idx)
                .map(|(_, (h, v))| (h.to_string(), v.to_string()))
                .collect();
            rows.insert(building_id, BuildingMetadata { attributes });
        }
        Ok(Self { rows })
    }

    pub fn get(&self, building_id: BuildingId) -> Option<&BuildingMetadata> {
        self.rows.get(&building_id)
    }

    /// Value of attribute `name` for `building_id`, if both exist and it is non-empty.
    pub fn attribute(&self, building_id: BuildingId, name: &str) -> Option<String> {
        self.get(building_id)
            .and_then(|m| m.get(name))
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attributes_by_building() {
        let csv = "bldg_id,in.county,in.vintage\n10,G2500170,1980s\n11,,2000s\nx,G1,1950s\n";
        let table = MetadataTable::from_csv_str(csv, "meta.csv").expect("parse");
        assert_eq!(table.len(), 2);
        assert_eq!(table.attribute(10, "in.county").as_deref(), Some("G2500170"));
        assert_eq!(table.attribute(11, "in.county"), None);
        assert_eq!(table.get(11).and_then(|m| m.get("in.vintage")), Some("2000s"));
        assert!(table.get(99).is_none());
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let err = MetadataTable::from_csv_str("id,county\n1,a\n", "meta.csv").expect_err("must fail");
        assert!(matches!(err, BillingError::MissingColumn { .. }));
    }
}
