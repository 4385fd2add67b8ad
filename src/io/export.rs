//! CSV and JSON export for bill tables.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::model::BillTable;

/// Exports bills to a CSV file at the given path.
///
/// Writes the header `bldg_id,annual_kwh,annual_cost_<policy>...` followed by
/// one row per billed building, in table order.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(table: &BillTable, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(table, buf)
}

/// Writes bills as CSV to any writer.
///
/// Costs are written with full precision; a `NaN` cost (dynamic pricing
/// before the first reference price) is written as `NaN`.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(table: &BillTable, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(table.header())?;

    for row in table.rows() {
        let mut record = Vec::with_capacity(2 + row.costs.len());
        record.push(row.building_id.to_string());
        record.push(row.annual_kwh.to_string());
        record.extend(row.costs.iter().map(f64::to_string));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct JsonBill {
    bldg_id: u64,
    annual_kwh: f64,
    costs: BTreeMap<String, Option<f64>>,
}

/// Writes bills as a pretty-printed JSON array.
///
/// Each element holds `bldg_id`, `annual_kwh` and a `costs` object keyed by
/// policy name. Non-finite costs become `null`.
///
/// # Errors
///
/// Returns an `io::Error` if serialization or writing fails.
pub fn write_json(table: &BillTable, mut writer: impl Write) -> io::Result<()> {
    let bills: Vec<JsonBill> = table
        .rows()
        .iter()
        .map(|row| JsonBill {
            bldg_id: row.building_id,
            annual_kwh: row.annual_kwh,
            costs: table
                .policies()
                .iter()
                .zip(&row.costs)
                .map(|(kind, cost)| (kind.name().to_string(), cost.is_finite().then_some(*cost)))
                .collect(),
        })
        .collect();
    serde_json::to_writer_pretty(&mut writer, &bills)?;
    writeln!(writer)?;
    writer.flush()
}

/// Exports bills to a JSON file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_json(table: &BillTable, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_json(table, io::BufWriter::new(file))
}
