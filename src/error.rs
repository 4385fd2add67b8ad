//! Error type shared by every stage of the billing pipeline.

use std::path::PathBuf;

/// Failures raised while loading inputs or computing bills.
///
/// Per-record problems are usually logged and skipped by the source; the
/// variants below are what remains when a unit of work (a cache fill or a
/// chunk load) cannot continue.
#[derive(thiserror::Error, Debug)]
pub enum BillingError {
    /// A required file (price table, timeseries file, metadata) is absent or unreadable.
    #[error("missing resource `{}`: {reason}", .path.display())]
    MissingResource { path: PathBuf, reason: String },

    /// An entry whose identifier or fields do not have the expected shape.
    #[error("malformed record in {context}: {reason}")]
    MalformedRecord { context: String, reason: String },

    /// A text table failed to decode under both the primary and fallback encodings.
    #[error("`{}` could not be decoded as {tried}", .path.display())]
    EncodingMismatch { path: PathBuf, tried: String },

    /// A column required by the caller is not present in a loaded table.
    #[error("column `{column}` not present in {context}")]
    MissingColumn { column: String, context: String },

    /// A price table parsed successfully but held no usable rows.
    #[error("price source `{source_id}` contains no prices")]
    EmptyPriceSource { source_id: String },

    #[error("I/O error on `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

pub type Result<T> = std::result::Result<T, BillingError>;

impl BillingError {
    /// Wraps an I/O error, mapping "not found" to [`BillingError::MissingResource`].
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            BillingError::MissingResource {
                path,
                reason: source.to_string(),
            }
        } else {
            BillingError::Io { path, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_missing_resource() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = BillingError::from_io("prices.csv", io);
        assert!(matches!(err, BillingError::MissingResource { .. }));
        assert!(err.to_string().contains("prices.csv"));
    }

    #[test]
    fn other_io_errors_keep_their_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = BillingError::from_io("prices.csv", io);
        assert!(matches!(err, BillingError::Io { .. }));
    }
}
