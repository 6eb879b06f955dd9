//! Error types for canopy-data.

use std::path::PathBuf;

/// Errors from feature matrix construction and file loading.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the tab-separated parser encounters a malformed record.
    #[error("parse error in {path} at byte offset {offset}")]
    Parse {
        /// Path to the matrix file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the file has a header but no feature rows.
    #[error("empty feature matrix (no feature rows) in {path}")]
    EmptyMatrix {
        /// Path to the matrix file.
        path: PathBuf,
    },

    /// Returned when a feature row has a different number of cells than the header.
    #[error("inconsistent row length in {path}: row {row_index} ({feature}) has {got} cells, expected {expected}")]
    InconsistentRowLength {
        /// Path to the matrix file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Name cell of the offending row.
        feature: String,
        /// Expected number of cells (from header).
        expected: usize,
        /// Actual number of cells in this row.
        got: usize,
    },

    /// Returned when a numeric feature cell is neither a number nor a missing marker.
    #[error("invalid numeric value in {path}: feature {feature}, case {case_index}, raw value \"{raw}\"")]
    InvalidNumber {
        /// Path to the matrix file.
        path: PathBuf,
        /// Name of the numeric feature.
        feature: String,
        /// Zero-based case index of the offending cell.
        case_index: usize,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when two features share a name.
    #[error("duplicate feature name \"{name}\"")]
    DuplicateFeature {
        /// The duplicated feature name.
        name: String,
    },

    /// Returned when a feature's length disagrees with the matrix case count.
    #[error("feature \"{name}\" has {got} cases, expected {expected}")]
    LengthMismatch {
        /// Name of the offending feature.
        name: String,
        /// Number of cases in the matrix.
        expected: usize,
        /// Number of cases in the feature.
        got: usize,
    },
}
