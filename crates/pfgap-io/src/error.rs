//! I/O error types for pfgap-io.

use std::path::PathBuf;

use pfgap_forest::ForestError;

/// Errors from file I/O, delimited parsing, and result serialization.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the file contains zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the file.
        path: PathBuf,
    },

    /// Returned when a row holds a label but no values.
    #[error("row {row_index} of {path} has no values")]
    EmptyRow {
        /// Path to the file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
    },

    /// Returned when a numeric cell is neither a float nor a missing token.
    #[error("invalid value in {path}: row {row_index}, column {col_index}, raw value \"{raw}\"")]
    InvalidValue {
        /// Path to the file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Zero-based column index (excluding the label column).
        col_index: usize,
        /// The raw token.
        raw: String,
    },

    /// Returned when a cell parses to an infinite value.
    #[error("non-finite value in {path}: row {row_index}, column {col_index}, raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Zero-based column index (excluding the label column).
        col_index: usize,
        /// The raw token.
        raw: String,
    },

    /// Returned when a label cell is empty.
    #[error("missing label in {path} at row {row_index}")]
    MissingLabel {
        /// Path to the file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
    },

    /// Returned when a label file and a data file disagree in row count.
    #[error("label file {path} has {got} labels, expected {expected}")]
    LabelCountMismatch {
        /// Path to the label file.
        path: PathBuf,
        /// Rows in the data file.
        expected: usize,
        /// Labels in the label file.
        got: usize,
    },

    /// Returned when the parsed rows cannot form a dataset.
    #[error("cannot build dataset from {path}")]
    Dataset {
        /// Path to the data file.
        path: PathBuf,
        /// Underlying forest error.
        source: ForestError,
    },

    /// Returned when the experiment name contains characters outside `[a-zA-Z0-9_-]`.
    #[error("invalid experiment name \"{name}\": must match [a-zA-Z0-9_-]+")]
    InvalidExperimentName {
        /// The invalid name.
        name: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a result file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a delimited result file cannot be written.
    #[error("cannot write delimited file {path}")]
    WriteCsv {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when an artifact cannot be encoded as JSON.
    #[error("cannot encode {path} as JSON")]
    Json {
        /// Path of the artifact.
        path: PathBuf,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },
}
