use std::path::PathBuf;

use crate::kernel::KernelError;
use crate::series::SeriesKind;

/// Errors from Proximity Forest operations.
///
/// Variants fall into four groups: invariant violations that abort a run,
/// configuration errors raised before any training work starts, failures of
/// collaborators (distance kernels, initial imputers), and model persistence.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    // --- Invariant violations ---
    /// Returned when training or testing receives a dataset with no instances.
    #[error("dataset has zero instances")]
    EmptyDataset,

    /// Returned when a node receives no in-bag instances during training.
    #[error("possible bug: empty node found at depth {depth} in tree {tree}")]
    EmptyNode {
        /// Tree being trained.
        tree: usize,
        /// Depth of the empty node.
        depth: usize,
    },

    /// Returned when a non-empty sample yields no class partitions.
    #[error("class split of a sample of {size} instances produced no partitions")]
    EmptySplit {
        /// Number of instances in the sample.
        size: usize,
    },

    /// Returned when parallel arrays disagree in length.
    #[error("{what} has length {got}, expected {expected}")]
    LengthMismatch {
        /// Which array was inconsistent.
        what: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        got: usize,
    },

    /// Returned when a training instance carries no label.
    #[error("training instance {index} has no label")]
    UnlabeledInstance {
        /// Position of the offending instance.
        index: usize,
    },

    /// Returned when a regression run meets a non-numeric label.
    #[error("instance {index} has non-numeric label {label} in a regression run")]
    NonNumericLabel {
        /// Position of the offending instance.
        index: usize,
        /// The label as displayed.
        label: String,
    },

    /// Returned when training or routing meets a slot that is still NaN or
    /// missing.
    #[error("instance {index} has {count} unfilled values; impute before training or testing")]
    MissingValues {
        /// Position of the first offending instance.
        index: usize,
        /// Unfilled slots in that instance.
        count: usize,
    },

    /// Returned when a predicted class code has no original label.
    #[error("class code {code} is not in the label mapping")]
    UnknownClassCode {
        /// The unmapped code.
        code: i64,
    },

    // --- Configuration ---
    /// Returned when num_trees is zero.
    #[error("num_trees must be at least 1, got {num_trees}")]
    InvalidTreeCount {
        /// The invalid value.
        num_trees: usize,
    },

    /// Returned when num_candidates_per_split is zero.
    #[error("num_candidates_per_split must be at least 1, got {candidates}")]
    InvalidCandidateCount {
        /// The invalid value.
        candidates: usize,
    },

    /// Returned when num_imputes is zero.
    #[error("num_imputes must be at least 1, got {rounds}")]
    InvalidImputeRounds {
        /// The invalid value.
        rounds: usize,
    },

    /// Returned when a threshold or epsilon is negative or not finite.
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidThreshold {
        /// Which parameter was rejected.
        name: &'static str,
        /// The invalid value.
        value: f64,
    },

    /// Returned for an unrecognised purity measure name.
    #[error("unknown purity measure {name:?} (expected gini, entropy, variance or mad)")]
    UnknownPurity {
        /// The name provided.
        name: String,
    },

    /// Returned for an unrecognised voting rule name.
    #[error("unknown voting rule {name:?} (expected mean or median)")]
    UnknownVoting {
        /// The name provided.
        name: String,
    },

    /// Returned for a distance name that no registry entry matches.
    #[error("unknown distance measure {name:?}")]
    UnknownMeasure {
        /// The name provided.
        name: String,
    },

    /// Returned for an unrecognised initial imputer name.
    #[error("unknown initial imputer {name:?}")]
    UnknownImputer {
        /// The name provided.
        name: String,
    },

    /// Returned when the purity measure does not fit the task.
    #[error("purity measure {purity} cannot be used for {task}")]
    PurityTaskMismatch {
        /// The configured purity measure.
        purity: String,
        /// The configured task.
        task: String,
    },

    /// Returned when the candidate measure list is empty.
    #[error("at least one distance measure must be enabled")]
    EmptyMeasurePool,

    /// Returned when explicitly named measures cannot compare the dataset's
    /// series.
    #[error("distance measures {names:?} cannot compare {kind} series")]
    UnsupportedMeasures {
        /// Kind of series that was rejected.
        kind: SeriesKind,
        /// The offending measure names.
        names: Vec<String>,
    },

    /// Returned when a kernel name is registered twice.
    #[error("distance measure {name:?} is already registered")]
    DuplicateMeasure {
        /// The clashing name.
        name: String,
    },

    // --- Collaborators ---
    /// Returned when a distance kernel fails.
    #[error("distance kernel {kernel} failed")]
    Kernel {
        /// Registry name of the kernel.
        kernel: String,
        /// The kernel's error.
        source: KernelError,
    },

    /// Returned when an initial imputer cannot handle the dataset.
    #[error("imputer {imputer} failed: {reason}")]
    Imputer {
        /// Name of the imputer.
        imputer: String,
        /// Human-readable cause.
        reason: String,
    },

    // --- Persistence ---
    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file.
        path: PathBuf,
    },
}
