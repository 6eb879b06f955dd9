use std::path::PathBuf;

/// Errors from forest growth setup and output.
///
/// Every variant is fatal to the run: growth either starts from a fully
/// validated configuration or not at all.
#[derive(Debug, thiserror::Error)]
pub enum GrowError {
    /// Returned when tree_count is zero.
    #[error("tree_count must be at least 1, got {tree_count}")]
    InvalidTreeCount {
        /// The invalid tree count provided.
        tree_count: usize,
    },

    /// Returned when train_cores is zero.
    #[error("train_cores must be at least 1, got {train_cores}")]
    InvalidCoreCount {
        /// The invalid core count provided.
        train_cores: usize,
    },

    /// Returned when a count-or-fraction option cannot be parsed.
    #[error("invalid count or fraction \"{raw}\"")]
    InvalidQuantity {
        /// The raw option value.
        raw: String,
    },

    /// Returned when the gradient boosting learning rate is not in (0, 1].
    #[error("learning rate must be in (0.0, 1.0], got {learning_rate}")]
    InvalidLearningRate {
        /// The invalid learning rate.
        learning_rate: f64,
    },

    /// Returned when the target feature is absent from the training matrix.
    #[error("target \"{name}\" not found in training data")]
    TargetNotFound {
        /// Name of the requested target.
        name: String,
    },

    /// Returned when the target feature is absent from the test matrix.
    #[error("target \"{name}\" not found in test data")]
    TargetNotFoundInTest {
        /// Name of the requested target.
        name: String,
    },

    /// Returned when a feature named by an option is absent from the matrix.
    #[error("feature \"{name}\" not found in training data")]
    FeatureNotFound {
        /// Name of the missing feature.
        name: String,
    },

    /// Returned when an option needs a categorical feature but got a numeric one.
    #[error("feature \"{name}\" must be categorical for {purpose}")]
    NotCategorical {
        /// Name of the offending feature.
        name: String,
        /// The option that needed a categorical feature.
        purpose: &'static str,
    },

    /// Returned when an option needs a numeric target but got a categorical one.
    #[error("target \"{name}\" must be numeric for {purpose}")]
    NotNumeric {
        /// Name of the offending target.
        name: String,
        /// The option that needed a numeric target.
        purpose: &'static str,
    },

    /// Returned when two options cannot be combined.
    #[error("incompatible options: {reason}")]
    IncompatibleOptions {
        /// Human-readable description of the conflict.
        reason: String,
    },

    /// Returned when a feature filter pattern is not a valid regular expression.
    #[error("invalid feature pattern \"{pattern}\"")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// The underlying regex error.
        source: regex::Error,
    },

    /// Returned when a cost or class-weight map is not a JSON object of numbers.
    #[error("malformed category map")]
    InvalidCategoryMap {
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Returned when a cost or class weight is not a positive finite number.
    #[error("weight for category \"{category}\" must be positive and finite, got {value}")]
    InvalidCategoryWeight {
        /// The category label.
        category: String,
        /// The rejected value.
        value: f64,
    },

    /// Returned when filtering leaves no feature to split on.
    #[error("no candidate features remain after filtering")]
    NoCandidateFeatures,

    /// Returned when every case is missing the target value.
    #[error("target \"{name}\" has no non-missing cases")]
    NoNonMissingCases {
        /// Name of the target.
        name: String,
    },

    /// Returned when a forest file cannot be created or written.
    #[error("failed to write forest to {path}")]
    WriteForest {
        /// Path to the forest file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a tree cannot be encoded.
    #[error("failed to serialize tree {index}")]
    SerializeTree {
        /// Collection index of the tree.
        index: usize,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when a forest file cannot be read.
    #[error("failed to read forest from {path}")]
    ReadForest {
        /// Path to the forest file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a forest file cannot be decoded.
    #[error("failed to deserialize forest from {path}")]
    DeserializeForest {
        /// Path to the forest file.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when a forest file has an incompatible format version.
    #[error("incompatible forest version in {path}: expected {expected}, found {found}")]
    IncompatibleForestVersion {
        /// The format version this build expects.
        expected: u32,
        /// The format version found in the file.
        found: u32,
        /// Path to the forest file.
        path: PathBuf,
    },

    /// Returned when a report file cannot be written.
    #[error("failed to write report to {path}")]
    WriteReport {
        /// Path to the report file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
