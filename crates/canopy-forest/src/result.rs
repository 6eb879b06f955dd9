//! Growth result types.

use std::time::Duration;

use crate::importance::FeatureImportance;
use crate::tree::Tree;

/// Out-of-bag prediction for one training case.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CaseOob {
    /// Case label from the matrix header.
    pub case: String,
    /// Tallied OOB prediction.
    pub predicted: String,
    /// True target value, `NA` when missing.
    pub actual: String,
}

/// Held-out or self-test evaluation of the finished forest.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Evaluation {
    /// Tally error: misclassification rate or mean squared error.
    pub error: f64,
    /// Fraction classified correctly (categorical targets only).
    pub fraction_correct: Option<f64>,
    /// Cases that received a prediction and have a target value.
    pub n_cases: usize,
}

/// Run settings resolved against the data.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GrowMetadata {
    /// Target feature name.
    pub target: String,
    /// Trees requested.
    pub tree_count: usize,
    /// Worker threads actually used.
    pub train_cores: usize,
    /// Candidate features per split.
    pub m_try: usize,
    /// Minimum leaf size.
    pub leaf_size: usize,
    /// Cases drawn per tree.
    pub sample_size: usize,
    /// Features eligible for splitting.
    pub n_candidates: usize,
    /// Cases with a target value.
    pub n_non_missing: usize,
}

/// Result of a growth run.
#[derive(Debug)]
pub struct GrowReport {
    pub(crate) metadata: GrowMetadata,
    pub(crate) trees_collected: usize,
    pub(crate) converged: bool,
    pub(crate) oob_error: Option<f64>,
    pub(crate) evaluation: Option<Evaluation>,
    pub(crate) importance: Vec<FeatureImportance>,
    pub(crate) case_oob: Vec<CaseOob>,
    pub(crate) trees: Vec<Tree>,
    pub(crate) elapsed: Duration,
}

impl GrowReport {
    /// Resolved run settings.
    #[must_use]
    pub fn metadata(&self) -> &GrowMetadata {
        &self.metadata
    }

    /// Number of trees handed to the writer.
    #[must_use]
    pub fn trees_collected(&self) -> usize {
        self.trees_collected
    }

    /// `true` when boosting stopped early on a perfect tree.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Final out-of-bag error, when tracked.
    #[must_use]
    pub fn oob_error(&self) -> Option<f64> {
        self.oob_error
    }

    /// Held-out or self-test evaluation, when requested.
    #[must_use]
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    /// Importance rows, empty unless importance was requested.
    #[must_use]
    pub fn importance(&self) -> &[FeatureImportance] {
        &self.importance
    }

    /// Per-case OOB predictions, empty unless requested.
    #[must_use]
    pub fn case_oob(&self) -> &[CaseOob] {
        &self.case_oob
    }

    /// Trees retained for evaluation, empty when none was requested.
    #[must_use]
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Wall-clock growth time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
