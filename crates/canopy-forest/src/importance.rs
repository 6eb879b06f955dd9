//! Per-feature split importance and minimal depth.

use crate::running_mean::RunningMean;

/// One feature's importance summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FeatureImportance {
    /// Feature name.
    pub name: String,
    /// Mean impurity decrease over the splits on this feature.
    pub mean_decrease: f64,
    /// Number of splits on this feature, across all trees.
    pub count: usize,
    /// `mean_decrease · count / n_trees`.
    pub per_tree: f64,
    /// `mean_decrease · count / trees_used`; 0 when never used.
    pub per_tree_used: f64,
    /// Number of trees that split on this feature at least once.
    pub trees_used: usize,
    /// Mean of the smallest depth (root = 1) at which a tree used it.
    pub mean_min_depth: f64,
}

/// Summarize the accumulators, one row per feature in column order.
///
/// `n_trees` is the number of trees actually collected.
pub(crate) fn importance_rows<'a>(
    names: impl IntoIterator<Item = &'a str>,
    decrease: &[RunningMean],
    min_depth: &[RunningMean],
    n_trees: usize,
) -> Vec<FeatureImportance> {
    names
        .into_iter()
        .zip(decrease.iter().zip(min_depth))
        .map(|(name, (dec, depth))| {
            let (mean, count) = dec.read();
            let (mean_min_depth, trees_used) = depth.read();
            let total = mean * count as f64;
            FeatureImportance {
                name: name.to_string(),
                mean_decrease: mean,
                count,
                per_tree: if n_trees > 0 { total / n_trees as f64 } else { 0.0 },
                per_tree_used: if trees_used > 0 {
                    total / trees_used as f64
                } else {
                    0.0
                },
                trees_used,
                mean_min_depth,
            }
        })
        .collect()
}
