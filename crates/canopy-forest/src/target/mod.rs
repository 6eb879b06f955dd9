//! Impurity objectives that drive tree induction.
//!
//! One induction algorithm serves every task: the tree asks a [`Target`]
//! for the impurity of case sets and for leaf predictions, and the target
//! decides what those mean. Variants that change the objective wrap a base
//! target and delegate everything they do not override, so
//! [`Target::feature`] always reports the column being predicted.
//!
//! Boosting variants also implement [`BoostingTarget`]. Their per-case
//! weights (or residuals) live behind a lock inside the target, and
//! [`BoostingTarget::boost`] holds the write side for the whole update, so
//! concurrent growth workers see one boosting round at a time.

mod boost;
mod categorical;
mod density;
mod numeric;

use std::fmt;

use canopy_data::{CatFeature, Feature};

pub use boost::{AdaBoostTarget, GradBoostTarget, NumAdaBoostTarget};
pub use categorical::{CatTarget, EntropyTarget, RegretTarget, WrfTarget};
pub use density::DensityTarget;
pub use numeric::{L1Target, NumObjective, NumTarget, OrdinalTarget};

/// Value a node predicts for the cases that reach it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Prediction {
    /// A category label (classification).
    Category(String),
    /// A real value (regression, boosting residual, density).
    Value(f64),
}

impl Prediction {
    pub(crate) fn from_code(feature: &CatFeature, code: Option<usize>) -> Self {
        Prediction::Category(code.map_or_else(|| "NA".to_string(), |c| feature.label_of(c).to_string()))
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Category(label) => f.write_str(label),
            Prediction::Value(v) => write!(f, "{v}"),
        }
    }
}

/// Per-category scratch counters for the groups of a candidate split.
///
/// Owned by one tree-growth call and reused across every split it scores.
#[derive(Debug, Default, Clone)]
pub struct SplitCounters {
    /// Counter for the left group.
    pub left: Vec<f64>,
    /// Counter for the right group.
    pub right: Vec<f64>,
    /// Counter for the missing-value group.
    pub missing: Vec<f64>,
}

/// An impurity objective over one predicted feature.
pub trait Target: Send + Sync {
    /// The predicted column, with its original values.
    fn feature(&self) -> &Feature;

    /// Impurity of `cases`. `counter` is scratch space the target may resize.
    fn impurity(&self, cases: &[usize], counter: &mut Vec<f64>) -> f64;

    /// Case-count-weighted mean of the child impurities.
    fn split_impurity(
        &self,
        left: &[usize],
        right: &[usize],
        missing: Option<&[usize]>,
        counters: &mut SplitCounters,
    ) -> f64 {
        weighted_split_impurity(self, left, right, missing, counters)
    }

    /// Split impurity after `moved_right_to_left` cases crossed from the
    /// right group to the left one. Targets with incremental statistics can
    /// override this; the default recomputes.
    fn update_split_impurity(
        &self,
        left: &[usize],
        right: &[usize],
        missing: Option<&[usize]>,
        counters: &mut SplitCounters,
        _moved_right_to_left: &[usize],
    ) -> f64 {
        self.split_impurity(left, right, missing, counters)
    }

    /// Prediction for a node holding `cases`.
    fn predicted(&self, cases: &[usize]) -> Prediction;

    /// Objective of a plain numeric target. Boosting wrappers score their
    /// weighted or residual values with it.
    fn numeric_objective(&self) -> Option<NumObjective> {
        None
    }

    /// Boosting view of this target, if it boosts.
    fn as_boosting(&self) -> Option<&dyn BoostingTarget> {
        None
    }
}

/// A target that reweights cases after each tree.
pub trait BoostingTarget: Target {
    /// Update the boosting state from a fitted tree's leaf partition and
    /// return the tree's ensemble weight.
    ///
    /// `+inf` means the tree fit the weighted data perfectly and growth
    /// should stop.
    fn boost(&self, leaves: &[Vec<usize>]) -> f64;
}

/// `(n_l·I_l + n_r·I_r + n_m·I_m) / (n_l + n_r + n_m)`, with the missing
/// group optional. Zero when every group is empty.
pub fn weighted_split_impurity<T: Target + ?Sized>(
    target: &T,
    left: &[usize],
    right: &[usize],
    missing: Option<&[usize]>,
    counters: &mut SplitCounters,
) -> f64 {
    let nl = left.len() as f64;
    let nr = right.len() as f64;
    let mut total = 0.0;
    if !left.is_empty() {
        total += nl * target.impurity(left, &mut counters.left);
    }
    if !right.is_empty() {
        total += nr * target.impurity(right, &mut counters.right);
    }
    let mut n = nl + nr;
    if let Some(m) = missing
        && !m.is_empty()
    {
        let nm = m.len() as f64;
        total += nm * target.impurity(m, &mut counters.missing);
        n += nm;
    }
    if n == 0.0 { 0.0 } else { total / n }
}
