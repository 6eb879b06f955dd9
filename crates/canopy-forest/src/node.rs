use std::collections::BTreeSet;
use std::fmt;

use canopy_data::{Feature, FeatureMatrix};

use crate::target::Prediction;

/// Zero-based column position in a [`FeatureMatrix`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based column position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena, identifying a specific node in a tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which child a case is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Left,
    Right,
    /// The case lacks a usable value for the split feature.
    Missing,
}

/// Decision rule of a split node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Splitter {
    /// Values `<= threshold` go left.
    Numeric {
        threshold: f64,
    },
    /// Labels in `left` go left, every other label goes right.
    Categorical {
        left: BTreeSet<String>,
    },
}

impl Splitter {
    /// Route `case` of `feature`. `left_codes`, when given, is the
    /// categorical rule precomputed against this feature's code table.
    #[must_use]
    pub fn branch(&self, feature: &Feature, case: usize, left_codes: Option<&[bool]>) -> Branch {
        match (self, feature) {
            (Splitter::Numeric { threshold }, Feature::Numeric(num)) => match num.get(case) {
                Some(v) if v <= *threshold => Branch::Left,
                Some(_) => Branch::Right,
                None => Branch::Missing,
            },
            (Splitter::Categorical { left }, Feature::Categorical(cat)) => {
                let goes_left = match (left_codes, cat.code(case)) {
                    (_, None) => return Branch::Missing,
                    (Some(codes), Some(code)) => codes[code],
                    (None, Some(code)) => left.contains(cat.label_of(code)),
                };
                if goes_left { Branch::Left } else { Branch::Right }
            }
            _ => Branch::Missing,
        }
    }
}

/// Column position and category rule resolved against the training matrix.
///
/// Dropped by [`crate::Tree::strip_codes`] before applying a tree to
/// another matrix, and never serialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitCache {
    pub(crate) feature: Option<FeatureIndex>,
    pub(crate) left_codes: Option<Vec<bool>>,
}

/// A node in a tree arena.
///
/// Children are referenced by [`NodeIndex`]. Every node carries the
/// prediction for the cases that reach it, since cases missing the split
/// feature stop at a split node unless it has a missing-value branch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// Name of the feature used for the split.
        feature: String,
        /// The decision rule.
        splitter: Splitter,
        /// Index of the left child node.
        left: NodeIndex,
        /// Index of the right child node.
        right: NodeIndex,
        /// Child for cases missing the split feature, if grown.
        missing: Option<NodeIndex>,
        /// Prediction for cases that stop here.
        prediction: Prediction,
        /// Number of training cases that reached this node.
        n_cases: usize,
        /// Impurity decrease achieved by this split.
        impurity_decrease: f64,
        #[serde(skip)]
        cache: SplitCache,
    },
    /// A terminal leaf node.
    Leaf {
        /// Prediction for cases in this leaf.
        prediction: Prediction,
        /// Number of training cases in this leaf.
        n_cases: usize,
    },
}

impl Node {
    /// Return the prediction carried by this node.
    #[must_use]
    pub fn prediction(&self) -> &Prediction {
        match self {
            Node::Split { prediction, .. } | Node::Leaf { prediction, .. } => prediction,
        }
    }

    /// Return the number of training cases that reached this node.
    #[must_use]
    pub fn n_cases(&self) -> usize {
        match self {
            Node::Split { n_cases, .. } | Node::Leaf { n_cases, .. } => *n_cases,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Child reached by `case`, or `None` when the case stops here.
    pub(crate) fn next(&self, matrix: &FeatureMatrix, case: usize) -> Option<NodeIndex> {
        let Node::Split {
            feature,
            splitter,
            left,
            right,
            missing,
            cache,
            ..
        } = self
        else {
            return None;
        };
        let column = match cache.feature {
            Some(fi) => fi.index(),
            None => matrix.feature_index(feature)?,
        };
        match splitter.branch(matrix.feature(column), case, cache.left_codes.as_deref()) {
            Branch::Left => Some(*left),
            Branch::Right => Some(*right),
            Branch::Missing => *missing,
        }
    }
}
