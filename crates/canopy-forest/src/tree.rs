use std::collections::VecDeque;

use canopy_data::FeatureMatrix;
use rand::RngCore;
use tracing::trace;

use crate::node::{Branch, FeatureIndex, Node, NodeIndex, SplitCache};
use crate::running_mean::RunningMean;
use crate::split::{Candidate, InducerParams, SplitScratch, SplitSearch};
use crate::tally::VoteTally;
use crate::target::{Prediction, Target};

/// The splits one grown tree made, held until the tree is collected.
#[derive(Debug, Default, Clone)]
pub struct SplitLog {
    /// `(feature, impurity decrease)` for every split, in growth order.
    pub decreases: Vec<(usize, f64)>,
    /// Per-feature smallest depth used (root = 1), 0 if unused.
    pub depth_used: Vec<usize>,
}

impl SplitLog {
    fn reset(&mut self, n_features: usize) {
        self.decreases.clear();
        self.depth_used.clear();
        self.depth_used.resize(n_features, 0);
    }

    fn record(&mut self, feature: usize, decrease: f64, depth: usize) {
        self.decreases.push((feature, decrease));
        let used = &mut self.depth_used[feature];
        if *used == 0 || depth < *used {
            *used = depth;
        }
    }

    /// Fold this tree's decreases and smallest depths into the per-feature
    /// accumulators, then clear the log.
    pub fn commit(&mut self, importance: &[RunningMean], min_depth: &[RunningMean]) {
        for &(feature, decrease) in &self.decreases {
            importance[feature].add(decrease);
        }
        for (used, acc) in self.depth_used.iter_mut().zip(min_depth) {
            if *used > 0 {
                acc.add(*used as f64);
                *used = 0;
            }
        }
        self.decreases.clear();
    }
}

/// A decision tree stored as a `Vec<Node>` arena rooted at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Tree {
    pub(crate) target: String,
    pub(crate) weight: f64,
    pub(crate) nodes: Vec<Node>,
}

impl Tree {
    /// Create an empty tree predicting `target`, with ensemble weight 1.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            weight: 1.0,
            nodes: Vec::new(),
        }
    }

    /// Name of the predicted feature.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Ensemble vote weight.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Set the ensemble vote weight.
    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// The node arena.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Grow the tree in place on the (possibly repeated) training `cases`,
    /// replacing any previous structure.
    ///
    /// `oob` are the out-of-bag cases, used only when `params.eval_oob` is
    /// set. `candidates` are the matrix columns eligible for splitting.
    /// Every split is recorded in `log` when one is given.
    #[allow(clippy::too_many_arguments)]
    pub fn grow(
        &mut self,
        matrix: &FeatureMatrix,
        target: &dyn Target,
        cases: &[usize],
        oob: &[usize],
        candidates: &[usize],
        params: &InducerParams,
        mut log: Option<&mut SplitLog>,
        scratch: &mut SplitScratch,
        rng: &mut dyn RngCore,
    ) {
        self.nodes.clear();
        self.weight = 1.0;
        self.target = target.feature().name().to_string();
        if let Some(log) = log.as_deref_mut() {
            log.reset(matrix.n_features());
        }
        let mut inducer = Inducer {
            search: SplitSearch {
                matrix,
                target,
                params,
            },
            candidates,
            log,
            scratch,
            rng,
            nodes: std::mem::take(&mut self.nodes),
        };
        inducer.grow_node(cases.to_vec(), oob.to_vec(), 1);
        self.nodes = inducer.nodes;
        trace!(n_nodes = self.nodes.len(), "tree grown");
    }

    /// Route `case` from the root and return the node where it stops.
    fn stop_node(&self, matrix: &FeatureMatrix, case: usize) -> usize {
        let mut idx = 0usize;
        while let Some(next) = self.nodes[idx].next(matrix, case) {
            idx = next.index();
        }
        idx
    }

    /// Group every case of `matrix` by the node where it stops, in node
    /// order. Empty groups are omitted.
    #[must_use]
    pub fn partition(&self, matrix: &FeatureMatrix) -> Vec<Vec<usize>> {
        if self.nodes.is_empty() {
            return Vec::new();
        }
        let mut groups = vec![Vec::new(); self.nodes.len()];
        for case in 0..matrix.n_cases() {
            groups[self.stop_node(matrix, case)].push(case);
        }
        groups.retain(|g| !g.is_empty());
        groups
    }

    /// Prediction for one case of `matrix`.
    #[must_use]
    pub fn predict(&self, matrix: &FeatureMatrix, case: usize) -> Option<&Prediction> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(self.nodes[self.stop_node(matrix, case)].prediction())
    }

    /// Cast this tree's weighted vote for every case of `matrix`.
    pub fn vote(&self, matrix: &FeatureMatrix, tally: &dyn VoteTally) {
        for case in 0..matrix.n_cases() {
            if let Some(p) = self.predict(matrix, case) {
                tally.vote(case, p, self.weight);
            }
        }
    }

    /// Cast this tree's weighted vote for the given cases only.
    pub fn vote_cases(&self, matrix: &FeatureMatrix, tally: &dyn VoteTally, cases: &[usize]) {
        for &case in cases {
            if let Some(p) = self.predict(matrix, case) {
                tally.vote(case, p, self.weight);
            }
        }
    }

    /// Drop column positions and category codes resolved against the
    /// training matrix, so the tree routes by feature name and label.
    pub fn strip_codes(&mut self) {
        for node in &mut self.nodes {
            if let Node::Split { cache, .. } = node {
                *cache = SplitCache::default();
            }
        }
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree. A lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0usize;
        let mut queue = VecDeque::from([(0usize, 0usize)]);
        while let Some((idx, d)) = queue.pop_front() {
            max_depth = max_depth.max(d);
            if let Node::Split {
                left, right, missing, ..
            } = &self.nodes[idx]
            {
                queue.push_back((left.index(), d + 1));
                queue.push_back((right.index(), d + 1));
                if let Some(m) = missing {
                    queue.push_back((m.index(), d + 1));
                }
            }
        }
        max_depth
    }
}

struct Inducer<'a, 's> {
    search: SplitSearch<'a>,
    candidates: &'a [usize],
    log: Option<&'s mut SplitLog>,
    scratch: &'a mut SplitScratch,
    rng: &'a mut dyn RngCore,
    nodes: Vec<Node>,
}

impl Inducer<'_, '_> {
    fn push_leaf(&mut self, prediction: Prediction, n_cases: usize) -> NodeIndex {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            prediction,
            n_cases,
        });
        NodeIndex::new(idx)
    }

    fn grow_node(&mut self, cases: Vec<usize>, oob: Vec<usize>, depth: usize) -> NodeIndex {
        let target = self.search.target;
        let params = self.search.params;
        let n_cases = cases.len();
        let prediction = target.predicted(&cases);
        let impurity = target.impurity(&cases, &mut self.scratch.counters.left);

        if n_cases < 2 * params.leaf_size.max(1) || impurity == 0.0 {
            return self.push_leaf(prediction, n_cases);
        }
        let Some(mut candidate) =
            self.search
                .find_best_split(&cases, self.candidates, self.scratch, self.rng)
        else {
            return self.push_leaf(prediction, n_cases);
        };
        if params.eval_oob && !oob.is_empty() {
            match self.search.decrease_of(&candidate, &oob, self.scratch) {
                Some(d) if d > 0.0 => candidate.decrease = d,
                _ => return self.push_leaf(prediction, n_cases),
            }
        }

        let (left, right, missing) = self.route(&candidate, &cases);
        let (oob_left, oob_right, oob_missing) = self.route(&candidate, &oob);
        if let Some(log) = self.log.as_deref_mut() {
            log.record(candidate.feature, candidate.decrease, depth);
        }

        // Arena pattern: reserve index, recurse, then overwrite with the split.
        let node_idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            prediction: prediction.clone(),
            n_cases,
        });
        let left_idx = self.grow_node(left, oob_left, depth + 1);
        let right_idx = self.grow_node(right, oob_right, depth + 1);
        let missing_idx = (params.split_missing && !missing.is_empty())
            .then(|| self.grow_node(missing, oob_missing, depth + 1));

        let Candidate {
            feature,
            splitter,
            left_codes,
            decrease,
        } = candidate;
        self.nodes[node_idx] = Node::Split {
            feature: self.search.matrix.feature(feature).name().to_string(),
            splitter,
            left: left_idx,
            right: right_idx,
            missing: missing_idx,
            prediction,
            n_cases,
            impurity_decrease: decrease,
            cache: SplitCache {
                feature: Some(FeatureIndex::new(feature)),
                left_codes,
            },
        };
        NodeIndex::new(node_idx)
    }

    fn route(&self, candidate: &Candidate, cases: &[usize]) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        let feature = self.search.matrix.feature(candidate.feature);
        let (mut left, mut right, mut missing) = (Vec::new(), Vec::new(), Vec::new());
        for &c in cases {
            match candidate.splitter.branch(feature, c, candidate.left_codes.as_deref()) {
                Branch::Left => left.push(c),
                Branch::Right => right.push(c),
                Branch::Missing => missing.push(c),
            }
        }
        (left, right, missing)
    }
}
