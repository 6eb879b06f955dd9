use std::collections::BTreeSet;

use canopy_data::{CatFeature, Feature, FeatureMatrix, NumFeature};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::node::{Branch, Splitter};
use crate::target::{SplitCounters, Target};

/// Categorical features with at most this many observed categories at a
/// node are split by trying every bipartition.
pub const MAX_EXHAUSTIVE_CATS: usize = 10;

/// Policy flags for one tree's induction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InducerParams {
    /// Candidate features drawn per node.
    pub m_try: usize,
    /// Minimum cases on each side of a split.
    pub leaf_size: usize,
    /// Send cases missing the split feature to a third branch.
    pub split_missing: bool,
    /// Keep drawing candidates past `m_try` until one splits.
    pub force: bool,
    /// Subtract the best decrease found with the target permuted.
    pub vet: bool,
    /// Re-score the chosen split on the node's out-of-bag cases.
    pub eval_oob: bool,
}

/// Scratch buffers reused across every node of one tree, and across trees
/// grown by the same worker.
#[derive(Debug, Default)]
pub struct SplitScratch {
    pub(crate) counters: SplitCounters,
    left: Vec<usize>,
    right: Vec<usize>,
    missing: Vec<usize>,
    sorted: Vec<(f64, usize)>,
    ordered: Vec<usize>,
    order: Vec<usize>,
}

/// Best split found at a node.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) feature: usize,
    pub(crate) splitter: Splitter,
    pub(crate) left_codes: Option<Vec<bool>>,
    pub(crate) decrease: f64,
}

/// Search context for one node.
pub(crate) struct SplitSearch<'a> {
    pub(crate) matrix: &'a FeatureMatrix,
    pub(crate) target: &'a dyn Target,
    pub(crate) params: &'a InducerParams,
}

impl SplitSearch<'_> {
    /// Draw candidate features without replacement and keep the split with
    /// the largest positive impurity decrease.
    pub(crate) fn find_best_split(
        &self,
        cases: &[usize],
        candidates: &[usize],
        scratch: &mut SplitScratch,
        rng: &mut dyn RngCore,
    ) -> Option<Candidate> {
        let remap = if self.params.vet {
            Some(permuted_targets(self.matrix.n_cases(), cases, rng))
        } else {
            None
        };

        let mut order = std::mem::take(&mut scratch.order);
        order.clear();
        order.extend_from_slice(candidates);

        let mut best: Option<Candidate> = None;
        let mut tried = 0;
        for i in 0..order.len() {
            if tried >= self.params.m_try && (best.is_some() || !self.params.force) {
                break;
            }
            // Partial Fisher-Yates: position i gets a random undrawn feature.
            let j = rng.gen_range(i..order.len());
            order.swap(i, j);
            let feature = order[i];
            tried += 1;

            let Some((splitter, left_codes, mut decrease)) =
                self.best_for_feature(feature, cases, None, scratch, rng)
            else {
                continue;
            };
            if let Some(remap) = &remap
                && let Some((_, _, vetted)) =
                    self.best_for_feature(feature, cases, Some(remap.as_slice()), scratch, rng)
            {
                decrease -= vetted;
            }
            if decrease > 0.0 && best.as_ref().is_none_or(|b| decrease > b.decrease) {
                best = Some(Candidate {
                    feature,
                    splitter,
                    left_codes,
                    decrease,
                });
            }
        }
        scratch.order = order;
        best
    }

    /// Impurity decrease of an already chosen split over `cases`.
    ///
    /// `None` when too few of `cases` reach both sides.
    pub(crate) fn decrease_of(
        &self,
        candidate: &Candidate,
        cases: &[usize],
        scratch: &mut SplitScratch,
    ) -> Option<f64> {
        let feature = self.matrix.feature(candidate.feature);
        let (mut left, mut right, mut missing) = (Vec::new(), Vec::new(), Vec::new());
        for &c in cases {
            match candidate.splitter.branch(feature, c, candidate.left_codes.as_deref()) {
                Branch::Left => left.push(c),
                Branch::Right => right.push(c),
                Branch::Missing => missing.push(c),
            }
        }
        if left.is_empty() || right.is_empty() {
            return None;
        }
        Some(self.score(&left, &right, &missing, None, scratch))
    }

    fn best_for_feature(
        &self,
        feature: usize,
        cases: &[usize],
        remap: Option<&[usize]>,
        scratch: &mut SplitScratch,
        rng: &mut dyn RngCore,
    ) -> Option<(Splitter, Option<Vec<bool>>, f64)> {
        match self.matrix.feature(feature) {
            Feature::Numeric(num) => self
                .best_numeric(num, cases, remap, scratch)
                .map(|(s, d)| (s, None, d)),
            Feature::Categorical(cat) => self
                .best_categorical(cat, cases, remap, scratch, rng)
                .map(|(s, codes, d)| (s, Some(codes), d)),
        }
    }

    /// Parent impurity over the cases that take part, minus split impurity.
    fn score(
        &self,
        left: &[usize],
        right: &[usize],
        missing: &[usize],
        remap: Option<&[usize]>,
        scratch: &mut SplitScratch,
    ) -> f64 {
        let map = |cases: &[usize]| -> Vec<usize> {
            match remap {
                Some(r) => cases.iter().map(|&c| r[c]).collect(),
                None => cases.to_vec(),
            }
        };
        let (left, right) = (map(left), map(right));
        let missing = self.params.split_missing.then(|| map(missing));
        let mut parent: Vec<usize> = left.iter().chain(&right).copied().collect();
        if let Some(m) = &missing {
            parent.extend_from_slice(m);
        }
        let counters = &mut scratch.counters;
        let parent_impurity = self.target.impurity(&parent, &mut counters.left);
        parent_impurity
            - self
                .target
                .split_impurity(&left, &right, missing.as_deref(), counters)
    }

    /// Exhaustive threshold scan over the sorted distinct values.
    fn best_numeric(
        &self,
        num: &NumFeature,
        cases: &[usize],
        remap: Option<&[usize]>,
        scratch: &mut SplitScratch,
    ) -> Option<(Splitter, f64)> {
        let leaf_size = self.params.leaf_size.max(1);
        scratch.sorted.clear();
        scratch.missing.clear();
        for &c in cases {
            match num.get(c) {
                Some(v) => scratch.sorted.push((v, c)),
                None => scratch.missing.push(c),
            }
        }
        let n = scratch.sorted.len();
        if n < 2 * leaf_size {
            return None;
        }
        scratch.sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let map = |c: usize| remap.map_or(c, |r| r[c]);
        scratch.ordered.clear();
        scratch.ordered.extend(scratch.sorted.iter().map(|&(_, c)| map(c)));
        let missing: Vec<usize> = scratch.missing.iter().map(|&c| map(c)).collect();
        let missing = self.params.split_missing.then_some(missing.as_slice());

        let mut parent = scratch.ordered.clone();
        if let Some(m) = missing {
            parent.extend_from_slice(m);
        }
        let parent_impurity = self.target.impurity(&parent, &mut scratch.counters.left);

        let mut best: Option<(f64, f64)> = None;
        let mut prev: Option<usize> = None;
        for i in leaf_size..=(n - leaf_size) {
            if scratch.sorted[i - 1].0 == scratch.sorted[i].0 {
                continue;
            }
            let (left, right) = scratch.ordered.split_at(i);
            let impurity = match prev {
                None => self
                    .target
                    .split_impurity(left, right, missing, &mut scratch.counters),
                Some(p) => self.target.update_split_impurity(
                    left,
                    right,
                    missing,
                    &mut scratch.counters,
                    &scratch.ordered[p..i],
                ),
            };
            prev = Some(i);
            let decrease = parent_impurity - impurity;
            if best.is_none_or(|(_, d)| decrease > d) {
                best = Some((scratch.sorted[i - 1].0, decrease));
            }
        }
        best.map(|(threshold, decrease)| (Splitter::Numeric { threshold }, decrease))
    }

    /// Bipartition search over the categories present at the node.
    fn best_categorical(
        &self,
        cat: &CatFeature,
        cases: &[usize],
        remap: Option<&[usize]>,
        scratch: &mut SplitScratch,
        rng: &mut dyn RngCore,
    ) -> Option<(Splitter, Vec<bool>, f64)> {
        let leaf_size = self.params.leaf_size.max(1);
        let mut seen = vec![false; cat.n_cats()];
        let mut observed = Vec::new();
        for &c in cases {
            if let Some(code) = cat.code(c)
                && !seen[code]
            {
                seen[code] = true;
                observed.push(code);
            }
        }
        let k = observed.len();
        if k < 2 {
            return None;
        }

        let mut best: Option<(Vec<bool>, f64)> = None;
        for subset in bipartitions(k, rng) {
            let mut left_codes = vec![false; cat.n_cats()];
            for (&code, &goes_left) in observed.iter().zip(&subset) {
                left_codes[code] = goes_left;
            }
            scratch.left.clear();
            scratch.right.clear();
            scratch.missing.clear();
            for &c in cases {
                match cat.code(c) {
                    Some(code) if left_codes[code] => scratch.left.push(c),
                    Some(_) => scratch.right.push(c),
                    None => scratch.missing.push(c),
                }
            }
            if scratch.left.len() < leaf_size || scratch.right.len() < leaf_size {
                continue;
            }
            let (left, right, missing) = (
                std::mem::take(&mut scratch.left),
                std::mem::take(&mut scratch.right),
                std::mem::take(&mut scratch.missing),
            );
            let decrease = self.score(&left, &right, &missing, remap, scratch);
            scratch.left = left;
            scratch.right = right;
            scratch.missing = missing;
            if best.as_ref().is_none_or(|(_, d)| decrease > *d) {
                best = Some((left_codes, decrease));
            }
        }

        best.map(|(left_codes, decrease)| {
            let left: BTreeSet<String> = left_codes
                .iter()
                .enumerate()
                .filter(|&(_, &l)| l)
                .map(|(code, _)| cat.label_of(code).to_string())
                .collect();
            (Splitter::Categorical { left }, left_codes, decrease)
        })
    }
}

/// Non-trivial left/right assignments of `k` categories.
///
/// Every bipartition once (last category pinned right) when `k` is small;
/// otherwise one-vs-rest plus `k` random subsets.
fn bipartitions(k: usize, rng: &mut dyn RngCore) -> Vec<Vec<bool>> {
    if k <= MAX_EXHAUSTIVE_CATS {
        return (1u32..(1 << (k - 1)))
            .map(|mask| (0..k).map(|i| mask & (1 << i) != 0).collect())
            .collect();
    }
    let mut subsets: Vec<Vec<bool>> = (0..k)
        .map(|one| (0..k).map(|i| i == one).collect())
        .collect();
    while subsets.len() < 2 * k {
        let subset: Vec<bool> = (0..k).map(|_| rng.gen_bool(0.5)).collect();
        if subset.iter().any(|&b| b) && subset.iter().any(|&b| !b) {
            subsets.push(subset);
        }
    }
    subsets
}

/// Case-to-case map that shuffles target values among `cases` and leaves
/// every other case in place.
fn permuted_targets(n_cases: usize, cases: &[usize], rng: &mut dyn RngCore) -> Vec<usize> {
    let mut remap: Vec<usize> = (0..n_cases).collect();
    let mut shuffled = cases.to_vec();
    shuffled.shuffle(rng);
    for (&c, &s) in cases.iter().zip(&shuffled) {
        remap[c] = s;
    }
    remap
}

#[cfg(test)]
mod tests {
    use canopy_data::{CatFeature, NumFeature};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::target::{CatTarget, NumTarget};

    fn case_labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    fn params() -> InducerParams {
        InducerParams {
            m_try: 2,
            leaf_size: 1,
            split_missing: false,
            force: false,
            vet: false,
            eval_oob: false,
        }
    }

    fn matrix() -> FeatureMatrix {
        let x = Feature::Numeric(NumFeature::from_values(
            "N:x",
            &[Some(1.0), Some(2.0), Some(3.0), Some(10.0), Some(11.0), Some(12.0)],
        ));
        let c = Feature::Categorical(CatFeature::from_labels(
            "C:c",
            &[Some("u"), Some("v"), Some("u"), Some("w"), Some("v"), Some("w")],
        ));
        let y = Feature::Categorical(CatFeature::from_labels(
            "C:y",
            &[Some("a"), Some("a"), Some("a"), Some("b"), Some("b"), Some("b")],
        ));
        FeatureMatrix::new(vec![x, c, y], case_labels(6)).unwrap()
    }

    fn target(m: &FeatureMatrix) -> CatTarget {
        CatTarget::new(m.feature(2).as_categorical().unwrap().clone())
    }

    #[test]
    fn numeric_scan_finds_the_gap() {
        let m = matrix();
        let t = target(&m);
        let p = params();
        let search = SplitSearch { matrix: &m, target: &t, params: &p };
        let mut scratch = SplitScratch::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let best = search
            .find_best_split(&[0, 1, 2, 3, 4, 5], &[0, 1], &mut scratch, &mut rng)
            .unwrap();
        assert_eq!(best.feature, 0);
        assert_eq!(best.splitter, Splitter::Numeric { threshold: 3.0 });
        assert!((best.decrease - 0.5).abs() < 1e-12);
    }

    #[test]
    fn leaf_size_blocks_small_sides() {
        let m = matrix();
        let t = target(&m);
        let p = InducerParams { leaf_size: 4, ..params() };
        let search = SplitSearch { matrix: &m, target: &t, params: &p };
        let mut scratch = SplitScratch::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(search
            .find_best_split(&[0, 1, 2, 3, 4, 5], &[0, 1], &mut scratch, &mut rng)
            .is_none());
    }

    #[test]
    fn categorical_subsets_are_exhaustive_for_few_categories() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let subsets = bipartitions(3, &mut rng);
        assert_eq!(subsets.len(), 3);
        assert!(subsets.iter().all(|s| !s[2]));
    }

    #[test]
    fn many_categories_use_one_vs_rest_and_random() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let subsets = bipartitions(12, &mut rng);
        assert_eq!(subsets.len(), 24);
        assert!(subsets.iter().all(|s| s.iter().any(|&b| b) && s.iter().any(|&b| !b)));
    }

    #[test]
    fn categorical_split_on_regression_target() {
        let c = Feature::Categorical(CatFeature::from_labels(
            "C:c",
            &[Some("u"), Some("u"), Some("v"), Some("v")],
        ));
        let y = NumFeature::from_values("N:y", &[Some(0.0), Some(0.0), Some(5.0), Some(5.0)]);
        let m = FeatureMatrix::new(vec![c, Feature::Numeric(y.clone())], case_labels(4)).unwrap();
        let t = NumTarget::new(y);
        let p = params();
        let search = SplitSearch { matrix: &m, target: &t, params: &p };
        let mut scratch = SplitScratch::default();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let best = search
            .find_best_split(&[0, 1, 2, 3], &[0], &mut scratch, &mut rng)
            .unwrap();
        assert_eq!(
            best.splitter,
            Splitter::Categorical { left: BTreeSet::from(["u".to_string()]) }
        );
        assert!((best.decrease - 6.25).abs() < 1e-12);
    }

    #[test]
    fn permuted_targets_only_touch_node_cases() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let remap = permuted_targets(6, &[1, 2, 3], &mut rng);
        assert_eq!(remap[0], 0);
        assert_eq!(remap[4], 4);
        let mut moved: Vec<usize> = remap[1..4].to_vec();
        moved.sort_unstable();
        assert_eq!(moved, vec![1, 2, 3]);
    }

    #[test]
    fn decrease_of_rescoring() {
        let m = matrix();
        let t = target(&m);
        let p = params();
        let search = SplitSearch { matrix: &m, target: &t, params: &p };
        let mut scratch = SplitScratch::default();
        let cand = Candidate {
            feature: 0,
            splitter: Splitter::Numeric { threshold: 3.0 },
            left_codes: None,
            decrease: 0.5,
        };
        assert!((search.decrease_of(&cand, &[0, 3], &mut scratch).unwrap() - 0.5).abs() < 1e-12);
        assert!(search.decrease_of(&cand, &[0, 1], &mut scratch).is_none());
    }
}
