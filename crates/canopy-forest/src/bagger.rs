//! Case sampling strategies for per-tree training sets.
//!
//! Every sampler appends exactly `n` case indices to the caller's buffer
//! and never yields a case whose target value is missing. The caller clears
//! the buffer between trees.

use canopy_data::{CatFeature, Feature};
use rand::{Rng, RngCore};

/// Draws the training cases for one tree.
pub trait Bagger: Send + Sync {
    /// Append `n` case indices to `cases`.
    fn sample(&self, cases: &mut Vec<usize>, n: usize, rng: &mut dyn RngCore);
}

/// Indices of the cases whose value in `feature` is present.
#[must_use]
pub fn non_missing_cases(feature: &Feature) -> Vec<usize> {
    (0..feature.len()).filter(|&c| !feature.is_missing(c)).collect()
}

/// Split `n` evenly over `k` groups; the first `n % k` groups get one more.
fn quotas(n: usize, k: usize) -> impl Iterator<Item = usize> {
    let (base, rem) = if k == 0 { (0, 0) } else { (n / k, n % k) };
    (0..k).map(move |i| base + usize::from(i < rem))
}

fn draw_from(pool: &[usize], count: usize, cases: &mut Vec<usize>, rng: &mut dyn RngCore) {
    if pool.is_empty() {
        return;
    }
    cases.extend((0..count).map(|_| pool[rng.gen_range(0..pool.len())]));
}

/// Uniform bootstrap with replacement over the non-missing cases.
#[derive(Debug, Clone)]
pub struct BootstrapSampler {
    pool: Vec<usize>,
}

impl BootstrapSampler {
    #[must_use]
    pub fn new(target: &Feature) -> Self {
        Self {
            pool: non_missing_cases(target),
        }
    }
}

impl Bagger for BootstrapSampler {
    fn sample(&self, cases: &mut Vec<usize>, n: usize, rng: &mut dyn RngCore) {
        draw_from(&self.pool, n, cases, rng);
    }
}

/// Bootstrap with an equal quota per observed target category.
#[derive(Debug, Clone)]
pub struct BalancedSampler {
    groups: Vec<Vec<usize>>,
}

impl BalancedSampler {
    #[must_use]
    pub fn new(target: &CatFeature) -> Self {
        let mut groups = vec![Vec::new(); target.n_cats()];
        for case in 0..target.len() {
            if let Some(code) = target.code(case) {
                groups[code].push(case);
            }
        }
        groups.retain(|g| !g.is_empty());
        Self { groups }
    }
}

impl Bagger for BalancedSampler {
    fn sample(&self, cases: &mut Vec<usize>, n: usize, rng: &mut dyn RngCore) {
        for (group, quota) in self.groups.iter().zip(quotas(n, self.groups.len())) {
            draw_from(group, quota, cases, rng);
        }
    }
}

/// Two-level stratified bootstrap: equal quota per target category, then
/// equal share of that quota per secondary category seen with it.
///
/// Cases missing either value are never drawn.
#[derive(Debug, Clone)]
pub struct SecondaryBalancedSampler {
    cells: Vec<Vec<Vec<usize>>>,
}

impl SecondaryBalancedSampler {
    #[must_use]
    pub fn new(target: &CatFeature, secondary: &CatFeature) -> Self {
        let mut cells = vec![vec![Vec::new(); secondary.n_cats()]; target.n_cats()];
        for case in 0..target.len() {
            if let (Some(t), Some(s)) = (target.code(case), secondary.code(case)) {
                cells[t][s].push(case);
            }
        }
        for row in &mut cells {
            row.retain(|cell| !cell.is_empty());
        }
        cells.retain(|row| !row.is_empty());
        Self { cells }
    }
}

impl Bagger for SecondaryBalancedSampler {
    fn sample(&self, cases: &mut Vec<usize>, n: usize, rng: &mut dyn RngCore) {
        for (row, quota) in self.cells.iter().zip(quotas(n, self.cells.len())) {
            for (cell, share) in row.iter().zip(quotas(quota, row.len())) {
                draw_from(cell, share, cases, rng);
            }
        }
    }
}

/// Deterministic sampler: the first `n` non-missing cases in index order.
#[derive(Debug, Clone)]
pub struct NoBagSampler {
    pool: Vec<usize>,
}

impl NoBagSampler {
    #[must_use]
    pub fn new(target: &Feature) -> Self {
        Self {
            pool: non_missing_cases(target),
        }
    }
}

impl Bagger for NoBagSampler {
    fn sample(&self, cases: &mut Vec<usize>, n: usize, _rng: &mut dyn RngCore) {
        cases.extend(self.pool.iter().take(n));
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn labels(values: &[Option<&str>]) -> CatFeature {
        CatFeature::from_labels("C:t", values)
    }

    #[test]
    fn bootstrap_skips_missing() {
        let target = Feature::Categorical(labels(&[Some("a"), None, Some("b"), None, Some("a")]));
        let bagger = BootstrapSampler::new(&target);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut cases = Vec::new();
        bagger.sample(&mut cases, 200, &mut rng);
        assert_eq!(cases.len(), 200);
        assert!(cases.iter().all(|&c| !target.is_missing(c)));
    }

    #[test]
    fn balanced_quota_with_remainder() {
        // a is common, b and c are rare.
        let target = labels(&[
            Some("a"), Some("a"), Some("a"), Some("a"), Some("a"),
            Some("b"), Some("c"), None,
        ]);
        let bagger = BalancedSampler::new(&target);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut cases = Vec::new();
        bagger.sample(&mut cases, 10, &mut rng);
        assert_eq!(cases.len(), 10);
        let count = |code: usize| cases.iter().filter(|&&c| target.code(c) == Some(code)).count();
        // 10 over 3 categories: 4, 3, 3.
        assert_eq!((count(0), count(1), count(2)), (4, 3, 3));
    }

    #[test]
    fn secondary_balanced_covers_every_cell() {
        let target = labels(&[Some("a"), Some("a"), Some("b"), Some("b"), Some("b")]);
        let secondary = CatFeature::from_labels(
            "C:site",
            &[Some("x"), Some("y"), Some("x"), Some("x"), None],
        );
        let bagger = SecondaryBalancedSampler::new(&target, &secondary);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut cases = Vec::new();
        bagger.sample(&mut cases, 8, &mut rng);
        assert_eq!(cases.len(), 8);
        assert!(!cases.contains(&4));
        // a gets 4: 2 from (a,x) and 2 from (a,y).
        assert_eq!(cases.iter().filter(|&&c| c == 0).count(), 2);
        assert_eq!(cases.iter().filter(|&&c| c == 1).count(), 2);
    }

    #[test]
    fn no_bag_takes_prefix() {
        let target = Feature::Categorical(labels(&[None, Some("a"), Some("b"), Some("c")]));
        let bagger = NoBagSampler::new(&target);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut cases = Vec::new();
        bagger.sample(&mut cases, 2, &mut rng);
        assert_eq!(cases, vec![1, 2]);
    }

    #[test]
    fn sample_appends() {
        let target = Feature::Categorical(labels(&[Some("a"), Some("b")]));
        let bagger = NoBagSampler::new(&target);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut cases = vec![7];
        bagger.sample(&mut cases, 2, &mut rng);
        assert_eq!(cases, vec![7, 0, 1]);
    }
}
