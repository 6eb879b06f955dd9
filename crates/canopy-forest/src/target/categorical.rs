use std::collections::HashMap;

use canopy_data::{CatFeature, Feature};

use super::{Prediction, Target};
use crate::GrowError;

/// Sum per-category weights of the non-missing `cases` into `counter`.
///
/// Returns the total weight counted.
pub(crate) fn count_codes(
    feature: &CatFeature,
    cases: &[usize],
    counter: &mut Vec<f64>,
    weight: impl Fn(usize, usize) -> f64,
) -> f64 {
    counter.clear();
    counter.resize(feature.n_cats(), 0.0);
    let mut total = 0.0;
    for &case in cases {
        if let Some(code) = feature.code(case) {
            let w = weight(case, code);
            counter[code] += w;
            total += w;
        }
    }
    total
}

/// Category with the largest count; ties go to the first met in `cases`.
pub(crate) fn mode_from_counts(feature: &CatFeature, cases: &[usize], counts: &[f64]) -> Option<usize> {
    let max = counts.iter().copied().fold(0.0, f64::max);
    if max <= 0.0 {
        return None;
    }
    cases
        .iter()
        .filter_map(|&case| feature.code(case))
        .find(|&code| counts[code] == max)
}

/// Validate a label-to-weight map and expand it to one weight per code.
///
/// Labels absent from the map weigh 1.
pub(crate) fn weights_by_code(
    feature: &CatFeature,
    map: &HashMap<String, f64>,
) -> Result<Vec<f64>, GrowError> {
    for (category, &value) in map {
        if !(value.is_finite() && value > 0.0) {
            return Err(GrowError::InvalidCategoryWeight {
                category: category.clone(),
                value,
            });
        }
    }
    Ok(feature
        .labels()
        .iter()
        .map(|label| map.get(label).copied().unwrap_or(1.0))
        .collect())
}

/// Plain classification: impurity is the misclassification rate against
/// the unweighted mode.
#[derive(Debug, Clone)]
pub struct CatTarget {
    feature: Feature,
}

impl CatTarget {
    /// Wrap a categorical feature.
    #[must_use]
    pub fn new(feature: CatFeature) -> Self {
        Self {
            feature: Feature::Categorical(feature),
        }
    }

    /// The categorical column.
    #[must_use]
    pub fn categorical(&self) -> &CatFeature {
        let Feature::Categorical(cat) = &self.feature else {
            unreachable!("CatTarget is only built from a categorical feature")
        };
        cat
    }
}

impl Target for CatTarget {
    fn feature(&self) -> &Feature {
        &self.feature
    }

    fn impurity(&self, cases: &[usize], counter: &mut Vec<f64>) -> f64 {
        let cat = self.categorical();
        let total = count_codes(cat, cases, counter, |_, _| 1.0);
        match mode_from_counts(cat, cases, counter) {
            Some(mode) => (total - counter[mode]) / total,
            None => 0.0,
        }
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        let cat = self.categorical();
        Prediction::from_code(cat, cat.mode(cases))
    }
}

/// Classification scored by Shannon entropy of the category distribution.
#[derive(Debug, Clone)]
pub struct EntropyTarget {
    base: CatTarget,
}

impl EntropyTarget {
    #[must_use]
    pub fn new(base: CatTarget) -> Self {
        Self { base }
    }
}

impl Target for EntropyTarget {
    fn feature(&self) -> &Feature {
        self.base.feature()
    }

    fn impurity(&self, cases: &[usize], counter: &mut Vec<f64>) -> f64 {
        let total = count_codes(self.base.categorical(), cases, counter, |_, _| 1.0);
        if total == 0.0 {
            return 0.0;
        }
        counter
            .iter()
            .filter(|&&n| n > 0.0)
            .map(|&n| {
                let p = n / total;
                -p * p.ln()
            })
            .sum()
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        self.base.predicted(cases)
    }
}

/// Cost-sensitive classification. Each misclassified case contributes the
/// cost of its true category instead of 1.
#[derive(Debug, Clone)]
pub struct RegretTarget {
    base: CatTarget,
    costs: Vec<f64>,
}

impl RegretTarget {
    /// Build from a label-to-cost map. Categories without a cost weigh 1.
    ///
    /// # Errors
    ///
    /// Returns [`GrowError::InvalidCategoryWeight`] for a cost that is not
    /// positive and finite.
    pub fn new(base: CatTarget, costs: &HashMap<String, f64>) -> Result<Self, GrowError> {
        let costs = weights_by_code(base.categorical(), costs)?;
        Ok(Self { base, costs })
    }
}

impl Target for RegretTarget {
    fn feature(&self) -> &Feature {
        self.base.feature()
    }

    fn impurity(&self, cases: &[usize], counter: &mut Vec<f64>) -> f64 {
        let cat = self.base.categorical();
        let total = count_codes(cat, cases, counter, |_, _| 1.0);
        let Some(mode) = mode_from_counts(cat, cases, counter) else {
            return 0.0;
        };
        let regret: f64 = counter
            .iter()
            .enumerate()
            .filter(|&(code, _)| code != mode)
            .map(|(code, &n)| n * self.costs[code])
            .sum();
        regret / total
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        self.base.predicted(cases)
    }
}

/// Weighted random forest: class weights scale both the mode and the
/// misclassification rate.
#[derive(Debug, Clone)]
pub struct WrfTarget {
    base: CatTarget,
    weights: Vec<f64>,
}

impl WrfTarget {
    /// Build from a label-to-weight map. Categories without a weight weigh 1.
    ///
    /// # Errors
    ///
    /// Returns [`GrowError::InvalidCategoryWeight`] for a weight that is not
    /// positive and finite.
    pub fn new(base: CatTarget, weights: &HashMap<String, f64>) -> Result<Self, GrowError> {
        let weights = weights_by_code(base.categorical(), weights)?;
        Ok(Self { base, weights })
    }

    fn weighted_mode(&self, cases: &[usize], counter: &mut Vec<f64>) -> (Option<usize>, f64) {
        let cat = self.base.categorical();
        let total = count_codes(cat, cases, counter, |_, code| self.weights[code]);
        (mode_from_counts(cat, cases, counter), total)
    }
}

impl Target for WrfTarget {
    fn feature(&self) -> &Feature {
        self.base.feature()
    }

    fn impurity(&self, cases: &[usize], counter: &mut Vec<f64>) -> f64 {
        match self.weighted_mode(cases, counter) {
            (Some(mode), total) => (total - counter[mode]) / total,
            (None, _) => 0.0,
        }
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        let mut counter = Vec::new();
        let (mode, _) = self.weighted_mode(cases, &mut counter);
        Prediction::from_code(self.base.categorical(), mode)
    }
}
