use std::collections::HashSet;

use canopy_data::Feature;

use super::{Prediction, Target};

/// Density estimation tree (Ram & Gray).
///
/// A node holding `n` of the `N` cases a tree is grown on, in a box of
/// volume `V`, has loss `-n² / (N² · V)` and density `n / (N · V)`. The box is measured
/// over every feature the target was built with: numeric spans, or the
/// number of categories present. Degenerate dimensions count as 1.
#[derive(Debug, Clone)]
pub struct DensityTarget {
    target: Feature,
    features: Vec<Feature>,
    n_total: usize,
}

impl DensityTarget {
    /// Build over `features`, with `target` reported as the predicted
    /// column, for trees grown on `n_samples` cases.
    #[must_use]
    pub fn new(target: Feature, features: Vec<Feature>, n_samples: usize) -> Self {
        let n_total = n_samples.max(1);
        Self {
            target,
            features,
            n_total,
        }
    }

    fn volume(&self, cases: &[usize]) -> f64 {
        self.features
            .iter()
            .map(|f| {
                let extent = match f {
                    Feature::Numeric(num) => num.span(cases).map_or(0.0, |(lo, hi)| hi - lo),
                    Feature::Categorical(cat) => cases
                        .iter()
                        .filter_map(|&c| cat.code(c))
                        .collect::<HashSet<_>>()
                        .len() as f64,
                };
                if extent > 0.0 { extent } else { 1.0 }
            })
            .product()
    }
}

impl Target for DensityTarget {
    fn feature(&self) -> &Feature {
        &self.target
    }

    fn impurity(&self, cases: &[usize], _counter: &mut Vec<f64>) -> f64 {
        let n = cases.len() as f64;
        let total = self.n_total as f64;
        -(n * n) / (total * total * self.volume(cases))
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        let n = cases.len() as f64;
        Prediction::Value(n / (self.n_total as f64 * self.volume(cases)))
    }
}
