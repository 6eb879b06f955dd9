use std::fmt;

use canopy_data::{Feature, NumFeature};
use parking_lot::RwLock;
use tracing::debug;

use super::categorical::{count_codes, mode_from_counts};
use super::{BoostingTarget, CatTarget, NumObjective, Prediction, Target};
use crate::error::GrowError;

/// AdaBoost tree weight for weighted error `e`.
///
/// `None` means the round is skipped (`e >= 0.5`); `e == 0` gives `+inf`.
fn ada_weight(e: f64) -> Option<f64> {
    if e >= 0.5 {
        None
    } else if e == 0.0 {
        Some(f64::INFINITY)
    } else {
        Some(0.5 * ((1.0 - e) / e).ln())
    }
}

fn normalize(weights: &mut [f64]) {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter_mut().for_each(|w| *w /= total);
    }
}

/// Categorical AdaBoost.
///
/// Impurity of a case set is the summed weight of the cases whose category
/// differs from the set's unweighted mode. Weights start uniform at
/// `1 / n_cases` and sum to 1 after every applied round.
#[derive(Debug)]
pub struct AdaBoostTarget {
    base: CatTarget,
    weights: RwLock<Vec<f64>>,
}

impl AdaBoostTarget {
    #[must_use]
    pub fn new(base: CatTarget) -> Self {
        let n = base.categorical().len();
        Self {
            base,
            weights: RwLock::new(vec![1.0 / n as f64; n]),
        }
    }

    /// Snapshot of the current case weights.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        self.weights.read().clone()
    }

    fn misclassified_weight(&self, weights: &[f64], cases: &[usize], counter: &mut Vec<f64>) -> f64 {
        let cat = self.base.categorical();
        count_codes(cat, cases, counter, |_, _| 1.0);
        let Some(mode) = mode_from_counts(cat, cases, counter) else {
            return 0.0;
        };
        cases
            .iter()
            .filter(|&&c| cat.code(c).is_some_and(|code| code != mode))
            .map(|&c| weights[c])
            .sum()
    }
}

impl Target for AdaBoostTarget {
    fn feature(&self) -> &Feature {
        self.base.feature()
    }

    fn impurity(&self, cases: &[usize], counter: &mut Vec<f64>) -> f64 {
        let weights = self.weights.read();
        self.misclassified_weight(&weights, cases, counter)
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        self.base.predicted(cases)
    }

    fn as_boosting(&self) -> Option<&dyn BoostingTarget> {
        Some(self)
    }
}

impl BoostingTarget for AdaBoostTarget {
    fn boost(&self, leaves: &[Vec<usize>]) -> f64 {
        let mut weights = self.weights.write();
        let mut counter = Vec::new();
        let e: f64 = leaves
            .iter()
            .map(|leaf| self.misclassified_weight(&weights, leaf, &mut counter))
            .sum();
        let Some(w) = ada_weight(e) else {
            debug!(error = e, "boosting round skipped");
            return 0.0;
        };
        if w.is_infinite() {
            return w;
        }

        let cat = self.base.categorical();
        let (up, down) = (w.exp(), (-w).exp());
        for leaf in leaves {
            count_codes(cat, leaf, &mut counter, |_, _| 1.0);
            let Some(mode) = mode_from_counts(cat, leaf, &counter) else {
                continue;
            };
            for &c in leaf {
                if let Some(code) = cat.code(c) {
                    weights[c] *= if code == mode { down } else { up };
                }
            }
        }
        normalize(&mut weights);
        debug!(error = e, weight = w, "boosting round applied");
        w
    }
}

fn numeric_base(base: &dyn Target, purpose: &'static str) -> Result<NumObjective, GrowError> {
    match (base.feature(), base.numeric_objective()) {
        (Feature::Numeric(_), Some(objective)) => Ok(objective),
        _ => Err(GrowError::NotNumeric {
            name: base.feature().name().to_string(),
            purpose,
        }),
    }
}

fn numeric_column(base: &dyn Target) -> &NumFeature {
    let Feature::Numeric(num) = base.feature() else {
        unreachable!("numeric boosting wrappers are only built over numeric targets")
    };
    num
}

/// Numeric AdaBoost with the linear loss `|y - leaf value| / range(y)`.
///
/// The leaf value comes from the wrapped target's objective: the mean for
/// squared and absolute error, the mode for ordinal regression.
pub struct NumAdaBoostTarget {
    base: Box<dyn Target>,
    objective: NumObjective,
    range: f64,
    weights: RwLock<Vec<f64>>,
}

impl fmt::Debug for NumAdaBoostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumAdaBoostTarget")
            .field("target", &self.base.feature().name())
            .field("objective", &self.objective)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl NumAdaBoostTarget {
    /// Wrap a numeric target.
    ///
    /// # Errors
    ///
    /// [`GrowError::NotNumeric`] when `base` is not a plain numeric target.
    pub fn new(base: Box<dyn Target>) -> Result<Self, GrowError> {
        let objective = numeric_base(base.as_ref(), "numeric adaptive boosting")?;
        let num = numeric_column(base.as_ref());
        let n = num.len();
        let all: Vec<usize> = (0..n).collect();
        let range = num.span(&all).map_or(0.0, |(lo, hi)| hi - lo);
        Ok(Self {
            base,
            objective,
            range,
            weights: RwLock::new(vec![1.0 / n as f64; n]),
        })
    }

    /// Snapshot of the current case weights.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        self.weights.read().clone()
    }

    fn loss(&self, value: f64, center: f64) -> f64 {
        if self.range > 0.0 {
            ((value - center).abs() / self.range).min(1.0)
        } else {
            0.0
        }
    }

    fn weighted_loss(&self, weights: &[f64], cases: &[usize]) -> f64 {
        let num = numeric_column(self.base.as_ref());
        let Some(center) = self.objective.center(cases, |c| num.get(c)) else {
            return 0.0;
        };
        cases
            .iter()
            .filter_map(|&c| num.get(c).map(|v| weights[c] * self.loss(v, center)))
            .sum()
    }
}

impl Target for NumAdaBoostTarget {
    fn feature(&self) -> &Feature {
        self.base.feature()
    }

    fn impurity(&self, cases: &[usize], _counter: &mut Vec<f64>) -> f64 {
        let weights = self.weights.read();
        self.weighted_loss(&weights, cases)
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        self.base.predicted(cases)
    }

    fn as_boosting(&self) -> Option<&dyn BoostingTarget> {
        Some(self)
    }
}

impl BoostingTarget for NumAdaBoostTarget {
    fn boost(&self, leaves: &[Vec<usize>]) -> f64 {
        let mut weights = self.weights.write();
        let e: f64 = leaves.iter().map(|leaf| self.weighted_loss(&weights, leaf)).sum();
        let Some(w) = ada_weight(e) else {
            debug!(error = e, "boosting round skipped");
            return 0.0;
        };
        if w.is_infinite() {
            return w;
        }

        let num = numeric_column(self.base.as_ref());
        for leaf in leaves {
            let Some(center) = self.objective.center(leaf, |c| num.get(c)) else {
                continue;
            };
            for &c in leaf {
                if let Some(v) = num.get(c) {
                    weights[c] *= (w * (2.0 * self.loss(v, center) - 1.0)).exp();
                }
            }
        }
        normalize(&mut weights);
        debug!(error = e, weight = w, "boosting round applied");
        w
    }
}

/// Gradient boosting over the residuals of a numeric target.
///
/// Trees are fit to the current residuals, scored with the wrapped
/// target's objective. Each round shrinks the residuals of every leaf by
/// `learning_rate` times the leaf's residual value. [`Target::feature`]
/// still reports the original target column.
pub struct GradBoostTarget {
    base: Box<dyn Target>,
    objective: NumObjective,
    learning_rate: f64,
    offset: f64,
    residuals: RwLock<Vec<f64>>,
}

impl fmt::Debug for GradBoostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradBoostTarget")
            .field("target", &self.base.feature().name())
            .field("objective", &self.objective)
            .field("learning_rate", &self.learning_rate)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl GradBoostTarget {
    /// Wrap a numeric target. Residuals start at `y - mean(y)`.
    ///
    /// # Errors
    ///
    /// [`GrowError::NotNumeric`] when `base` is not a plain numeric target.
    pub fn new(base: Box<dyn Target>, learning_rate: f64) -> Result<Self, GrowError> {
        let objective = numeric_base(base.as_ref(), "gradient boosting")?;
        let num = numeric_column(base.as_ref());
        let all: Vec<usize> = (0..num.len()).collect();
        let offset = num.mean(&all).unwrap_or(0.0);
        let residuals = (0..num.len())
            .map(|c| num.get(c).map_or(0.0, |v| v - offset))
            .collect();
        Ok(Self {
            base,
            objective,
            learning_rate,
            offset,
            residuals: RwLock::new(residuals),
        })
    }

    /// Mean of the target; the ensemble's starting prediction.
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Snapshot of the current residuals.
    #[must_use]
    pub fn residuals(&self) -> Vec<f64> {
        self.residuals.read().clone()
    }

    fn leaf_residual(&self, residuals: &[f64], cases: &[usize]) -> Option<f64> {
        let num = numeric_column(self.base.as_ref());
        self.objective
            .center(cases, |c| (!num.is_missing(c)).then(|| residuals[c]))
    }
}

impl Target for GradBoostTarget {
    fn feature(&self) -> &Feature {
        self.base.feature()
    }

    fn impurity(&self, cases: &[usize], _counter: &mut Vec<f64>) -> f64 {
        let residuals = self.residuals.read();
        let num = numeric_column(self.base.as_ref());
        self.objective
            .impurity(cases, |c| (!num.is_missing(c)).then(|| residuals[c]))
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        let residuals = self.residuals.read();
        Prediction::Value(self.leaf_residual(&residuals, cases).unwrap_or(0.0))
    }

    fn as_boosting(&self) -> Option<&dyn BoostingTarget> {
        Some(self)
    }
}

impl BoostingTarget for GradBoostTarget {
    fn boost(&self, leaves: &[Vec<usize>]) -> f64 {
        let mut residuals = self.residuals.write();
        let num = numeric_column(self.base.as_ref());
        for leaf in leaves {
            let Some(value) = self.leaf_residual(&residuals, leaf) else {
                continue;
            };
            let step = self.learning_rate * value;
            for &c in leaf {
                if !num.is_missing(c) {
                    residuals[c] -= step;
                }
            }
        }
        self.learning_rate
    }
}
