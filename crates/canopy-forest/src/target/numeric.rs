use std::collections::HashMap;

use canopy_data::{Feature, NumFeature};

use super::{Prediction, Target};

/// Mean of `values`, `None` when empty.
pub(crate) fn mean_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Most frequent of `values`; ties go to the first encountered.
fn mode_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in &values {
        *counts.entry(v.to_bits()).or_insert(0) += 1;
    }
    let max = counts.values().copied().max()?;
    values.into_iter().find(|v| counts[&v.to_bits()] == max)
}

/// How a numeric target scores and summarizes a set of values.
///
/// `value` maps a case to its value, `None` when missing, so boosting
/// wrappers can score residuals with the objective of the target they wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumObjective {
    /// Mean squared deviation from the mean.
    Squared,
    /// Mean absolute deviation from the mean.
    Absolute,
    /// Rate of values off the mode; the mode is the leaf value.
    Ordinal,
}

impl NumObjective {
    /// Leaf value of the non-missing values of `cases`.
    pub fn center(self, cases: &[usize], value: impl Fn(usize) -> Option<f64>) -> Option<f64> {
        let values = cases.iter().filter_map(|&c| value(c));
        match self {
            NumObjective::Squared | NumObjective::Absolute => mean_of(values),
            NumObjective::Ordinal => mode_of(values),
        }
    }

    /// Impurity of the non-missing values of `cases`. Zero when there are none.
    pub fn impurity(self, cases: &[usize], value: impl Fn(usize) -> Option<f64>) -> f64 {
        let Some(center) = self.center(cases, &value) else {
            return 0.0;
        };
        let values = cases.iter().filter_map(|&c| value(c));
        match self {
            NumObjective::Squared => mean_of(values.map(|v| (v - center).powi(2))),
            NumObjective::Absolute => mean_of(values.map(|v| (v - center).abs())),
            NumObjective::Ordinal => mean_of(values.map(|v| if v == center { 0.0 } else { 1.0 })),
        }
        .unwrap_or(0.0)
    }
}

/// Regression: impurity is the mean squared deviation from the mean.
#[derive(Debug, Clone)]
pub struct NumTarget {
    feature: Feature,
}

impl NumTarget {
    /// Wrap a numeric feature.
    #[must_use]
    pub fn new(feature: NumFeature) -> Self {
        Self {
            feature: Feature::Numeric(feature),
        }
    }

    /// The numeric column.
    #[must_use]
    pub fn numeric(&self) -> &NumFeature {
        let Feature::Numeric(num) = &self.feature else {
            unreachable!("NumTarget is only built from a numeric feature")
        };
        num
    }
}

impl Target for NumTarget {
    fn feature(&self) -> &Feature {
        &self.feature
    }

    fn impurity(&self, cases: &[usize], _counter: &mut Vec<f64>) -> f64 {
        let num = self.numeric();
        NumObjective::Squared.impurity(cases, |c| num.get(c))
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        Prediction::Value(self.numeric().mean(cases).unwrap_or(f64::NAN))
    }

    fn numeric_objective(&self) -> Option<NumObjective> {
        Some(NumObjective::Squared)
    }
}

/// Regression scored by mean absolute deviation from the mean.
#[derive(Debug, Clone)]
pub struct L1Target {
    base: NumTarget,
}

impl L1Target {
    #[must_use]
    pub fn new(base: NumTarget) -> Self {
        Self { base }
    }
}

impl Target for L1Target {
    fn feature(&self) -> &Feature {
        self.base.feature()
    }

    fn impurity(&self, cases: &[usize], _counter: &mut Vec<f64>) -> f64 {
        let num = self.base.numeric();
        NumObjective::Absolute.impurity(cases, |c| num.get(c))
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        self.base.predicted(cases)
    }

    fn numeric_objective(&self) -> Option<NumObjective> {
        Some(NumObjective::Absolute)
    }
}

/// Ordinal regression: numeric labels treated as ranked classes. Predicts
/// the modal value and scores the rate of cases off the mode.
#[derive(Debug, Clone)]
pub struct OrdinalTarget {
    base: NumTarget,
}

impl OrdinalTarget {
    #[must_use]
    pub fn new(base: NumTarget) -> Self {
        Self { base }
    }
}

impl Target for OrdinalTarget {
    fn feature(&self) -> &Feature {
        self.base.feature()
    }

    fn impurity(&self, cases: &[usize], _counter: &mut Vec<f64>) -> f64 {
        let num = self.base.numeric();
        NumObjective::Ordinal.impurity(cases, |c| num.get(c))
    }

    fn predicted(&self, cases: &[usize]) -> Prediction {
        let num = self.base.numeric();
        Prediction::Value(
            NumObjective::Ordinal
                .center(cases, |c| num.get(c))
                .unwrap_or(f64::NAN),
        )
    }

    fn numeric_objective(&self) -> Option<NumObjective> {
        Some(NumObjective::Ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(values: &[Option<f64>]) -> NumTarget {
        NumTarget::new(NumFeature::from_values("N:y", values))
    }

    #[test]
    fn mean_squared_deviation() {
        let t = target(&[Some(1.0), Some(3.0), None]);
        let mut counter = Vec::new();
        assert!((t.impurity(&[0, 1, 2], &mut counter) - 1.0).abs() < 1e-12);
        assert_eq!(t.predicted(&[0, 1, 2]), Prediction::Value(2.0));
        assert_eq!(t.impurity(&[2], &mut counter), 0.0);
    }

    #[test]
    fn l1_mean_absolute_deviation() {
        let t = L1Target::new(target(&[Some(0.0), Some(0.0), Some(6.0)]));
        let mut counter = Vec::new();
        // mean 2; deviations 2, 2, 4.
        assert!((t.impurity(&[0, 1, 2], &mut counter) - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn ordinal_predicts_mode() {
        let t = OrdinalTarget::new(target(&[Some(2.0), Some(3.0), Some(2.0), Some(1.0)]));
        let mut counter = Vec::new();
        let all = [0, 1, 2, 3];
        assert_eq!(t.predicted(&all), Prediction::Value(2.0));
        assert!((t.impurity(&all, &mut counter) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn objectives_read_through_the_accessor() {
        let values = [Some(1.0), None, Some(1.0), Some(4.0)];
        let value = |c: usize| values[c];
        let all = [0, 1, 2, 3];
        assert_eq!(NumObjective::Squared.center(&all, value), Some(2.0));
        assert_eq!(NumObjective::Ordinal.center(&all, value), Some(1.0));
        // deviations from 2: 1, 1, 2.
        assert!((NumObjective::Squared.impurity(&all, value) - 2.0).abs() < 1e-12);
        assert!((NumObjective::Absolute.impurity(&all, value) - 4.0 / 3.0).abs() < 1e-12);
        assert!((NumObjective::Ordinal.impurity(&all, value) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(NumObjective::Absolute.impurity(&[1], value), 0.0);
    }
}
