//! Per-case vote accumulation for OOB and held-out evaluation.

use canopy_data::Feature;
use parking_lot::Mutex;

use crate::target::Prediction;

/// Thread-safe per-case vote store.
///
/// Workers vote concurrently; each case has its own lock.
pub trait VoteTally: Send + Sync {
    /// Record one tree's prediction for `case` with the tree's weight.
    fn vote(&self, case: usize, prediction: &Prediction, weight: f64);

    /// Aggregated prediction for `case`, `None` when it has no votes.
    fn tally(&self, case: usize) -> Option<Prediction>;

    /// Error of the tallied predictions against `target`, over the cases
    /// that have both votes and a target value. NaN when there are none.
    fn tally_error(&self, target: &Feature) -> f64;
}

/// Weighted plurality vote over category labels.
#[derive(Debug)]
pub struct CatBallotBox {
    boxes: Vec<Mutex<Vec<(String, f64)>>>,
}

impl CatBallotBox {
    #[must_use]
    pub fn new(n_cases: usize) -> Self {
        Self {
            boxes: (0..n_cases).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Fraction of voted, non-missing cases whose tally matches `target`.
    #[must_use]
    pub fn fraction_correct(&self, target: &Feature) -> f64 {
        1.0 - self.tally_error(target)
    }
}

impl VoteTally for CatBallotBox {
    fn vote(&self, case: usize, prediction: &Prediction, weight: f64) {
        let label = prediction.to_string();
        let mut ballots = self.boxes[case].lock();
        match ballots.iter_mut().find(|(l, _)| *l == label) {
            Some((_, total)) => *total += weight,
            None => ballots.push((label, weight)),
        }
    }

    fn tally(&self, case: usize) -> Option<Prediction> {
        let ballots = self.boxes[case].lock();
        let mut best: Option<&(String, f64)> = None;
        for ballot in ballots.iter() {
            if best.is_none_or(|b| ballot.1 > b.1) {
                best = Some(ballot);
            }
        }
        best.map(|(label, _)| Prediction::Category(label.clone()))
    }

    fn tally_error(&self, target: &Feature) -> f64 {
        let (wrong, n) = (0..self.boxes.len())
            .filter_map(|c| Some((target.label(c)?, self.tally(c)?)))
            .fold((0usize, 0usize), |(wrong, n), (truth, voted)| {
                let hit = matches!(voted, Prediction::Category(ref l) if *l == truth);
                (wrong + usize::from(!hit), n + 1)
            });
        if n == 0 { f64::NAN } else { wrong as f64 / n as f64 }
    }
}

/// How numeric votes combine into one prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// Weighted mean of the votes.
    Mean,
    /// `offset + Σ weight · vote`, for gradient boosted ensembles.
    Sum {
        /// Starting prediction before any tree.
        offset: f64,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct NumVotes {
    weighted_sum: f64,
    total_weight: f64,
    count: usize,
}

/// Numeric vote store.
#[derive(Debug)]
pub struct NumBallotBox {
    boxes: Vec<Mutex<NumVotes>>,
    aggregation: Aggregation,
}

impl NumBallotBox {
    #[must_use]
    pub fn new(n_cases: usize, aggregation: Aggregation) -> Self {
        Self {
            boxes: (0..n_cases).map(|_| Mutex::new(NumVotes::default())).collect(),
            aggregation,
        }
    }
}

impl VoteTally for NumBallotBox {
    fn vote(&self, case: usize, prediction: &Prediction, weight: f64) {
        let Prediction::Value(v) = *prediction else {
            return;
        };
        if !v.is_finite() {
            return;
        }
        let mut votes = self.boxes[case].lock();
        votes.weighted_sum += weight * v;
        votes.total_weight += weight;
        votes.count += 1;
    }

    fn tally(&self, case: usize) -> Option<Prediction> {
        let votes = *self.boxes[case].lock();
        if votes.count == 0 {
            return None;
        }
        match self.aggregation {
            Aggregation::Mean if votes.total_weight > 0.0 => {
                Some(Prediction::Value(votes.weighted_sum / votes.total_weight))
            }
            Aggregation::Mean => None,
            Aggregation::Sum { offset } => Some(Prediction::Value(offset + votes.weighted_sum)),
        }
    }

    fn tally_error(&self, target: &Feature) -> f64 {
        let Some(num) = target.as_numeric() else {
            return f64::NAN;
        };
        let (sq, n) = (0..self.boxes.len())
            .filter_map(|c| match (num.get(c), self.tally(c)) {
                (Some(truth), Some(Prediction::Value(v))) => Some((v - truth).powi(2)),
                _ => None,
            })
            .fold((0.0, 0usize), |(sq, n), e| (sq + e, n + 1));
        if n == 0 { f64::NAN } else { sq / n as f64 }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use canopy_data::{CatFeature, NumFeature};

    use super::*;

    fn cat(label: &str) -> Prediction {
        Prediction::Category(label.to_string())
    }

    #[test]
    fn plurality_with_first_voted_tie_break() {
        let tally = CatBallotBox::new(2);
        tally.vote(0, &cat("b"), 1.0);
        tally.vote(0, &cat("a"), 1.0);
        assert_eq!(tally.tally(0), Some(cat("b")));
        tally.vote(0, &cat("a"), 0.5);
        assert_eq!(tally.tally(0), Some(cat("a")));
        assert_eq!(tally.tally(1), None);
    }

    #[test]
    fn categorical_error_skips_unvoted_and_missing() {
        let target = Feature::Categorical(CatFeature::from_labels(
            "C:t",
            &[Some("a"), Some("b"), None, Some("a")],
        ));
        let tally = CatBallotBox::new(4);
        tally.vote(0, &cat("a"), 1.0);
        tally.vote(1, &cat("a"), 1.0);
        tally.vote(2, &cat("a"), 1.0);
        assert!((tally.tally_error(&target) - 0.5).abs() < 1e-12);
        assert!((tally.fraction_correct(&target) - 0.5).abs() < 1e-12);
        assert!(CatBallotBox::new(4).tally_error(&target).is_nan());
    }

    #[test]
    fn numeric_mean_and_mse() {
        let target = Feature::Numeric(NumFeature::from_values("N:y", &[Some(1.0), Some(4.0)]));
        let tally = NumBallotBox::new(2, Aggregation::Mean);
        tally.vote(0, &Prediction::Value(0.0), 1.0);
        tally.vote(0, &Prediction::Value(2.0), 1.0);
        tally.vote(1, &Prediction::Value(2.0), 1.0);
        assert_eq!(tally.tally(0), Some(Prediction::Value(1.0)));
        // errors 0 and 4.
        assert!((tally.tally_error(&target) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn gradient_sum_adds_offset() {
        let tally = NumBallotBox::new(1, Aggregation::Sum { offset: 10.0 });
        tally.vote(0, &Prediction::Value(2.0), 0.5);
        tally.vote(0, &Prediction::Value(-4.0), 0.5);
        assert_eq!(tally.tally(0), Some(Prediction::Value(9.0)));
    }

    #[test]
    fn concurrent_votes_are_counted() {
        let tally = NumBallotBox::new(1, Aggregation::Sum { offset: 0.0 });
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..250 {
                        tally.vote(0, &Prediction::Value(1.0), 1.0);
                    }
                });
            }
        });
        assert_eq!(tally.tally(0), Some(Prediction::Value(1000.0)));
    }
}
