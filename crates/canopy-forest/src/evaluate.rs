//! Whole-forest evaluation against a matrix with known target values.

use canopy_data::{Feature, FeatureMatrix};
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::error::GrowError;
use crate::result::Evaluation;
use crate::tally::{Aggregation, CatBallotBox, NumBallotBox, VoteTally};
use crate::tree::Tree;

fn cast_votes(trees: &[Tree], matrix: &FeatureMatrix, tally: &dyn VoteTally) {
    trees
        .par_iter()
        .filter(|tree| tree.weight() != 0.0)
        .for_each(|tree| tree.vote(matrix, tally));
}

fn n_scored(tally: &dyn VoteTally, target: &Feature) -> usize {
    (0..target.len())
        .filter(|&case| !target.is_missing(case) && tally.tally(case).is_some())
        .count()
}

/// Vote every tree on every case of `matrix` and score the tally against
/// its `target` column.
///
/// Set `held_out` when `matrix` is not the matrix the trees were grown on;
/// the trees then route by feature name and category label.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`GrowError::TargetNotFound`] | `target` absent from the training matrix |
/// | [`GrowError::TargetNotFoundInTest`] | `target` absent from a held-out matrix |
#[instrument(skip_all, fields(target = %target, n_trees = trees.len(), held_out = held_out))]
pub fn evaluate(
    trees: &[Tree],
    matrix: &FeatureMatrix,
    target: &str,
    aggregation: Aggregation,
    held_out: bool,
) -> Result<Evaluation, GrowError> {
    let index = matrix.feature_index(target).ok_or_else(|| {
        let name = target.to_string();
        if held_out {
            GrowError::TargetNotFoundInTest { name }
        } else {
            GrowError::TargetNotFound { name }
        }
    })?;
    let feature = matrix.feature(index);

    let stripped: Vec<Tree> = if held_out {
        trees
            .iter()
            .map(|tree| {
                let mut tree = tree.clone();
                tree.strip_codes();
                tree
            })
            .collect()
    } else {
        Vec::new()
    };
    let trees = if held_out { stripped.as_slice() } else { trees };

    let evaluation = match feature {
        Feature::Categorical(_) => {
            let tally = CatBallotBox::new(matrix.n_cases());
            cast_votes(trees, matrix, &tally);
            Evaluation {
                error: tally.tally_error(feature),
                fraction_correct: Some(tally.fraction_correct(feature)),
                n_cases: n_scored(&tally, feature),
            }
        }
        Feature::Numeric(_) => {
            let tally = NumBallotBox::new(matrix.n_cases(), aggregation);
            cast_votes(trees, matrix, &tally);
            Evaluation {
                error: tally.tally_error(feature),
                fraction_correct: None,
                n_cases: n_scored(&tally, feature),
            }
        }
    };
    info!(
        error = evaluation.error,
        n_cases = evaluation.n_cases,
        "forest evaluated"
    );
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use canopy_data::{CatFeature, NumFeature};

    use super::*;
    use crate::node::Node;
    use crate::target::Prediction;

    fn constant_tree(target: &str, prediction: Prediction, weight: f64) -> Tree {
        let mut tree = Tree::new(target);
        tree.nodes.push(Node::Leaf {
            prediction,
            n_cases: 1,
        });
        tree.set_weight(weight);
        tree
    }

    fn cat_matrix() -> FeatureMatrix {
        let y = CatFeature::from_labels("C:y", &[Some("a"), Some("a"), Some("b"), None]);
        let labels = (0..4).map(|i| format!("c{i}")).collect();
        FeatureMatrix::new(vec![Feature::Categorical(y)], labels).unwrap()
    }

    #[test]
    fn categorical_scoring_skips_missing_and_zero_weight() {
        let trees = vec![
            constant_tree("C:y", Prediction::Category("a".into()), 1.0),
            constant_tree("C:y", Prediction::Category("b".into()), 0.0),
        ];
        let eval = evaluate(&trees, &cat_matrix(), "C:y", Aggregation::Mean, false).unwrap();
        assert_eq!(eval.n_cases, 3);
        assert!((eval.error - 1.0 / 3.0).abs() < 1e-12);
        assert!((eval.fraction_correct.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn numeric_scoring_uses_aggregation() {
        let y = NumFeature::from_values("N:y", &[Some(5.0), Some(7.0)]);
        let m = FeatureMatrix::new(
            vec![Feature::Numeric(y)],
            vec!["c0".into(), "c1".into()],
        )
        .unwrap();
        let trees = vec![constant_tree("N:y", Prediction::Value(1.0), 0.5)];
        let eval = evaluate(&trees, &m, "N:y", Aggregation::Sum { offset: 5.0 }, true).unwrap();
        // Both cases tally 5.5: squared errors 0.25 and 2.25.
        assert!((eval.error - 1.25).abs() < 1e-12);
        assert_eq!(eval.fraction_correct, None);
    }

    #[test]
    fn missing_target_reported_by_origin() {
        let m = cat_matrix();
        assert!(matches!(
            evaluate(&[], &m, "C:z", Aggregation::Mean, true),
            Err(GrowError::TargetNotFoundInTest { .. })
        ));
        assert!(matches!(
            evaluate(&[], &m, "C:z", Aggregation::Mean, false),
            Err(GrowError::TargetNotFound { .. })
        ));
    }
}
