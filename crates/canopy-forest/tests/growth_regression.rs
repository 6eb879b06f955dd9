//! Growth regression tests for canopy-forest.
//!
//! These tests grow whole forests on deterministic synthetic matrices and
//! check the orchestrator contract: tree quota, boosting convergence,
//! out-of-bag and held-out accuracy, and forest file round trips.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use canopy_data::{CatFeature, Feature, FeatureMatrix, NumFeature};
use canopy_forest::{
    Aggregation, Balance, Boosting, ForestFileWriter, ForestWriter, GrowConfig, MissingPolicy,
    Quantity, Tree, evaluate, read_forest,
};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic matrices
// ---------------------------------------------------------------------------

/// 3-class matrix: `N:f0`..`N:f2` are informative (class · 3 + noise in
/// [0, 0.5]), `N:f3`..`N:f7` are noise, every 20th `N:f0` value is missing.
fn make_classification(n_cases: usize, seed: u64) -> FeatureMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let classes = ["a", "b", "c"];
    let labels: Vec<Option<&str>> = (0..n_cases).map(|i| Some(classes[i % 3])).collect();

    let mut features = Vec::new();
    for f in 0..8 {
        let values: Vec<Option<f64>> = (0..n_cases)
            .map(|i| {
                if f == 0 && i % 20 == 19 {
                    return None;
                }
                let base = if f < 3 { (i % 3) as f64 * 3.0 } else { 0.0 };
                Some(base + rng.r#gen::<f64>() * 0.5)
            })
            .collect();
        features.push(Feature::Numeric(NumFeature::from_values(
            format!("N:f{f}"),
            &values,
        )));
    }
    features.push(Feature::Categorical(CatFeature::from_labels("C:class", &labels)));
    let case_labels = (0..n_cases).map(|i| format!("case{i}")).collect();
    FeatureMatrix::new(features, case_labels).unwrap()
}

/// `N:x = i`, `N:flat = 0`, `C:y` is `a` below the midpoint and `b` above,
/// `N:y = x` for regression.
fn make_separable(n_cases: usize) -> FeatureMatrix {
    let x: Vec<Option<f64>> = (0..n_cases).map(|i| Some(i as f64)).collect();
    let flat: Vec<Option<f64>> = vec![Some(0.0); n_cases];
    let y: Vec<Option<&str>> = (0..n_cases)
        .map(|i| Some(if i < n_cases / 2 { "a" } else { "b" }))
        .collect();
    let features = vec![
        Feature::Numeric(NumFeature::from_values("N:x", &x)),
        Feature::Numeric(NumFeature::from_values("N:flat", &flat)),
        Feature::Categorical(CatFeature::from_labels("C:y", &y)),
        Feature::Numeric(NumFeature::from_values("N:y", &x)),
    ];
    let case_labels = (0..n_cases).map(|i| format!("case{i}")).collect();
    FeatureMatrix::new(features, case_labels).unwrap()
}

fn n_splits(trees: &[Tree]) -> usize {
    trees.iter().map(|t| t.n_nodes() - t.n_leaves()).sum()
}

// ---------------------------------------------------------------------------
// a) quota and importance across workers
// ---------------------------------------------------------------------------

#[test]
fn two_cores_collect_exactly_the_quota() {
    let config = GrowConfig::new("C:class", 10)
        .unwrap()
        .with_train_cores(2)
        .with_importance(true)
        .with_contrasts(2)
        .with_seed(42);
    let mut trees: Vec<Tree> = Vec::new();
    let report = config
        .grow(make_classification(120, 42), None, Some(&mut trees))
        .unwrap();

    assert_eq!(report.trees_collected(), 10);
    assert_eq!(trees.len(), 10);
    assert!(!report.converged());
    assert_eq!(report.metadata().train_cores, 2);

    // Every split of every tree, from either worker, lands in exactly one
    // feature's accumulator.
    let counted: usize = report.importance().iter().map(|row| row.count).sum();
    assert_eq!(counted, n_splits(&trees));

    let target_row = report
        .importance()
        .iter()
        .find(|row| row.name == "C:class")
        .unwrap();
    assert_eq!(target_row.count, 0);
    let informative = report
        .importance()
        .iter()
        .filter(|row| ["N:f0", "N:f1", "N:f2"].contains(&row.name.as_str()))
        .map(|row| row.per_tree)
        .sum::<f64>();
    assert!(informative > 0.0);
}

// ---------------------------------------------------------------------------
// b) boosting
// ---------------------------------------------------------------------------

#[test]
fn adaboost_stops_on_a_perfect_tree() {
    let config = GrowConfig::new("C:y", 25)
        .unwrap()
        .with_boosting(Boosting::Adaptive)
        .with_no_bag(true)
        .with_m_try(Quantity::Count(2));
    let mut trees: Vec<Tree> = Vec::new();
    let report = config
        .grow(make_separable(30), None, Some(&mut trees))
        .unwrap();

    // The first tree separates the classes exactly, so its weight is
    // infinite and growth halts without collecting it.
    assert!(report.converged());
    assert_eq!(report.trees_collected(), 0);
    assert!(trees.is_empty());
}

#[test]
fn multiboost_shares_the_boosting_state_across_cores() {
    let config = GrowConfig::new("C:class", 12)
        .unwrap()
        .with_boosting(Boosting::Adaptive)
        .with_multiboost(true)
        .with_train_cores(3)
        .with_oob(true)
        .with_importance(true);
    let mut trees: Vec<Tree> = Vec::new();
    let report = config
        .grow(make_classification(150, 21), None, Some(&mut trees))
        .unwrap();

    assert_eq!(report.metadata().train_cores, 3);
    assert!(report.trees_collected() <= 12);
    assert!(report.converged() || report.trees_collected() == 12);
    assert_eq!(trees.len(), report.trees_collected());
    assert!(trees.iter().all(|t| t.weight().is_finite() && t.weight() >= 0.0));
    let counted: usize = report.importance().iter().map(|row| row.count).sum();
    assert_eq!(counted, n_splits(&trees));
}

#[test]
fn multiboost_convergence_releases_every_worker() {
    let config = GrowConfig::new("C:y", 50)
        .unwrap()
        .with_boosting(Boosting::Adaptive)
        .with_multiboost(true)
        .with_train_cores(3)
        .with_no_bag(true)
        .with_m_try(Quantity::Count(2));
    let mut trees: Vec<Tree> = Vec::new();
    // Returning at all means the scope joined every worker.
    let report = config
        .grow(make_separable(30), None, Some(&mut trees))
        .unwrap();

    assert!(report.converged());
    assert_eq!(report.trees_collected(), 0);
    assert!(trees.is_empty());
}

#[test]
fn boosting_forces_one_core() {
    let config = GrowConfig::new("N:y", 3)
        .unwrap()
        .with_boosting(Boosting::Gradient { learning_rate: 0.5 })
        .with_train_cores(4);
    let report = config.grow(make_separable(30), None, None).unwrap();
    assert_eq!(report.metadata().train_cores, 1);
    assert_eq!(report.trees_collected(), 3);
}

#[test]
fn gradient_boosting_fits_a_ramp() {
    let n = 40;
    let config = GrowConfig::new("N:y", 20)
        .unwrap()
        .with_boosting(Boosting::Gradient { learning_rate: 0.5 })
        .with_m_try(Quantity::Count(2))
        .with_self_test(true);
    let report = config.grow(make_separable(n), None, None).unwrap();

    let mean = (n - 1) as f64 / 2.0;
    let variance = (0..n).map(|i| (i as f64 - mean).powi(2)).sum::<f64>() / n as f64;
    let eval = report.evaluation().unwrap();
    assert_eq!(eval.n_cases, n);
    assert!(
        eval.error < 0.5 * variance,
        "self-test mse {} not below half the variance {variance}",
        eval.error
    );
    assert!(report.trees().iter().all(|t| t.weight() == 0.5));
}

// ---------------------------------------------------------------------------
// c) out-of-bag and held-out accuracy
// ---------------------------------------------------------------------------

#[test]
fn oob_error_is_low_on_informative_data() {
    let config = GrowConfig::new("C:class", 40)
        .unwrap()
        .with_train_cores(2)
        .with_oob(true)
        .with_case_oob(true);
    let report = config.grow(make_classification(150, 7), None, None).unwrap();

    let oob_error = report.oob_error().unwrap();
    assert!(oob_error < 0.1, "oob error {oob_error} >= 0.1");
    assert_eq!(report.case_oob().len(), 150);
    assert_eq!(report.case_oob()[0].case, "case0");
    assert_eq!(report.case_oob()[0].actual, "a");
}

#[test]
fn held_out_matrix_is_evaluated() {
    let config = GrowConfig::new("C:class", 30)
        .unwrap()
        .with_missing(MissingPolicy::SplitMissing)
        .with_balance(Balance::ByTarget);
    let test = make_classification(90, 99);
    let report = config
        .grow(make_classification(150, 1), Some(&test), None)
        .unwrap();

    assert_eq!(report.trees().len(), 30);
    let eval = report.evaluation().unwrap();
    let correct = eval.fraction_correct.unwrap();
    assert!(correct > 0.9, "held-out fraction correct {correct} <= 0.9");
}

#[test]
fn held_out_matrix_without_target_fails_before_growth() {
    let config = GrowConfig::new("C:class", 5).unwrap();
    let test = make_separable(10);
    let mut trees: Vec<Tree> = Vec::new();
    let err = config
        .grow(make_classification(30, 3), Some(&test), Some(&mut trees))
        .unwrap_err();
    assert!(err.to_string().contains("test data"));
    assert!(trees.is_empty());
}

// ---------------------------------------------------------------------------
// d) forest file round trip
// ---------------------------------------------------------------------------

#[test]
fn streamed_forest_reloads_and_predicts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("forest.bin");

    let config = GrowConfig::new("C:class", 12)
        .unwrap()
        .with_train_cores(3);
    let mut writer = ForestFileWriter::create(&path, "C:class", 12).unwrap();
    let report = config
        .grow(
            make_classification(120, 5),
            None,
            Some(&mut writer as &mut dyn ForestWriter),
        )
        .unwrap();
    assert_eq!(writer.finish().unwrap(), 12);
    assert_eq!(report.trees_collected(), 12);

    let (header, trees) = read_forest(&path).unwrap();
    assert_eq!(header.target, "C:class");
    assert_eq!(trees.len(), 12);

    let test = make_classification(60, 11);
    let eval = evaluate(&trees, &test, "C:class", Aggregation::Mean, true).unwrap();
    let correct = eval.fraction_correct.unwrap();
    assert!(correct > 0.9, "reloaded forest fraction correct {correct} <= 0.9");
}
