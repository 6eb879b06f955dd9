//! Criterion benchmarks for canopy-forest: forest growth and evaluation.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use canopy_data::{CatFeature, Feature, FeatureMatrix, NumFeature};
use canopy_forest::{Aggregation, Boosting, GrowConfig, Tree, evaluate};

fn make_classification(n_cases: usize, n_features: usize, n_classes: usize, seed: u64) -> FeatureMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features: Vec<Feature> = (0..n_features)
        .map(|f| {
            let values: Vec<Option<f64>> = (0..n_cases)
                .map(|i| {
                    let base = if f < 3 { (i % n_classes) as f64 * 3.0 } else { 0.0 };
                    Some(base + rng.r#gen::<f64>() * 0.5)
                })
                .collect();
            Feature::Numeric(NumFeature::from_values(format!("N:f{f}"), &values))
        })
        .collect();
    let labels: Vec<Option<String>> = (0..n_cases).map(|i| Some(format!("k{}", i % n_classes))).collect();
    features.push(Feature::Categorical(CatFeature::from_labels("C:class", &labels)));
    let case_labels = (0..n_cases).map(|i| format!("case{i}")).collect();
    FeatureMatrix::new(features, case_labels).unwrap()
}

fn bench_grow(c: &mut Criterion) {
    let matrix = make_classification(500, 20, 5, 42);
    let cfg = GrowConfig::new("C:class", 50).unwrap().with_seed(42);

    c.bench_function("grow_500x20_5class_50trees", |b| {
        b.iter(|| cfg.grow(matrix.clone(), None, None).unwrap());
    });
}

fn bench_grow_parallel_oob(c: &mut Criterion) {
    let matrix = make_classification(500, 20, 5, 42);
    let cfg = GrowConfig::new("C:class", 50)
        .unwrap()
        .with_train_cores(4)
        .with_oob(true)
        .with_importance(true);

    c.bench_function("grow_500x20_50trees_4cores_oob", |b| {
        b.iter(|| cfg.grow(matrix.clone(), None, None).unwrap());
    });
}

fn bench_adaboost(c: &mut Criterion) {
    let matrix = make_classification(500, 20, 5, 42);
    let cfg = GrowConfig::new("C:class", 20)
        .unwrap()
        .with_boosting(Boosting::Adaptive);

    c.bench_function("adaboost_500x20_20trees", |b| {
        b.iter(|| cfg.grow(matrix.clone(), None, None).unwrap());
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let matrix = make_classification(500, 20, 5, 42);
    let mut trees: Vec<Tree> = Vec::new();
    GrowConfig::new("C:class", 50)
        .unwrap()
        .grow(matrix.clone(), None, Some(&mut trees))
        .unwrap();

    c.bench_function("evaluate_held_out_500x20_50trees", |b| {
        b.iter(|| evaluate(&trees, &matrix, "C:class", Aggregation::Mean, true).unwrap());
    });
}

criterion_group!(benches, bench_grow, bench_grow_parallel_oob, bench_adaboost, bench_evaluate);
criterion_main!(benches);
