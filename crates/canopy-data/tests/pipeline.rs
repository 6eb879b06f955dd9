//! End-to-end integration tests: AFM file -> FeatureMatrix -> preparation steps.

use std::fs;

use canopy_data::{AfmReader, DataError, Feature, read_id_list};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

const IRIS_LIKE: &str = "\
.\tc0\tc1\tc2\tc3\tc4\tc5
N:petal\t1.4\t1.3\tNA\t4.7\t4.5\t4.9
N:sepal\t5.1\t4.9\t4.7\t7.0\t6.4\t?
C:species\tsetosa\tsetosa\tsetosa\tversicolor\tversicolor\tversicolor
B:flag\t1\t0\t1\t0\t1\t
";

#[test]
fn load_impute_and_contrast() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("train.afm");
    fs::write(&path, IRIS_LIKE).unwrap();

    let mut matrix = AfmReader::new(&path).read().expect("fixture should parse");
    assert_eq!(matrix.n_cases(), 6);
    assert_eq!(matrix.n_features(), 4);

    let species = matrix.feature_index("C:species").unwrap();
    let target = matrix.feature(species).as_categorical().unwrap();
    let all: Vec<usize> = (0..6).collect();
    assert_eq!(target.label_of(target.mode(&all).unwrap()), "setosa");

    let missing_before: usize = matrix.features().iter().map(Feature::n_missing).sum();
    assert_eq!(missing_before, 3);

    matrix.impute_missing();
    let missing_after: usize = matrix.features().iter().map(Feature::n_missing).sum();
    assert_eq!(missing_after, 0);

    let petal = matrix.feature(0).as_numeric().unwrap();
    let expected = (1.4 + 1.3 + 4.7 + 4.5 + 4.9) / 5.0;
    assert!((petal.get(2).unwrap() - expected).abs() < 1e-12);

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    matrix.contrast_all(&mut rng);
    assert_eq!(matrix.n_features(), 8);
    assert!(matrix.feature_index("C:species:CONTRAST").is_some());
}

#[test]
fn blacklist_ids_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blacklist.tsv");
    fs::write(&path, "N:sepal\tnoise column\nB:flag\n").unwrap();

    let ids = read_id_list(&path).unwrap();
    assert_eq!(ids, vec!["N:sepal", "B:flag"]);
}

#[test]
fn errors_carry_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.afm");
    fs::write(&path, ".\tc0\nN:x\tnot-a-number\n").unwrap();

    let err = AfmReader::new(&path).read().unwrap_err();
    match &err {
        DataError::InvalidNumber { path: p, feature, .. } => {
            assert_eq!(p, &path);
            assert_eq!(feature, "N:x");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("bad.afm"));
}
