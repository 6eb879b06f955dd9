//! Column-oriented feature matrix with name lookup.

use std::collections::HashMap;

use rand::Rng;
use tracing::debug;

use crate::DataError;
use crate::feature::Feature;

/// An ordered set of equally long feature columns plus case labels.
///
/// Cases are addressed by index; every component that consumes the matrix
/// works on sequences of case indices rather than copied rows.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    features: Vec<Feature>,
    index: HashMap<String, usize>,
    case_labels: Vec<String>,
}

impl FeatureMatrix {
    /// Build a matrix from columns and case labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::DuplicateFeature`] | two columns share a name |
    /// | [`DataError::LengthMismatch`] | a column length differs from `case_labels.len()` |
    pub fn new(features: Vec<Feature>, case_labels: Vec<String>) -> Result<Self, DataError> {
        let mut matrix = Self {
            features: Vec::with_capacity(features.len()),
            index: HashMap::with_capacity(features.len()),
            case_labels,
        };
        for feature in features {
            matrix.push_feature(feature)?;
        }
        Ok(matrix)
    }

    /// Append a column.
    ///
    /// # Errors
    ///
    /// Same conditions as [`FeatureMatrix::new`].
    pub fn push_feature(&mut self, feature: Feature) -> Result<(), DataError> {
        if feature.len() != self.case_labels.len() {
            return Err(DataError::LengthMismatch {
                name: feature.name().to_string(),
                expected: self.case_labels.len(),
                got: feature.len(),
            });
        }
        if self.index.contains_key(feature.name()) {
            return Err(DataError::DuplicateFeature {
                name: feature.name().to_string(),
            });
        }
        self.index
            .insert(feature.name().to_string(), self.features.len());
        self.features.push(feature);
        Ok(())
    }

    /// Return all columns in order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Return the column at `index`.
    #[must_use]
    pub fn feature(&self, index: usize) -> &Feature {
        &self.features[index]
    }

    /// Mutably borrow the column at `index`.
    pub fn feature_mut(&mut self, index: usize) -> &mut Feature {
        &mut self.features[index]
    }

    /// Position of the column named `name`.
    #[must_use]
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Return the number of columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Return the number of cases.
    #[must_use]
    pub fn n_cases(&self) -> usize {
        self.case_labels.len()
    }

    /// Return the case labels from the header row.
    #[must_use]
    pub fn case_labels(&self) -> &[String] {
        &self.case_labels
    }

    /// Append `n` shuffled contrast copies of randomly chosen columns.
    ///
    /// Contrast features carry no signal and give a null distribution for
    /// importance scores. Copies of an already drawn column are skipped, so
    /// at most one contrast per original column is added.
    pub fn add_contrasts<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) {
        let n_original = self.features.len();
        if n_original == 0 {
            return;
        }
        let mut added = 0;
        let mut attempts = 0;
        while added < n && attempts < n * 8 + n_original {
            attempts += 1;
            let source = rng.gen_range(0..n_original);
            let contrast = self.features[source].contrast(rng);
            if self.push_feature(contrast).is_ok() {
                added += 1;
            }
        }
        debug!(requested = n, added, "contrast features added");
    }

    /// Append one shuffled contrast copy of every column.
    pub fn contrast_all<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let n_original = self.features.len();
        for i in 0..n_original {
            let contrast = self.features[i].contrast(rng);
            // Name collisions only occur for columns already contrasted.
            let _ = self.push_feature(contrast);
        }
    }

    /// Impute every column's missing values to its mean or mode.
    pub fn impute_missing(&mut self) {
        for feature in &mut self.features {
            feature.impute();
        }
    }
}
