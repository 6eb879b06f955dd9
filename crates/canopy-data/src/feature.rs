//! Feature columns with per-case missingness.
//!
//! A [`Feature`] is either categorical ([`CatFeature`], values stored as
//! codes into a per-feature label table) or numeric ([`NumFeature`]). Every
//! column carries a missing mask; accessors that return a value return
//! `None` for missing cases.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;

/// Cell tokens read as a missing value.
const MISSING_TOKENS: [&str; 6] = ["", "NA", "na", "?", "nan", "NaN"];

/// Suffix appended to the name of a shuffled contrast copy.
pub const CONTRAST_SUFFIX: &str = ":CONTRAST";

/// Return `true` when a raw cell denotes a missing value.
#[must_use]
pub fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw.trim())
}

/// Random permutation of `0..n`.
fn permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order
}

/// A categorical column: category codes plus the label table they index.
#[derive(Debug, Clone, PartialEq)]
pub struct CatFeature {
    name: String,
    codes: Vec<usize>,
    missing: Vec<bool>,
    labels: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl CatFeature {
    /// Create an empty categorical feature.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            codes: Vec::new(),
            missing: Vec::new(),
            labels: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Build a feature from labels, `None` marking a missing case.
    pub fn from_labels<S: AsRef<str>>(name: impl Into<String>, values: &[Option<S>]) -> Self {
        let mut feature = Self::new(name);
        for value in values {
            feature.push(value.as_ref().map(AsRef::as_ref));
        }
        feature
    }

    /// Append one case. New labels get the next free code.
    pub fn push(&mut self, value: Option<&str>) {
        match value {
            Some(label) => {
                let code = match self.lookup.get(label) {
                    Some(&code) => code,
                    None => {
                        let code = self.labels.len();
                        self.labels.push(label.to_string());
                        self.lookup.insert(label.to_string(), code);
                        code
                    }
                };
                self.codes.push(code);
                self.missing.push(false);
            }
            None => {
                self.codes.push(0);
                self.missing.push(true);
            }
        }
    }

    /// Return the feature name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the number of cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Return `true` when the feature holds no cases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Return `true` when `case` is missing.
    #[must_use]
    pub fn is_missing(&self, case: usize) -> bool {
        self.missing[case]
    }

    /// Return the category code of `case`, or `None` when missing.
    #[must_use]
    pub fn code(&self, case: usize) -> Option<usize> {
        if self.missing[case] {
            None
        } else {
            Some(self.codes[case])
        }
    }

    /// Return the label of `case`, or `None` when missing.
    #[must_use]
    pub fn label(&self, case: usize) -> Option<&str> {
        self.code(case).map(|code| self.labels[code].as_str())
    }

    /// Return the number of distinct categories.
    #[must_use]
    pub fn n_cats(&self) -> usize {
        self.labels.len()
    }

    /// Return the label for a category code.
    #[must_use]
    pub fn label_of(&self, code: usize) -> &str {
        &self.labels[code]
    }

    /// Return the code for a label, if the label occurs in this feature.
    #[must_use]
    pub fn code_of(&self, label: &str) -> Option<usize> {
        self.lookup.get(label).copied()
    }

    /// Return the label table in code order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Most frequent category code among `cases`.
    ///
    /// Ties go to the category encountered first when walking `cases` in
    /// order. Returns `None` when every case is missing.
    #[must_use]
    pub fn mode(&self, cases: &[usize]) -> Option<usize> {
        let mut counts = vec![0usize; self.n_cats()];
        for &case in cases {
            if let Some(code) = self.code(case) {
                counts[code] += 1;
            }
        }
        let max = counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return None;
        }
        cases
            .iter()
            .filter_map(|&case| self.code(case))
            .find(|&code| counts[code] == max)
    }

    fn permute(&mut self, order: &[usize]) {
        self.codes = order.iter().map(|&i| self.codes[i]).collect();
        self.missing = order.iter().map(|&i| self.missing[i]).collect();
    }

    fn impute(&mut self) {
        let all: Vec<usize> = (0..self.len()).collect();
        if let Some(mode) = self.mode(&all) {
            for (code, missing) in self.codes.iter_mut().zip(self.missing.iter_mut()) {
                if *missing {
                    *code = mode;
                    *missing = false;
                }
            }
        }
    }
}

/// A numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct NumFeature {
    name: String,
    values: Vec<f64>,
    missing: Vec<bool>,
}

impl NumFeature {
    /// Create an empty numeric feature.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Build a feature from values, `None` marking a missing case.
    pub fn from_values(name: impl Into<String>, values: &[Option<f64>]) -> Self {
        let mut feature = Self::new(name);
        for &value in values {
            feature.push(value);
        }
        feature
    }

    /// Append one case.
    pub fn push(&mut self, value: Option<f64>) {
        self.values.push(value.unwrap_or(0.0));
        self.missing.push(value.is_none());
    }

    /// Return the feature name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the number of cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Return `true` when the feature holds no cases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Return `true` when `case` is missing.
    #[must_use]
    pub fn is_missing(&self, case: usize) -> bool {
        self.missing[case]
    }

    /// Return the value of `case`, or `None` when missing.
    #[must_use]
    pub fn get(&self, case: usize) -> Option<f64> {
        if self.missing[case] {
            None
        } else {
            Some(self.values[case])
        }
    }

    /// Mean over the non-missing cases, `None` when there are none.
    #[must_use]
    pub fn mean(&self, cases: &[usize]) -> Option<f64> {
        let (sum, n) = cases
            .iter()
            .filter_map(|&case| self.get(case))
            .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Most frequent value among `cases`; ties go to the first encountered.
    #[must_use]
    pub fn mode(&self, cases: &[usize]) -> Option<f64> {
        let mut counts: HashMap<u64, usize> = HashMap::new();
        for v in cases.iter().filter_map(|&case| self.get(case)) {
            *counts.entry(v.to_bits()).or_insert(0) += 1;
        }
        let max = counts.values().copied().max()?;
        cases
            .iter()
            .filter_map(|&case| self.get(case))
            .find(|v| counts[&v.to_bits()] == max)
    }

    /// Smallest and largest non-missing value among `cases`.
    #[must_use]
    pub fn span(&self, cases: &[usize]) -> Option<(f64, f64)> {
        cases
            .iter()
            .filter_map(|&case| self.get(case))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }

    fn permute(&mut self, order: &[usize]) {
        self.values = order.iter().map(|&i| self.values[i]).collect();
        self.missing = order.iter().map(|&i| self.missing[i]).collect();
    }

    fn impute(&mut self) {
        let all: Vec<usize> = (0..self.len()).collect();
        if let Some(mean) = self.mean(&all) {
            for (value, missing) in self.values.iter_mut().zip(self.missing.iter_mut()) {
                if *missing {
                    *value = mean;
                    *missing = false;
                }
            }
        }
    }
}

/// One column of a [`FeatureMatrix`](crate::FeatureMatrix).
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// Category-valued column.
    Categorical(CatFeature),
    /// Real-valued column.
    Numeric(NumFeature),
}

impl Feature {
    /// Return the feature name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Feature::Categorical(f) => f.name(),
            Feature::Numeric(f) => f.name(),
        }
    }

    /// Rename the feature.
    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            Feature::Categorical(f) => f.name = name.into(),
            Feature::Numeric(f) => f.name = name.into(),
        }
    }

    /// Return the number of cases.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Feature::Categorical(f) => f.len(),
            Feature::Numeric(f) => f.len(),
        }
    }

    /// Return `true` when the feature holds no cases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `true` when `case` is missing.
    #[must_use]
    pub fn is_missing(&self, case: usize) -> bool {
        match self {
            Feature::Categorical(f) => f.is_missing(case),
            Feature::Numeric(f) => f.is_missing(case),
        }
    }

    /// Number of categories; 0 for numeric features.
    #[must_use]
    pub fn n_cats(&self) -> usize {
        match self {
            Feature::Categorical(f) => f.n_cats(),
            Feature::Numeric(_) => 0,
        }
    }

    /// Number of missing cases.
    #[must_use]
    pub fn n_missing(&self) -> usize {
        (0..self.len()).filter(|&case| self.is_missing(case)).count()
    }

    /// String form of the value at `case`, `None` when missing.
    #[must_use]
    pub fn label(&self, case: usize) -> Option<String> {
        match self {
            Feature::Categorical(f) => f.label(case).map(str::to_string),
            Feature::Numeric(f) => f.get(case).map(|v| v.to_string()),
        }
    }

    /// Borrow as categorical, if it is one.
    #[must_use]
    pub fn as_categorical(&self) -> Option<&CatFeature> {
        match self {
            Feature::Categorical(f) => Some(f),
            Feature::Numeric(_) => None,
        }
    }

    /// Borrow as numeric, if it is one.
    #[must_use]
    pub fn as_numeric(&self) -> Option<&NumFeature> {
        match self {
            Feature::Numeric(f) => Some(f),
            Feature::Categorical(_) => None,
        }
    }

    /// Randomly permute the values (and missing mask) across cases.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let order = permutation(self.len(), rng);
        match self {
            Feature::Categorical(f) => f.permute(&order),
            Feature::Numeric(f) => f.permute(&order),
        }
    }

    /// Replace missing values with the feature mean (numeric) or mode (categorical).
    pub fn impute(&mut self) {
        match self {
            Feature::Categorical(f) => f.impute(),
            Feature::Numeric(f) => f.impute(),
        }
    }

    /// Shuffled copy named `<name>:CONTRAST`, used as a null-importance baseline.
    #[must_use]
    pub fn contrast<R: Rng + ?Sized>(&self, rng: &mut R) -> Feature {
        let mut copy = self.clone();
        copy.set_name(format!("{}{CONTRAST_SUFFIX}", self.name()));
        copy.shuffle(rng);
        copy
    }
}
