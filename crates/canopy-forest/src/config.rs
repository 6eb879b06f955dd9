//! Configuration builder for forest growth.

use std::collections::HashMap;
use std::str::FromStr;

use canopy_data::FeatureMatrix;

use crate::error::GrowError;
use crate::grow::grow;
use crate::result::GrowReport;
use crate::writer::ForestWriter;

/// A size given as a count, a fraction of some total, or left to inference.
///
/// Parsed from text: values `<= 0` mean [`Quantity::Auto`], values in
/// `(0, 1)` a fraction, and anything else a count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    /// Inferred from the data at growth time.
    Auto,
    /// A fixed count.
    Count(usize),
    /// A fraction of the total, in (0.0, 1.0).
    Fraction(f64),
}

/// Cases drawn per tree.
pub type SampleSize = Quantity;
/// Candidate features drawn per split (mTry).
pub type CandidateCount = Quantity;
/// Minimum cases per leaf.
pub type LeafSize = Quantity;

impl Quantity {
    /// Resolve against `total`, returning `None` for [`Quantity::Auto`].
    /// Fractions round up.
    #[must_use]
    pub fn resolve(self, total: usize) -> Option<usize> {
        match self {
            Quantity::Auto => None,
            Quantity::Count(n) => Some(n),
            Quantity::Fraction(f) => Some((total as f64 * f).ceil() as usize),
        }
    }
}

impl FromStr for Quantity {
    type Err = GrowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value: f64 = raw.trim().parse().map_err(|_| GrowError::InvalidQuantity {
            raw: raw.to_string(),
        })?;
        if !value.is_finite() {
            return Err(GrowError::InvalidQuantity {
                raw: raw.to_string(),
            });
        }
        Ok(if value <= 0.0 {
            Quantity::Auto
        } else if value < 1.0 {
            Quantity::Fraction(value)
        } else {
            Quantity::Count(value as usize)
        })
    }
}

/// Treatment of missing feature values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Cases missing a split feature stop at that split.
    Ignore,
    /// Fill missing values (mean or mode) before growth.
    Impute,
    /// Send missing values down a third branch.
    SplitMissing,
}

/// Boosting mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boosting {
    None,
    /// AdaBoost, categorical or numeric by target type.
    Adaptive,
    /// Gradient boosting on the residuals of a numeric target.
    Gradient {
        /// Shrinkage per tree, in (0.0, 1.0].
        learning_rate: f64,
    },
}

/// Bootstrap stratification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Balance {
    None,
    /// Equal draws per target category.
    ByTarget,
    /// Equal draws per target category and, within it, per category of the
    /// named feature.
    BySecondary(String),
}

/// Impurity objective replacing the default for the target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Misclassification rate or mean squared error.
    Default,
    /// Shannon entropy (categorical targets).
    Entropy,
    /// Mean absolute deviation (numeric targets).
    L1,
    /// Mode-based ordinal regression (numeric targets).
    Ordinal,
    /// Density estimation over the candidate features.
    Density,
}

/// Feature exclusion and shuffling rules, applied before candidate
/// features are enumerated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFilter {
    /// Feature names never used as splitters.
    pub blacklist: Vec<String>,
    /// Regex; matching features are excluded.
    pub block: Option<String>,
    /// Regex; non-matching features are excluded.
    pub include: Option<String>,
    /// Regex; matching features are shuffled across cases.
    pub shuffle: Option<String>,
}

/// Configuration for growing a forest.
///
/// Construct via [`GrowConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter        | Default                       |
/// |------------------|-------------------------------|
/// | `train_cores`    | 1                             |
/// | `sample_size`    | `Auto` (all non-missing)      |
/// | `m_try`          | `Auto` (⌈√candidates⌉)        |
/// | `leaf_size`      | `Auto` (by task)              |
/// | `missing`        | `Ignore`                      |
/// | `boosting`       | `None`                        |
/// | `balance`        | `None`                        |
/// | `objective`      | `Default`                     |
/// | `oob`            | false                         |
/// | `seed`           | 42                            |
#[derive(Debug, Clone)]
pub struct GrowConfig {
    pub(crate) target: String,
    pub(crate) tree_count: usize,
    pub(crate) train_cores: usize,
    pub(crate) sample_size: SampleSize,
    pub(crate) m_try: CandidateCount,
    pub(crate) leaf_size: LeafSize,
    pub(crate) missing: MissingPolicy,
    pub(crate) boosting: Boosting,
    pub(crate) multiboost: bool,
    pub(crate) balance: Balance,
    pub(crate) no_bag: bool,
    pub(crate) objective: Objective,
    pub(crate) costs: Option<HashMap<String, f64>>,
    pub(crate) class_weights: Option<HashMap<String, f64>>,
    pub(crate) filter: FeatureFilter,
    pub(crate) n_contrasts: usize,
    pub(crate) contrast_all: bool,
    pub(crate) permute_target: bool,
    pub(crate) force: bool,
    pub(crate) vet: bool,
    pub(crate) eval_oob: bool,
    pub(crate) oob: bool,
    pub(crate) case_oob: bool,
    pub(crate) importance: bool,
    pub(crate) progress: bool,
    pub(crate) self_test: bool,
    pub(crate) seed: u64,
}

impl GrowConfig {
    /// Create a config growing `tree_count` trees predicting `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GrowError::InvalidTreeCount`] if `tree_count` is zero.
    pub fn new(target: impl Into<String>, tree_count: usize) -> Result<Self, GrowError> {
        if tree_count == 0 {
            return Err(GrowError::InvalidTreeCount { tree_count });
        }
        Ok(Self {
            target: target.into(),
            tree_count,
            train_cores: 1,
            sample_size: Quantity::Auto,
            m_try: Quantity::Auto,
            leaf_size: Quantity::Auto,
            missing: MissingPolicy::Ignore,
            boosting: Boosting::None,
            multiboost: false,
            balance: Balance::None,
            no_bag: false,
            objective: Objective::Default,
            costs: None,
            class_weights: None,
            filter: FeatureFilter::default(),
            n_contrasts: 0,
            contrast_all: false,
            permute_target: false,
            force: false,
            vet: false,
            eval_oob: false,
            oob: false,
            case_oob: false,
            importance: false,
            progress: false,
            self_test: false,
            seed: 42,
        })
    }

    // --- Setters ---

    /// Set the number of worker threads.
    #[must_use]
    pub fn with_train_cores(mut self, train_cores: usize) -> Self {
        self.train_cores = train_cores;
        self
    }

    /// Set the number of cases drawn per tree.
    #[must_use]
    pub fn with_sample_size(mut self, sample_size: SampleSize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Set the number of candidate features per split.
    #[must_use]
    pub fn with_m_try(mut self, m_try: CandidateCount) -> Self {
        self.m_try = m_try;
        self
    }

    /// Set the minimum leaf size.
    #[must_use]
    pub fn with_leaf_size(mut self, leaf_size: LeafSize) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    /// Set the missing-value policy.
    #[must_use]
    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    /// Set the boosting mode.
    #[must_use]
    pub fn with_boosting(mut self, boosting: Boosting) -> Self {
        self.boosting = boosting;
        self
    }

    /// Allow boosting with more than one worker.
    #[must_use]
    pub fn with_multiboost(mut self, multiboost: bool) -> Self {
        self.multiboost = multiboost;
        self
    }

    /// Set the bootstrap stratification.
    #[must_use]
    pub fn with_balance(mut self, balance: Balance) -> Self {
        self.balance = balance;
        self
    }

    /// Train every tree on the same leading non-missing cases.
    #[must_use]
    pub fn with_no_bag(mut self, no_bag: bool) -> Self {
        self.no_bag = no_bag;
        self
    }

    /// Set the impurity objective.
    #[must_use]
    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// Set per-category misclassification costs.
    #[must_use]
    pub fn with_costs(mut self, costs: Option<HashMap<String, f64>>) -> Self {
        self.costs = costs;
        self
    }

    /// Set per-category class weights.
    #[must_use]
    pub fn with_class_weights(mut self, class_weights: Option<HashMap<String, f64>>) -> Self {
        self.class_weights = class_weights;
        self
    }

    /// Set the feature filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FeatureFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Add `n` shuffled contrast copies of randomly chosen features.
    #[must_use]
    pub fn with_contrasts(mut self, n_contrasts: usize) -> Self {
        self.n_contrasts = n_contrasts;
        self
    }

    /// Add a shuffled contrast copy of every feature.
    #[must_use]
    pub fn with_contrast_all(mut self, contrast_all: bool) -> Self {
        self.contrast_all = contrast_all;
        self
    }

    /// Shuffle the target before growth, for a significance baseline.
    #[must_use]
    pub fn with_permute_target(mut self, permute_target: bool) -> Self {
        self.permute_target = permute_target;
        self
    }

    /// Keep drawing candidates until a split is found.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Penalize splits by their decrease on a permuted target.
    #[must_use]
    pub fn with_vet(mut self, vet: bool) -> Self {
        self.vet = vet;
        self
    }

    /// Score splits on out-of-bag cases.
    #[must_use]
    pub fn with_eval_oob(mut self, eval_oob: bool) -> Self {
        self.eval_oob = eval_oob;
        self
    }

    /// Track out-of-bag error.
    #[must_use]
    pub fn with_oob(mut self, oob: bool) -> Self {
        self.oob = oob;
        self
    }

    /// Collect per-case out-of-bag predictions.
    #[must_use]
    pub fn with_case_oob(mut self, case_oob: bool) -> Self {
        self.case_oob = case_oob;
        self
    }

    /// Accumulate split importance and minimal depth per feature.
    #[must_use]
    pub fn with_importance(mut self, importance: bool) -> Self {
        self.importance = importance;
        self
    }

    /// Log the running OOB error after every tree.
    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Evaluate the finished forest on its own training data.
    #[must_use]
    pub fn with_self_test(mut self, self_test: bool) -> Self {
        self.self_test = self_test;
        self
    }

    /// Set the master random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the target feature name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Return the number of trees requested.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.tree_count
    }

    /// Return the number of worker threads requested.
    #[must_use]
    pub fn train_cores(&self) -> usize {
        self.train_cores
    }

    /// Return the per-tree sample size.
    #[must_use]
    pub fn sample_size(&self) -> SampleSize {
        self.sample_size
    }

    /// Return the candidate count per split.
    #[must_use]
    pub fn m_try(&self) -> CandidateCount {
        self.m_try
    }

    /// Return the minimum leaf size.
    #[must_use]
    pub fn leaf_size(&self) -> LeafSize {
        self.leaf_size
    }

    /// Return the missing-value policy.
    #[must_use]
    pub fn missing(&self) -> MissingPolicy {
        self.missing
    }

    /// Return the boosting mode.
    #[must_use]
    pub fn boosting(&self) -> Boosting {
        self.boosting
    }

    /// Return the bootstrap stratification.
    #[must_use]
    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    /// Return the impurity objective.
    #[must_use]
    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Return the feature filter.
    #[must_use]
    pub fn filter(&self) -> &FeatureFilter {
        &self.filter
    }

    /// Return the master random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Grow a forest on `train`.
    ///
    /// Trees are handed to `writer` in collection order. `test`, when
    /// given, is evaluated with the finished forest.
    ///
    /// # Errors
    ///
    /// | Variant                                | When                                              |
    /// |----------------------------------------|---------------------------------------------------|
    /// | [`GrowError::InvalidCoreCount`]        | `train_cores` is zero                             |
    /// | [`GrowError::InvalidLearningRate`]     | gradient learning rate outside (0.0, 1.0]         |
    /// | [`GrowError::TargetNotFound`]          | target is not a feature of `train`                |
    /// | [`GrowError::TargetNotFoundInTest`]    | target is not a feature of `test`                 |
    /// | [`GrowError::FeatureNotFound`]         | the secondary balance feature is absent           |
    /// | [`GrowError::NotCategorical`]          | costs, weights, entropy or balance on a numeric   |
    /// | [`GrowError::NotNumeric`]              | L1, ordinal or gradient boosting on a categorical |
    /// | [`GrowError::IncompatibleOptions`]     | boosting combined with a non-boostable objective  |
    /// | [`GrowError::InvalidPattern`]          | a filter regex does not compile                   |
    /// | [`GrowError::InvalidCategoryWeight`]   | a cost or class weight is not positive            |
    /// | [`GrowError::NoCandidateFeatures`]     | filtering leaves nothing to split on              |
    /// | [`GrowError::NoNonMissingCases`]       | every target value is missing                     |
    /// | [`GrowError::WriteForest`]             | the writer fails                                  |
    pub fn grow(
        &self,
        train: FeatureMatrix,
        test: Option<&FeatureMatrix>,
        writer: Option<&mut dyn ForestWriter>,
    ) -> Result<GrowReport, GrowError> {
        grow(self, train, test, writer)
    }
}

/// Parse a JSON object of category label to number, as used for costs and
/// class weights.
///
/// # Errors
///
/// Returns [`GrowError::InvalidCategoryMap`] when `json` is not such an object.
pub fn parse_category_map(json: &str) -> Result<HashMap<String, f64>, GrowError> {
    serde_json::from_str(json).map_err(|source| GrowError::InvalidCategoryMap { source })
}
