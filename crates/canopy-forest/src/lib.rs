//! Parallel random forest growth: bagged, cost-weighted and boosted
//! ensembles over feature matrices with missing values.
//!
//! Provides pluggable impurity targets, case samplers, a single-tree
//! inducer, a concurrent grower with out-of-bag tracking and importance
//! accumulation, and streaming forest output.

mod bagger;
mod config;
mod error;
mod evaluate;
mod grow;
mod importance;
mod node;
mod result;
mod running_mean;
mod split;
mod tally;
pub mod target;
mod tree;
mod writer;

pub use bagger::{
    Bagger, BalancedSampler, BootstrapSampler, NoBagSampler, SecondaryBalancedSampler,
    non_missing_cases,
};
pub use config::{
    Balance, Boosting, CandidateCount, FeatureFilter, GrowConfig, LeafSize, MissingPolicy,
    Objective, Quantity, SampleSize, parse_category_map,
};
pub use error::GrowError;
pub use evaluate::evaluate;
pub use importance::FeatureImportance;
pub use node::{Branch, FeatureIndex, Node, NodeIndex, SplitCache, Splitter};
pub use result::{CaseOob, Evaluation, GrowMetadata, GrowReport};
pub use running_mean::{RunningMean, running_means};
pub use split::{InducerParams, MAX_EXHAUSTIVE_CATS, SplitScratch};
pub use tally::{Aggregation, CatBallotBox, NumBallotBox, VoteTally};
pub use target::{BoostingTarget, Prediction, Target};
pub use tree::{SplitLog, Tree};
pub use writer::{
    ForestFileWriter, ForestHeader, ForestWriter, read_forest, write_case_oob, write_importance,
};
