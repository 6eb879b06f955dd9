//! Feature matrices for forest growth: categorical and numeric columns with
//! per-case missingness, plus the tab-separated AFM loader.

mod error;
mod feature;
mod matrix;
mod reader;

pub use error::DataError;
pub use feature::{CONTRAST_SUFFIX, CatFeature, Feature, NumFeature, is_missing_token};
pub use matrix::FeatureMatrix;
pub use reader::{AfmReader, read_id_list};
