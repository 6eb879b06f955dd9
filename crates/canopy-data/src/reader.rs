//! Tab-separated annotated feature matrix (AFM) reader.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::DataError;
use crate::feature::{CatFeature, Feature, NumFeature, is_missing_token};
use crate::matrix::FeatureMatrix;

/// Kind of a feature row, decided by its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Numeric,
    Categorical,
}

impl RowKind {
    fn from_name(name: &str) -> Option<Self> {
        match name.get(..2) {
            Some("N:") => Some(RowKind::Numeric),
            Some("C:") | Some("B:") => Some(RowKind::Categorical),
            _ => None,
        }
    }
}

/// Reads a feature matrix stored one feature per row.
///
/// Expected format (tab-separated, no quoting):
/// - Header row: an ignored id cell, then one label per case
/// - `N:name` rows hold numeric features, `C:name` and `B:name` rows hold
///   categorical ones; rows without a known prefix are read as categorical
/// - Cells `NA`, `na`, `?`, `nan`, `NaN` or empty are missing
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DataError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`DataError::Parse`] | Malformed record |
/// | [`DataError::EmptyMatrix`] | Zero feature rows after header |
/// | [`DataError::InconsistentRowLength`] | Row has different cell count than header |
/// | [`DataError::InvalidNumber`] | Numeric cell is not a number or missing marker |
/// | [`DataError::DuplicateFeature`] | Same feature name appears twice |
pub struct AfmReader {
    path: PathBuf,
}

impl AfmReader {
    /// Create a new reader for the given matrix file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the file, returning a [`FeatureMatrix`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<FeatureMatrix, DataError> {
        let file = std::fs::File::open(&self.path).map_err(|e| DataError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that InconsistentRowLength fires instead of a
        // low-level parse error.
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.parse_error(e))?;
        let expected_cells = header.len();
        let case_labels: Vec<String> = header.iter().skip(1).map(String::from).collect();
        debug!(n_cases = case_labels.len(), "read matrix header");

        let mut matrix = FeatureMatrix::new(Vec::new(), case_labels)?;

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.parse_error(e))?;
            let name = record.get(0).unwrap_or("").to_string();

            if record.len() != expected_cells {
                return Err(DataError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    feature: name,
                    expected: expected_cells,
                    got: record.len(),
                });
            }

            let kind = RowKind::from_name(&name).unwrap_or_else(|| {
                warn!(feature = %name, "no N:/C:/B: prefix, reading as categorical");
                RowKind::Categorical
            });

            let cells = record.iter().skip(1);
            let feature = match kind {
                RowKind::Numeric => {
                    let mut feature = NumFeature::new(name.clone());
                    for (case_index, raw) in cells.enumerate() {
                        if is_missing_token(raw) {
                            feature.push(None);
                            continue;
                        }
                        let value: f64 =
                            raw.trim().parse().map_err(|_| DataError::InvalidNumber {
                                path: self.path.clone(),
                                feature: name.clone(),
                                case_index,
                                raw: raw.to_string(),
                            })?;
                        feature.push(value.is_finite().then_some(value));
                    }
                    Feature::Numeric(feature)
                }
                RowKind::Categorical => {
                    let mut feature = CatFeature::new(name.clone());
                    for raw in cells {
                        feature.push((!is_missing_token(raw)).then(|| raw.trim()));
                    }
                    Feature::Categorical(feature)
                }
            };
            matrix.push_feature(feature)?;
        }

        if matrix.n_features() == 0 {
            return Err(DataError::EmptyMatrix {
                path: self.path.clone(),
            });
        }

        info!(
            n_cases = matrix.n_cases(),
            n_features = matrix.n_features(),
            "feature matrix loaded"
        );

        Ok(matrix)
    }

    fn parse_error(&self, e: csv::Error) -> DataError {
        DataError::Parse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}

/// Read a list of feature ids, one per line, taking the first tab-separated cell.
///
/// Blank lines are skipped.
///
/// # Errors
///
/// Returns [`DataError::FileNotFound`] or [`DataError::Parse`].
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_id_list(path: &Path) -> Result<Vec<String>, DataError> {
    let file = std::fs::File::open(path).map_err(|e| DataError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut ids = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| DataError::Parse {
            path: path.to_path_buf(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        })?;
        if let Some(id) = record.get(0).map(str::trim)
            && !id.is_empty()
        {
            ids.push(id.to_string());
        }
    }
    debug!(n_ids = ids.len(), "id list loaded");
    Ok(ids)
}
