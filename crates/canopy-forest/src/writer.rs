//! Forest and report output.
//!
//! A forest file is a bincode [`ForestHeader`] followed by one bincode
//! record per tree in collection order, so trees can be streamed out as
//! they are grown. Reports are tab-separated text.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::error::GrowError;
use crate::importance::FeatureImportance;
use crate::result::CaseOob;
use crate::tree::Tree;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Receives trees as the coordinator collects them.
pub trait ForestWriter {
    /// Persist one tree. `index` is its position in collection order.
    ///
    /// # Errors
    ///
    /// Returns a [`GrowError`] when the tree cannot be stored.
    fn write_tree(&mut self, tree: &Tree, index: usize) -> Result<(), GrowError>;
}

impl ForestWriter for Vec<Tree> {
    fn write_tree(&mut self, tree: &Tree, _index: usize) -> Result<(), GrowError> {
        self.push(tree.clone());
        Ok(())
    }
}

/// Leading record of a forest file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestHeader {
    /// Format version for compatibility checking.
    pub format_version: u32,
    /// Name of the predicted feature.
    pub target: String,
    /// Trees requested when the forest was grown.
    pub tree_count: usize,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct TreeRecord {
    index: usize,
    tree: Tree,
}

/// Streams trees to a forest file.
pub struct ForestFileWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

impl ForestFileWriter {
    /// Create the file and write the header.
    ///
    /// # Errors
    ///
    /// Returns [`GrowError::WriteForest`] when the file cannot be created or
    /// written.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn create(path: &Path, target: &str, tree_count: usize) -> Result<Self, GrowError> {
        let file = File::create(path).map_err(|e| GrowError::WriteForest {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut writer = Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            written: 0,
        };
        let header = ForestHeader {
            format_version: FORMAT_VERSION,
            target: target.to_string(),
            tree_count,
        };
        let bytes = bincode::serialize(&header).map_err(|e| GrowError::SerializeTree {
            index: 0,
            source: e,
        })?;
        writer.write_bytes(&bytes)?;
        debug!("forest header written");
        Ok(writer)
    }

    /// Flush buffered records to disk.
    ///
    /// # Errors
    ///
    /// Returns [`GrowError::WriteForest`] when flushing fails.
    pub fn finish(mut self) -> Result<usize, GrowError> {
        self.out.flush().map_err(|e| GrowError::WriteForest {
            path: self.path.clone(),
            source: e,
        })?;
        info!(n_trees = self.written, path = %self.path.display(), "forest saved");
        Ok(self.written)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), GrowError> {
        self.out.write_all(bytes).map_err(|e| GrowError::WriteForest {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl ForestWriter for ForestFileWriter {
    fn write_tree(&mut self, tree: &Tree, index: usize) -> Result<(), GrowError> {
        let record = TreeRecord {
            index,
            tree: tree.clone(),
        };
        let bytes = bincode::serialize(&record)
            .map_err(|e| GrowError::SerializeTree { index, source: e })?;
        self.write_bytes(&bytes)?;
        self.written += 1;
        Ok(())
    }
}

/// Read a forest file back.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`GrowError::ReadForest`] | file read failed |
/// | [`GrowError::DeserializeForest`] | bincode decoding failed |
/// | [`GrowError::IncompatibleForestVersion`] | format version mismatch |
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_forest(path: &Path) -> Result<(ForestHeader, Vec<Tree>), GrowError> {
    let read_err = |e| GrowError::ReadForest {
        path: path.to_path_buf(),
        source: e,
    };
    let decode_err = |e| GrowError::DeserializeForest {
        path: path.to_path_buf(),
        source: e,
    };
    let mut reader = BufReader::new(File::open(path).map_err(read_err)?);

    let header: ForestHeader = bincode::deserialize_from(&mut reader).map_err(decode_err)?;
    if header.format_version != FORMAT_VERSION {
        return Err(GrowError::IncompatibleForestVersion {
            expected: FORMAT_VERSION,
            found: header.format_version,
            path: path.to_path_buf(),
        });
    }

    let mut trees = Vec::new();
    while !reader.fill_buf().map_err(read_err)?.is_empty() {
        let record: TreeRecord = bincode::deserialize_from(&mut reader).map_err(decode_err)?;
        trees.push(record.tree);
    }
    debug!(n_trees = trees.len(), target = %header.target, "forest loaded");
    Ok((header, trees))
}

fn write_report(
    path: &Path,
    header: &str,
    rows: impl Iterator<Item = String>,
) -> Result<(), GrowError> {
    let write_err = |e| GrowError::WriteReport {
        path: path.to_path_buf(),
        source: e,
    };
    let mut out = BufWriter::new(File::create(path).map_err(write_err)?);
    writeln!(out, "{header}").map_err(write_err)?;
    for row in rows {
        writeln!(out, "{row}").map_err(write_err)?;
    }
    out.flush().map_err(write_err)
}

/// Write importance rows as TSV.
///
/// Columns: feature, mean decrease, split count, decrease per tree,
/// decrease per tree that used the feature, trees used, mean minimal depth.
///
/// # Errors
///
/// Returns [`GrowError::WriteReport`] when the file cannot be written.
#[instrument(skip_all, fields(path = %path.display(), n_rows = rows.len()))]
pub fn write_importance(path: &Path, rows: &[FeatureImportance]) -> Result<(), GrowError> {
    write_report(
        path,
        "feature\tmean_decrease\tcount\tper_tree\tper_tree_used\ttrees_used\tmean_min_depth",
        rows.iter().map(|r| {
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                r.name,
                r.mean_decrease,
                r.count,
                r.per_tree,
                r.per_tree_used,
                r.trees_used,
                r.mean_min_depth
            )
        }),
    )
}

/// Write per-case OOB predictions as TSV: case, predicted, actual.
///
/// # Errors
///
/// Returns [`GrowError::WriteReport`] when the file cannot be written.
#[instrument(skip_all, fields(path = %path.display(), n_rows = rows.len()))]
pub fn write_case_oob(path: &Path, rows: &[CaseOob]) -> Result<(), GrowError> {
    write_report(
        path,
        "case\tpredicted\tactual",
        rows.iter()
            .map(|r| format!("{}\t{}\t{}", r.case, r.predicted, r.actual)),
    )
}
