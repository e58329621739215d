//! The datafile boundary.
//!
//! Binary FCS parsing lives outside this crate. Callers implement
//! [`EventSource`] for their parser of choice and hand it to samples and
//! collections; the containers only describe *what* to read
//! ([`ReadOptions`]) and *when* (lazily, on first data access).

use crate::error::{Result, SampleError};
use crate::meta::SampleMeta;
use derive_builder::Builder;
use polars::prelude::DataFrame;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// Which keyword supplies the column names of the event table
#[derive(
    Default, Display, EnumString, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelNaming {
    /// Use the short channel name ($PnN)
    #[default]
    Short,
    /// Use the stain label ($PnS)
    Stain,
}

/// Options forwarded to the parser collaborator on every read
#[derive(Builder, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[builder(setter(into), default)]
pub struct ReadOptions {
    /// Which keyword supplies the event table column names
    pub channel_naming: ChannelNaming,
}

impl ReadOptions {
    /// Create a new builder for `ReadOptions`
    pub fn new() -> ReadOptionsBuilder {
        ReadOptionsBuilder::default()
    }
}

/// A parser collaborator that turns a datafile into annotation and events.
///
/// Implementations are expected to be cheap to share (`Arc<dyn EventSource>`);
/// the containers call `read_meta` when only annotation is needed and `read`
/// when the event table is materialized.
pub trait EventSource: fmt::Debug + Send + Sync {
    /// Read only the annotation of a datafile, without the event data
    fn read_meta(&self, path: &Path, options: &ReadOptions) -> anyhow::Result<SampleMeta>;

    /// Read the annotation and the full event table of a datafile
    fn read(&self, path: &Path, options: &ReadOptions) -> anyhow::Result<(SampleMeta, DataFrame)>;
}

/// A sample's handle on its datafile: path, parser, and read options.
#[derive(Clone, Debug)]
pub struct DataSource {
    /// An owned path to the datafile on disk
    pub path: PathBuf,
    /// The parser collaborator used to read the file
    pub reader: Arc<dyn EventSource>,
    /// Options forwarded to the parser
    pub options: ReadOptions,
}

impl DataSource {
    /// Creates a new `DataSource`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, reader: Arc<dyn EventSource>, options: ReadOptions) -> Self {
        Self {
            path: path.into(),
            reader,
            options,
        }
    }

    pub(crate) fn read_meta(&self) -> Result<SampleMeta> {
        Ok(self.reader.read_meta(&self.path, &self.options)?)
    }

    pub(crate) fn read(&self) -> Result<(SampleMeta, DataFrame)> {
        Ok(self.reader.read(&self.path, &self.options)?)
    }
}

/// How a sample ID is derived when loading a directory of datafiles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdStrategy {
    /// Use the file stem as the ID
    Stem,
    /// Extract a well label (row letter + column number, e.g. `A3`) from the
    /// file name; falls back to the stem when none is found
    WellFromName,
    /// Read the ID from a keyword in the file annotation (e.g. `$SRC`)
    MetaField(String),
}

/// Collect the files in `dir` whose names match `pattern` (a regular
/// expression applied to the file name), sorted by name for deterministic IDs.
///
/// # Errors
/// Will return `Err` if the pattern is invalid or the directory cannot be read
pub fn collect_datafiles(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = Regex::new(pattern)
        .map_err(|e| SampleError::configuration(format!("invalid file pattern '{pattern}': {e}")))?;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::Error::from(e).context(format!("reading {}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| matcher.is_match(name))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Extract a well label (e.g. `A3` or `H12`) from a file name.
///
/// The last match wins, so `Specimen_001_A3.fcs` yields `A3`.
#[must_use]
pub fn well_label_from_filename(path: &Path) -> Option<String> {
    static WELL: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"([A-P])(\d{1,2})").expect("valid well pattern"));

    let stem = path.file_stem()?.to_str()?;
    WELL.find_iter(stem).last().map(|m| m.as_str().to_string())
}
