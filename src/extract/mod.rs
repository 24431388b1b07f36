//! Read-side extraction and aggregation.
//!
//! [`ArchiveReader`] answers one question: "give me everything the sweep
//! produced for this key". The answer shape depends on the aggregation tag:
//!
//! - `initial` / `final` / `option`: one scalar per trial, concatenated.
//! - `forward` / `backward` / `climate`: the raw per-trial series, no
//!   reduction.
//! - `OutputOrder` / `GridOutputOrder`: schema metadata from one
//!   representative trial.
//! - `mean` / `stddev` / `min` / `max` / `mode` / `geomean`: derived
//!   lazily from the sibling `…:forward` series, never stored.
//!
//! The reader serves both container shapes transparently; the header's shape
//! tag decides, never key-pattern sniffing.

pub mod stats;

use std::path::Path;

use tracing::debug;

use crate::archive::{Archive, Dataset, Shape, StoredValue, FLAT_GROUP};
use crate::integrity::{self, VerifyMode};
use crate::key::{sibling_forward, ParsedKey, Tag};
use crate::{Error, Result};

use stats::{unique_sorted, Stat};

/// Everything the sweep produced for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// One value per trial (scalar tags and derived statistics)
    Scalars(Vec<f64>),
    /// Textual scalar values (string-typed options)
    Text(Vec<String>),
    /// One series per trial (raw forward/backward/climate)
    Series(Vec<Vec<f64>>),
    /// One grid per trial (bare seasonal keys)
    Grids(Vec<Vec<Vec<f64>>>),
    /// Flattened (name, unit, name, unit, …) schema from one trial
    Schema(Vec<String>),
}

impl Column {
    /// Scalar view, when this column holds one number per trial.
    #[must_use]
    pub fn as_scalars(&self) -> Option<&[f64]> {
        match self {
            Self::Scalars(v) => Some(v),
            _ => None,
        }
    }

    /// Flatten every numeric value in the column.
    #[must_use]
    pub fn flatten(&self) -> Vec<f64> {
        match self {
            Self::Scalars(v) => v.clone(),
            Self::Series(s) => s.iter().flatten().copied().collect(),
            Self::Grids(g) => g
                .iter()
                .flat_map(|m| m.iter().flatten().copied())
                .collect(),
            Self::Text(_) | Self::Schema(_) => Vec::new(),
        }
    }
}

/// Shape-aware archive reader.
#[derive(Debug)]
pub struct ArchiveReader {
    archive: Archive,
    verify: VerifyMode,
}

impl ArchiveReader {
    /// Open with strict integrity checking (sidecar + per-dataset digests).
    ///
    /// # Errors
    /// Propagates open failures and [`Error::ChecksumMismatch`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, VerifyMode::Strict)
    }

    /// Open with an explicit verification mode.
    ///
    /// # Errors
    /// Same conditions as [`ArchiveReader::open`], except that
    /// [`VerifyMode::IgnoreCorrupt`] downgrades corruption to warnings.
    pub fn open_with<P: AsRef<Path>>(path: P, verify: VerifyMode) -> Result<Self> {
        let path = path.as_ref();
        integrity::verify_sidecar(path, verify)?;
        let archive = Archive::open(path)?;
        debug!(path = %path.display(), shape = ?archive.shape(), "opened archive for reading");
        Ok(Self { archive, verify })
    }

    /// Wrap an already-open archive (used by the export paths).
    #[must_use]
    pub const fn from_archive(archive: Archive, verify: VerifyMode) -> Self {
        Self { archive, verify }
    }

    /// Container shape.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.archive.shape()
    }

    /// Trial group names (empty for flat containers).
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        match self.archive.shape() {
            Shape::Grouped => self.archive.group_names(),
            Shape::Flat => Vec::new(),
        }
    }

    /// Dataset keys, from one representative trial in the grouped shape.
    #[must_use]
    pub fn dataset_keys(&self) -> Vec<String> {
        let group = match self.archive.shape() {
            Shape::Grouped => match self.archive.group_names().first() {
                Some(g) => (*g).to_string(),
                None => return Vec::new(),
            },
            Shape::Flat => FLAT_GROUP.to_string(),
        };
        self.archive
            .dataset_keys(&group)
            .into_iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Units attribute for a key, from one representative trial. Statistic
    /// keys report their sibling forward series' units.
    ///
    /// # Errors
    /// [`Error::KeyNotFound`] when no trial carries the key.
    pub fn units(&self, key: &str) -> Result<String> {
        let group = match self.archive.shape() {
            Shape::Grouped => self
                .archive
                .group_names()
                .first()
                .map(|g| (*g).to_string())
                .ok_or_else(|| Error::KeyNotFound {
                    key: key.to_string(),
                    group: None,
                })?,
            Shape::Flat => FLAT_GROUP.to_string(),
        };

        if let Some(units) = self.archive.units_of(&group, key) {
            return Ok(units.to_string());
        }

        // derived statistics carry their sibling forward series' units
        if let ParsedKey::Value { tag, .. } = ParsedKey::parse(key)? {
            if Tag::parse(tag).is_some_and(Tag::is_statistic) {
                if let Some(units) = self.archive.units_of(&group, &sibling_forward(key)) {
                    return Ok(units.to_string());
                }
            }
        }

        Err(Error::KeyNotFound {
            key: key.to_string(),
            group: (self.archive.shape() == Shape::Grouped).then_some(group),
        })
    }

    /// Extract everything the sweep produced for one key.
    ///
    /// # Errors
    /// [`Error::UnknownAggregation`] for unsupported tags,
    /// [`Error::KeyNotFound`] for absent keys, and corruption errors per the
    /// verification mode.
    pub fn column(&self, key: &str) -> Result<Column> {
        match ParsedKey::parse(key)? {
            ParsedKey::Schema { .. } => self.schema_column(key),
            ParsedKey::Bare { .. } => self.grid_column(key),
            ParsedKey::Value { tag, .. } => match Tag::parse(tag) {
                None => Err(Error::UnknownAggregation(tag.to_string())),
                Some(t) if t.is_statistic() => {
                    // flat exports materialize requested statistics; serve
                    // those directly, else derive from the sibling series
                    if self.archive.shape() == Shape::Flat {
                        if let Ok(Dataset {
                            value: StoredValue::Numeric(v),
                            ..
                        }) = self.read(FLAT_GROUP, key)
                        {
                            return Ok(Column::Scalars(v));
                        }
                    }
                    let stat = Stat::from_tag(t).unwrap_or(Stat::Mean);
                    let series = self.forward_series(&sibling_forward(key))?;
                    Ok(Column::Scalars(
                        series.iter().map(|s| stat.reduce(s)).collect(),
                    ))
                }
                Some(Tag::Forward | Tag::Backward | Tag::Climate) => {
                    Ok(Column::Series(self.forward_series(key)?))
                }
                Some(_) => self.scalar_column(key),
            },
        }
    }

    /// Sorted unique numeric values for a key (the axis helper for
    /// [`stats::reshape_grid`]).
    ///
    /// # Errors
    /// [`Error::Export`] for textual columns; extraction errors as for
    /// [`ArchiveReader::column`].
    pub fn unique_values(&self, key: &str) -> Result<Vec<f64>> {
        let column = self.column(key)?;
        if matches!(column, Column::Text(_) | Column::Schema(_)) {
            return Err(Error::Export(format!(
                "unique values require numeric data, but '{key}' is textual"
            )));
        }
        Ok(unique_sorted(column.flatten()))
    }

    fn read(&self, group: &str, key: &str) -> Result<Dataset> {
        match self.verify {
            VerifyMode::Strict => self.archive.read_dataset(group, key),
            VerifyMode::IgnoreCorrupt => self.archive.read_dataset_unverified(group, key),
        }
    }

    /// Schema metadata from one representative trial.
    fn schema_column(&self, key: &str) -> Result<Column> {
        let group = match self.archive.shape() {
            Shape::Grouped => self
                .archive
                .group_names()
                .first()
                .map(|g| (*g).to_string())
                .ok_or_else(|| Error::KeyNotFound {
                    key: key.to_string(),
                    group: None,
                })?,
            Shape::Flat => FLAT_GROUP.to_string(),
        };
        match self.read(&group, key)?.value {
            StoredValue::Text(v) => Ok(Column::Schema(v)),
            other => Err(Error::Archive(format!(
                "schema key '{key}' holds unexpected payload {other:?}"
            ))),
        }
    }

    /// Raw per-trial series for a forward/backward/climate key.
    fn forward_series(&self, key: &str) -> Result<Vec<Vec<f64>>> {
        match self.archive.shape() {
            Shape::Grouped => {
                let mut series = Vec::new();
                for group in self.archive.group_names() {
                    match self.read(group, key)?.value {
                        StoredValue::Numeric(v) => series.push(v),
                        other => {
                            return Err(Error::Archive(format!(
                                "series key '{key}' holds unexpected payload {other:?}"
                            )))
                        }
                    }
                }
                Ok(series)
            }
            Shape::Flat => match self.read(FLAT_GROUP, key)?.value {
                StoredValue::Matrix(rows) => Ok(rows),
                StoredValue::Numeric(v) => Ok(vec![v]),
                other => Err(Error::Archive(format!(
                    "series key '{key}' holds unexpected payload {other:?}"
                ))),
            },
        }
    }

    /// One scalar (or string) per trial, concatenated.
    fn scalar_column(&self, key: &str) -> Result<Column> {
        let mut numbers: Vec<f64> = Vec::new();
        let mut text: Vec<String> = Vec::new();

        let mut absorb = |value: StoredValue| match value {
            StoredValue::Numeric(v) => {
                if text.is_empty() {
                    numbers.extend(v);
                } else {
                    text.extend(v.iter().map(ToString::to_string));
                }
            }
            StoredValue::Text(v) => {
                if !numbers.is_empty() {
                    text.extend(numbers.drain(..).map(|n| n.to_string()));
                }
                text.extend(v);
            }
            StoredValue::Matrix(m) => {
                if text.is_empty() {
                    numbers.extend(m.into_iter().flatten());
                } else {
                    text.extend(m.into_iter().flatten().map(|n| n.to_string()));
                }
            }
        };

        match self.archive.shape() {
            Shape::Grouped => {
                for group in self.archive.group_names() {
                    absorb(self.read(group, key)?.value);
                }
            }
            Shape::Flat => absorb(self.read(FLAT_GROUP, key)?.value),
        }

        if text.is_empty() {
            Ok(Column::Scalars(numbers))
        } else {
            Ok(Column::Text(text))
        }
    }

    /// Per-trial grids for a bare seasonal key.
    fn grid_column(&self, key: &str) -> Result<Column> {
        match self.archive.shape() {
            Shape::Grouped => {
                let mut grids = Vec::new();
                for group in self.archive.group_names() {
                    match self.read(group, key)?.value {
                        StoredValue::Matrix(m) => grids.push(m),
                        other => {
                            return Err(Error::Archive(format!(
                                "grid key '{key}' holds unexpected payload {other:?}"
                            )))
                        }
                    }
                }
                Ok(Column::Grids(grids))
            }
            Shape::Flat => match self.read(FLAT_GROUP, key)?.value {
                StoredValue::Matrix(m) => Ok(Column::Grids(vec![m])),
                other => Err(Error::Archive(format!(
                    "grid key '{key}' holds unexpected payload {other:?}"
                ))),
            },
        }
    }
}
