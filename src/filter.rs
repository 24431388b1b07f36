//! Filtered re-export: project requested keys into a flat container or a
//! delimited text file.
//!
//! Two paths produce the same outputs:
//!
//! - **Fast path**: the archive exists, so open it (verifying integrity)
//!   and extract the requested keys.
//! - **Slow path**: no archive, so re-walk the raw trial directories and
//!   re-run the simulation parser restricted to the requested keys only.
//!   Keys are bucketed by tag first so each bucket drives only its matching
//!   specialized reader, and results stream straight into the flat output,
//!   bypassing the checkpoint/archive machinery entirely.
//!
//! Derived-statistic keys work on both paths: the sibling forward series is
//! parsed (or extracted) and reduced at export time.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::archive::{Archive, Compression, Dataset, GroupData, Shape, StoredValue, FLAT_GROUP};
use crate::config::SweepConfig;
use crate::extract::stats::Stat;
use crate::extract::{ArchiveReader, Column};
use crate::help::HelpDict;
use crate::integrity::{self, VerifyMode};
use crate::key::{sibling_forward, ParsedKey, SchemaKind, Tag};
use crate::parse::{self, KeyFilter, RawValue, SweepContext, TrialData};
use crate::sweep::discover_trials;
use crate::{Error, Result};

/// What a finished export produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// File written
    pub output: PathBuf,
    /// Keys exported, in request order
    pub keys: Vec<String>,
    /// True when served from the archive (fast path)
    pub from_archive: bool,
}

/// Filtered-export job.
#[derive(Debug)]
pub struct FilterJob<'h> {
    config: SweepConfig,
    help: &'h HelpDict,
    verify: VerifyMode,
}

impl<'h> FilterJob<'h> {
    /// New job for a validated config.
    #[must_use]
    pub const fn new(config: SweepConfig, help: &'h HelpDict) -> Self {
        Self {
            config,
            help,
            verify: VerifyMode::Strict,
        }
    }

    /// Integrity handling for the fast path.
    #[must_use]
    pub const fn verify(mut self, verify: VerifyMode) -> Self {
        self.verify = verify;
        self
    }

    /// Run the export.
    ///
    /// # Errors
    /// Fails fast on an empty include list or unknown aggregation tags;
    /// propagates extraction, parse and IO errors.
    pub fn run(&self) -> Result<ExportReport> {
        let keys = self.config.include.clone();
        if keys.is_empty() {
            return Err(Error::Config(
                "saKeyInclude is required for a filtered export".to_string(),
            ));
        }
        let buckets = bucket_keys(&keys)?;

        let columns = if self.config.archive_file.is_file() {
            info!(archive = %self.config.archive_file.display(), "extracting from archive");
            self.columns_from_archive(&keys)?
        } else {
            warn!("archive does not exist; obtaining data from raw trial directories");
            self.columns_from_raw(&keys, &buckets)?
        };
        let from_archive = self.config.archive_file.is_file();

        let output = match output_kind(&self.config) {
            OutputKind::FlatContainer(path) => {
                write_flat_container(&path, &keys, &columns)?;
                path
            }
            OutputKind::Delimited {
                path,
                delimiter,
                header,
            } => {
                write_delimited(&path, &keys, &columns, &delimiter, header)?;
                path
            }
        };

        info!(output = %output.display(), keys = keys.len(), "export complete");
        Ok(ExportReport {
            output,
            keys,
            from_archive,
        })
    }

    /// Fast path: project keys out of the finished archive.
    fn columns_from_archive(&self, keys: &[String]) -> Result<BTreeMap<String, ExportColumn>> {
        let reader = ArchiveReader::open_with(&self.config.archive_file, self.verify)?;
        let mut columns = BTreeMap::new();
        for key in keys {
            let units = reader.units(key).unwrap_or_default();
            columns.insert(
                key.clone(),
                ExportColumn {
                    units,
                    column: reader.column(key)?,
                },
            );
        }
        Ok(columns)
    }

    /// Slow path: restricted re-parse of every trial, bucketed by tag.
    fn columns_from_raw(
        &self,
        keys: &[String],
        buckets: &KeyBuckets,
    ) -> Result<BTreeMap<String, ExportColumn>> {
        let trials = discover_trials(&self.config.dest_folder, self.config.sim_name.as_deref())?;
        let ctx = SweepContext::resolve(&self.config, self.help, &trials[0])?;

        // parsers also need the sibling forward keys behind any statistics
        let mut wanted: Vec<String> = keys.to_vec();
        for key in &buckets.statistics {
            wanted.push(sibling_forward(key));
        }

        let mut flat: BTreeMap<String, FlatColumn> = BTreeMap::new();
        for trial in &trials {
            let data = self.parse_restricted(trial, &ctx, &wanted, buckets)?;
            merge_trial(&mut flat, data)?;
        }

        let mut columns = BTreeMap::new();
        for key in keys {
            let column = export_column(key, &flat, self.help)?;
            columns.insert(key.clone(), column);
        }
        Ok(columns)
    }

    fn parse_restricted(
        &self,
        trial: &Path,
        ctx: &SweepContext<'_>,
        wanted: &[String],
        buckets: &KeyBuckets,
    ) -> Result<TrialData> {
        let filter = KeyFilter::include(wanted.iter().cloned());
        let mut data = TrialData::with_filter(filter);

        if !buckets.log.is_empty() {
            parse::log::parse_into(&trial.join(&ctx.log_file), &mut data)?;
        }
        if !buckets.option.is_empty() {
            for file in &ctx.input_files {
                parse::options::parse_into(&trial.join(file), ctx, &mut data)?;
            }
        }
        if !(buckets.forward.is_empty() && buckets.statistics.is_empty()) {
            self.parse_series_bucket(trial, ctx, SchemaKind::OutputOrder, "forward", Tag::Forward, &mut data)?;
        }
        if !buckets.backward.is_empty() {
            self.parse_series_bucket(trial, ctx, SchemaKind::OutputOrder, "backward", Tag::Backward, &mut data)?;
        }
        if !buckets.climate.is_empty() {
            self.parse_climate_bucket(trial, ctx, &mut data)?;
        }
        Ok(data)
    }

    fn parse_series_bucket(
        &self,
        trial: &Path,
        ctx: &SweepContext<'_>,
        schema_kind: SchemaKind,
        file_kind: &str,
        tag: Tag,
        data: &mut TrialData,
    ) -> Result<()> {
        for body in &ctx.body_names {
            let schema = self.body_schema(trial, ctx, body, schema_kind)?;
            let Some(schema) = schema else { continue };

            let path = trial.join(format!("{}.{body}.{file_kind}", ctx.system_name));
            if !path.is_file() {
                warn!(body, file = %path.display(), "series file absent; skipping");
                continue;
            }
            parse::series::parse_table_into(&path, body, &schema, tag, data)?;
        }
        Ok(())
    }

    fn parse_climate_bucket(
        &self,
        trial: &Path,
        ctx: &SweepContext<'_>,
        data: &mut TrialData,
    ) -> Result<()> {
        for body in &ctx.body_names {
            let schema = self.body_schema(trial, ctx, body, SchemaKind::GridOutputOrder)?;
            if let Some(schema) = schema {
                let path = trial.join(format!("{}.{body}.Climate", ctx.system_name));
                if path.is_file() {
                    parse::series::parse_table_into(&path, body, &schema, Tag::Climate, data)?;
                }
            }
            parse::series::parse_seasonal_into(trial, &ctx.system_name, body, data)?;
        }
        Ok(())
    }

    /// A body's column schema, from a parse restricted to just that key.
    fn body_schema(
        &self,
        trial: &Path,
        ctx: &SweepContext<'_>,
        body: &str,
        kind: SchemaKind,
    ) -> Result<Option<Vec<(String, String)>>> {
        let key = crate::key::schema_key(body, kind);
        let mut heading = TrialData::with_filter(KeyFilter::include([key].into_iter()));
        parse::log::parse_into(&trial.join(&ctx.log_file), &mut heading)?;
        Ok(heading.schema(body, kind).map(<[_]>::to_vec))
    }
}

/// A key's tag-directed bucket assignment.
#[derive(Debug, Default)]
struct KeyBuckets {
    log: Vec<String>,
    option: Vec<String>,
    forward: Vec<String>,
    backward: Vec<String>,
    climate: Vec<String>,
    statistics: Vec<String>,
}

/// Classify requested keys so each bucket drives only its matching reader.
/// Unknown aggregation tags abort before any parsing starts.
fn bucket_keys(keys: &[String]) -> Result<KeyBuckets> {
    let mut buckets = KeyBuckets::default();
    for key in keys {
        match ParsedKey::parse(key)? {
            ParsedKey::Schema { .. } => buckets.log.push(key.clone()),
            ParsedKey::Bare { .. } => buckets.climate.push(key.clone()),
            ParsedKey::Value { tag, .. } => match Tag::parse(tag) {
                None => return Err(Error::UnknownAggregation(tag.to_string())),
                Some(Tag::Initial | Tag::Final) => buckets.log.push(key.clone()),
                Some(Tag::Option) => buckets.option.push(key.clone()),
                Some(Tag::Forward) => buckets.forward.push(key.clone()),
                Some(Tag::Backward) => buckets.backward.push(key.clone()),
                Some(Tag::Climate) => buckets.climate.push(key.clone()),
                Some(t) if t.is_statistic() => buckets.statistics.push(key.clone()),
                Some(_) => unreachable!("tag classification is exhaustive"),
            },
        }
    }
    Ok(buckets)
}

/// One trial-spanning column accumulated on the slow path.
#[derive(Debug)]
enum FlatColumn {
    Scalars { units: String, values: Vec<String> },
    Series { units: String, rows: Vec<Vec<f64>> },
    Schema(Vec<(String, String)>),
}

fn merge_trial(flat: &mut BTreeMap<String, FlatColumn>, data: TrialData) -> Result<()> {
    for (key, value) in data.into_entries() {
        match value {
            RawValue::Scalars { units, values } => match flat
                .entry(key)
                .or_insert_with(|| FlatColumn::Scalars {
                    units,
                    values: Vec::new(),
                }) {
                FlatColumn::Scalars { values: all, .. } => all.extend(values),
                _ => return Err(Error::Export("key shape changed between trials".to_string())),
            },
            RawValue::Series { units, values } => match flat
                .entry(key)
                .or_insert_with(|| FlatColumn::Series {
                    units,
                    rows: Vec::new(),
                }) {
                FlatColumn::Series { rows, .. } => rows.push(values),
                _ => return Err(Error::Export("key shape changed between trials".to_string())),
            },
            RawValue::Grid { .. } => {
                return Err(Error::Export(
                    "seasonal grid keys cannot be flattened across trials".to_string(),
                ));
            }
            RawValue::Schema(pairs) => {
                flat.entry(key).or_insert(FlatColumn::Schema(pairs));
            }
        }
    }
    Ok(())
}

/// A finished export column: units plus extracted data.
#[derive(Debug)]
struct ExportColumn {
    units: String,
    column: Column,
}

/// Turn accumulated slow-path data into the export column for one key.
fn export_column(
    key: &str,
    flat: &BTreeMap<String, FlatColumn>,
    help: &HelpDict,
) -> Result<ExportColumn> {
    if let ParsedKey::Value { tag, .. } = ParsedKey::parse(key)? {
        if let Some(stat) = Tag::parse(tag).and_then(Stat::from_tag) {
            let sibling = sibling_forward(key);
            let Some(FlatColumn::Series { units, rows }) = flat.get(&sibling) else {
                return Err(Error::KeyNotFound {
                    key: sibling,
                    group: None,
                });
            };
            return Ok(ExportColumn {
                units: units.clone(),
                column: Column::Scalars(rows.iter().map(|r| stat.reduce(r)).collect()),
            });
        }
    }

    match flat.get(key) {
        Some(FlatColumn::Scalars { units, values }) => {
            let textual = ParsedKey::parse(key)
                .map(|k| help.is_textual(k.variable()))
                .unwrap_or(false);
            let parsed: Option<Vec<f64>> = if textual {
                None
            } else {
                values.iter().map(|v| v.parse::<f64>().ok()).collect()
            };
            let column = match parsed {
                Some(numbers) => Column::Scalars(numbers),
                None => Column::Text(values.clone()),
            };
            Ok(ExportColumn {
                units: units.clone(),
                column,
            })
        }
        Some(FlatColumn::Series { units, rows }) => Ok(ExportColumn {
            units: units.clone(),
            column: Column::Series(rows.clone()),
        }),
        Some(FlatColumn::Schema(pairs)) => {
            let mut out = Vec::with_capacity(pairs.len() * 2);
            for (name, unit) in pairs {
                out.push(name.clone());
                out.push(unit.clone());
            }
            Ok(ExportColumn {
                units: String::new(),
                column: Column::Schema(out),
            })
        }
        None => Err(Error::KeyNotFound {
            key: key.to_string(),
            group: None,
        }),
    }
}

enum OutputKind {
    FlatContainer(PathBuf),
    Delimited {
        path: PathBuf,
        delimiter: String,
        header: bool,
    },
}

/// Ulysses exports force a comma-delimited, headered `User.csv`; container
/// extensions select the flat container; anything else is delimited text.
fn output_kind(config: &SweepConfig) -> OutputKind {
    if config.ulysses {
        let dir = config
            .output_name
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        return OutputKind::Delimited {
            path: dir.join("User.csv"),
            delimiter: ",".to_string(),
            header: true,
        };
    }
    let ext = config
        .output_name
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    if ext == "bpf" || ext == "bpl" {
        OutputKind::FlatContainer(config.output_name.clone())
    } else {
        OutputKind::Delimited {
            path: config.output_name.clone(),
            delimiter: config.delimiter.clone(),
            header: config.header,
        }
    }
}

/// Write the flat-shape container (+ sidecar hash) for the exported keys.
fn write_flat_container(
    path: &Path,
    keys: &[String],
    columns: &BTreeMap<String, ExportColumn>,
) -> Result<()> {
    let mut datasets = GroupData::new();
    for key in keys {
        let Some(export) = columns.get(key) else {
            continue;
        };
        let value = match &export.column {
            Column::Scalars(v) => StoredValue::Numeric(v.clone()),
            Column::Text(v) | Column::Schema(v) => StoredValue::Text(v.clone()),
            Column::Series(rows) => StoredValue::Matrix(rows.clone()),
            Column::Grids(_) => {
                return Err(Error::Export(format!(
                    "grid key '{key}' cannot be stored in a flat container"
                )));
            }
        };
        datasets.insert(
            key.clone(),
            Dataset {
                units: export.units.clone(),
                value,
            },
        );
    }

    let mut archive = Archive::create(path, Shape::Flat, Compression::Lz4)?;
    archive.write_group(FLAT_GROUP, &datasets)?;
    drop(archive);
    integrity::write_sidecar(path)?;
    Ok(())
}

/// Write a delimited text file: one row per trial, one column per key.
fn write_delimited(
    path: &Path,
    keys: &[String],
    columns: &BTreeMap<String, ExportColumn>,
    delimiter: &str,
    header: bool,
) -> Result<()> {
    if delimiter.is_empty() {
        return Err(Error::Export("delimiter cannot be empty".to_string()));
    }

    let mut cells: Vec<Vec<String>> = Vec::with_capacity(keys.len());
    let mut units: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(export) = columns.get(key) else {
            return Err(Error::KeyNotFound {
                key: key.clone(),
                group: None,
            });
        };
        let column = match &export.column {
            Column::Scalars(v) => v.iter().map(|n| format_cell(*n)).collect(),
            Column::Text(v) => v.clone(),
            _ => {
                return Err(Error::Export(format!(
                    "key '{key}' is not scalar-valued; only per-trial scalars fit a delimited export"
                )));
            }
        };
        units.push(export.units.clone());
        cells.push(column);
    }

    let rows = cells.first().map_or(0, Vec::len);
    if cells.iter().any(|c| c.len() != rows) {
        return Err(Error::Export(
            "columns have mismatched lengths; cannot tabulate".to_string(),
        ));
    }

    let mut file = File::create(path)?;
    if header {
        let head: Vec<String> = keys
            .iter()
            .zip(&units)
            .map(|(k, u)| format!("{k}[{u}]"))
            .collect();
        writeln!(file, "{}", head.join(delimiter))?;
    }
    for row in 0..rows {
        let line: Vec<&str> = cells.iter().map(|c| c[row].as_str()).collect();
        writeln!(file, "{}", line.join(delimiter))?;
    }
    file.flush()?;
    Ok(())
}

/// Scalars print like the source text where possible (no trailing `.0` noise
/// for integral values keeps diffs against simulator output readable).
fn format_cell(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_keys_by_tag() {
        let keys = vec![
            "earth:TMan:final".to_string(),
            "earth:dSemi:option".to_string(),
            "earth:TMan:forward".to_string(),
            "earth:TMan:mean".to_string(),
            "earth:Temp:backward".to_string(),
            "earth:DailyInsol:climate".to_string(),
            "earth:OutputOrder".to_string(),
            "earth:SeasonalTemp".to_string(),
        ];
        let buckets = bucket_keys(&keys).expect("buckets");
        assert_eq!(buckets.log, vec!["earth:TMan:final", "earth:OutputOrder"]);
        assert_eq!(buckets.option, vec!["earth:dSemi:option"]);
        assert_eq!(buckets.forward, vec!["earth:TMan:forward"]);
        assert_eq!(buckets.statistics, vec!["earth:TMan:mean"]);
        assert_eq!(buckets.backward, vec!["earth:Temp:backward"]);
        assert_eq!(
            buckets.climate,
            vec!["earth:DailyInsol:climate", "earth:SeasonalTemp"]
        );
    }

    #[test]
    fn test_bucket_keys_rejects_unknown_tag() {
        let err = bucket_keys(&["earth:TMan:rms".to_string()]).unwrap_err();
        assert!(matches!(err, Error::UnknownAggregation(_)));
    }

    #[test]
    fn test_write_delimited_rejects_empty_delimiter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.txt");
        let err = write_delimited(&path, &[], &BTreeMap::new(), "", false).unwrap_err();
        assert!(matches!(err, Error::Export(_)));
    }

    #[test]
    fn test_write_delimited_basic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let keys = vec!["earth:TMan:final".to_string(), "earth:TCore:final".to_string()];
        let mut columns = BTreeMap::new();
        columns.insert(
            keys[0].clone(),
            ExportColumn {
                units: "K".to_string(),
                column: Column::Scalars(vec![2900.0, 3000.0]),
            },
        );
        columns.insert(
            keys[1].clone(),
            ExportColumn {
                units: "K".to_string(),
                column: Column::Scalars(vec![5500.0, 5600.0]),
            },
        );
        write_delimited(&path, &keys, &columns, ",", true).expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(
            text,
            "earth:TMan:final[K],earth:TCore:final[K]\n2900.0,5500.0\n3000.0,5600.0\n"
        );
    }

    #[test]
    fn test_write_delimited_rejects_series_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let keys = vec!["earth:TMan:forward".to_string()];
        let mut columns = BTreeMap::new();
        columns.insert(
            keys[0].clone(),
            ExportColumn {
                units: "K".to_string(),
                column: Column::Series(vec![vec![1.0]]),
            },
        );
        let err = write_delimited(&path, &keys, &columns, ",", false).unwrap_err();
        assert!(matches!(err, Error::Export(_)));
    }

    #[test]
    fn test_output_kind_selection() {
        let base = "sDestFolder d\nsPrimaryFile vpl.in\n";
        let cfg = |extra: &str| {
            SweepConfig::from_str_at(&format!("{base}{extra}"), Path::new("/w/s.in"))
                .expect("config")
        };

        match output_kind(&cfg("sOutputName out.bpf\n")) {
            OutputKind::FlatContainer(p) => assert_eq!(p, Path::new("/w/out.bpf")),
            OutputKind::Delimited { .. } => panic!("expected container"),
        }
        match output_kind(&cfg("sOutputName out.txt\n")) {
            OutputKind::Delimited { path, .. } => assert_eq!(path, Path::new("/w/out.txt")),
            OutputKind::FlatContainer(_) => panic!("expected delimited"),
        }
        match output_kind(&cfg("bUlysses 1\n")) {
            OutputKind::Delimited {
                path,
                delimiter,
                header,
            } => {
                assert_eq!(path, Path::new("/w/User.csv"));
                assert_eq!(delimiter, ",");
                assert!(header);
            }
            OutputKind::FlatContainer(_) => panic!("expected delimited"),
        }
    }
}
