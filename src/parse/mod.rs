//! Per-trial simulation parser.
//!
//! Four sub-parsers feed one flat key → value dictionary per trial:
//!
//! - [`log`]: the simulator log (scoped scalar sections + column schemas)
//! - [`options`]: input option files, with unit resolution via [`units`]
//! - [`series`]: forward/backward/climate tables and seasonal grid files
//!
//! Everything a parser needs travels as an explicit parameter (the trial
//! directory, the shared read-only [`HelpDict`], the sweep naming context),
//! never through process state. An optional include list (or exclude list)
//! restricts which keys are retained at insert time.

pub mod log;
pub mod options;
pub mod series;
pub mod units;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::SweepConfig;
use crate::help::HelpDict;
use crate::key::{schema_key, value_key, SchemaKind, Tag};
use crate::Result;

/// A value as the parsers produce it, before the archive writer picks a
/// stored representation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Scalar text values from the log or an option file (appended in
    /// encounter order; almost always a single element)
    Scalars {
        /// Resolved units
        units: String,
        /// Values as written in the source file
        values: Vec<String>,
    },
    /// One column of a forward/backward/climate table. Seeded as an empty
    /// stub by the schema declaration, filled when the table is parsed.
    Series {
        /// Units from the matching schema entry
        units: String,
        /// Column values
        values: Vec<f64>,
    },
    /// A seasonal grid file, stored transposed (rows are file columns)
    Grid {
        /// Units from the static seasonal table
        units: String,
        /// Transposed table
        rows: Vec<Vec<f64>>,
    },
    /// An ordered (name, unit) column schema
    Schema(Vec<(String, String)>),
}

/// Include/exclude key filter applied at insert time.
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    include: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
}

impl KeyFilter {
    /// Admit every key.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Admit only the listed keys.
    #[must_use]
    pub fn include<I: IntoIterator<Item = String>>(keys: I) -> Self {
        Self {
            include: Some(keys.into_iter().collect()),
            exclude: BTreeSet::new(),
        }
    }

    /// Admit everything except the listed keys.
    #[must_use]
    pub fn exclude<I: IntoIterator<Item = String>>(keys: I) -> Self {
        Self {
            include: None,
            exclude: keys.into_iter().collect(),
        }
    }

    /// Does the filter admit this key?
    #[must_use]
    pub fn admits(&self, key: &str) -> bool {
        if self.exclude.contains(key) {
            return false;
        }
        match &self.include {
            Some(keys) => keys.contains(key),
            None => true,
        }
    }
}

/// One trial's flat key → value dictionary.
#[derive(Debug, Clone, Default)]
pub struct TrialData {
    entries: BTreeMap<String, RawValue>,
    filter: KeyFilter,
}

impl TrialData {
    /// Empty dictionary admitting every key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty dictionary with an insert-time key filter.
    #[must_use]
    pub fn with_filter(filter: KeyFilter) -> Self {
        Self {
            entries: BTreeMap::new(),
            filter,
        }
    }

    /// Number of retained keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.entries.get(key)
    }

    /// True when a key was retained.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawValue)> {
        self.entries.iter()
    }

    /// Consume into the underlying map.
    #[must_use]
    pub fn into_entries(self) -> BTreeMap<String, RawValue> {
        self.entries
    }

    /// Append a scalar; creates the entry (with units) on first sight.
    pub fn push_scalar(&mut self, key: &str, units: &str, value: &str) {
        if !self.filter.admits(key) {
            return;
        }
        match self.entries.get_mut(key) {
            Some(RawValue::Scalars { values, .. }) => values.push(value.to_string()),
            Some(_) => warn!(key, "scalar value for a non-scalar key; dropped"),
            None => {
                self.entries.insert(
                    key.to_string(),
                    RawValue::Scalars {
                        units: units.to_string(),
                        values: vec![value.to_string()],
                    },
                );
            }
        }
    }

    /// Seed an empty series stub carrying only units; no-op if present.
    pub fn seed_series(&mut self, key: &str, units: &str) {
        if !self.filter.admits(key) || self.entries.contains_key(key) {
            return;
        }
        self.entries.insert(
            key.to_string(),
            RawValue::Series {
                units: units.to_string(),
                values: Vec::new(),
            },
        );
    }

    /// Fill a series column (stub units win if the stub exists).
    pub fn set_series(&mut self, key: &str, units: &str, column: Vec<f64>) {
        if !self.filter.admits(key) {
            return;
        }
        match self.entries.get_mut(key) {
            Some(RawValue::Series { values, .. }) => *values = column,
            Some(_) => warn!(key, "series column for a non-series key; dropped"),
            None => {
                self.entries.insert(
                    key.to_string(),
                    RawValue::Series {
                        units: units.to_string(),
                        values: column,
                    },
                );
            }
        }
    }

    /// Store a seasonal grid; first write wins.
    pub fn set_grid(&mut self, key: &str, units: &str, rows: Vec<Vec<f64>>) {
        if !self.filter.admits(key) || self.entries.contains_key(key) {
            return;
        }
        self.entries.insert(
            key.to_string(),
            RawValue::Grid {
                units: units.to_string(),
                rows,
            },
        );
    }

    /// Store a column schema; first write wins.
    pub fn set_schema(&mut self, key: &str, pairs: Vec<(String, String)>) {
        if !self.filter.admits(key) || self.entries.contains_key(key) {
            return;
        }
        self.entries.insert(key.to_string(), RawValue::Schema(pairs));
    }

    /// Schema pairs for a body, when retained.
    #[must_use]
    pub fn schema(&self, body: &str, kind: SchemaKind) -> Option<&[(String, String)]> {
        match self.entries.get(&schema_key(body, kind)) {
            Some(RawValue::Schema(pairs)) => Some(pairs.as_slice()),
            _ => None,
        }
    }
}

/// Sweep-wide naming context shared by every trial parse.
#[derive(Debug, Clone)]
pub struct SweepContext<'h> {
    /// System name from the primary file
    pub system_name: String,
    /// Body names in body-file order
    pub body_names: Vec<String>,
    /// Log file name within each trial
    pub log_file: String,
    /// Input file names (bodies then primary)
    pub input_files: Vec<String>,
    /// Primary file name
    pub primary_file: String,
    /// Shared read-only help dictionary
    pub help: &'h HelpDict,
}

impl<'h> SweepContext<'h> {
    /// Resolve the context from one representative trial.
    ///
    /// # Errors
    /// Propagates name-resolution failures ([`Error::Parse`]).
    pub fn resolve(
        config: &SweepConfig,
        help: &'h HelpDict,
        representative: &Path,
    ) -> Result<Self> {
        let input_files = config.input_files();
        let (system_name, body_names) =
            crate::sweep::resolve_names(representative, &input_files, &config.primary_file)?;
        let log_file = crate::sweep::resolve_log_name(representative, &input_files, &system_name);
        Ok(Self {
            system_name,
            body_names,
            log_file,
            input_files,
            primary_file: config.primary_file.clone(),
            help,
        })
    }

    /// Body name owning the primary file's options (its file stem).
    #[must_use]
    pub fn primary_body(&self) -> &str {
        self.primary_file
            .split('.')
            .next()
            .unwrap_or(&self.primary_file)
    }
}

/// Direction of a body's time series, from the primary file's options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeriesDirection {
    Forward,
    Backward,
}

impl SeriesDirection {
    const fn tag(self) -> Tag {
        match self {
            Self::Forward => Tag::Forward,
            Self::Backward => Tag::Backward,
        }
    }

    const fn file_kind(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Parse one trial into its flat dictionary.
///
/// Sub-parser order matters: option files first (they supply unit overrides
/// and the forward/backward switches), then the log (scalars + schemas +
/// series stubs), then every series and grid file the schemas call for.
///
/// # Errors
/// Returns [`Error::Parse`] if the log or an option file is missing or
/// malformed, or a series table cannot be read. Missing series files are
/// skipped with a warning (bodies may declare schemas without producing
/// output).
pub fn gather_trial(trial: &Path, ctx: &SweepContext<'_>, filter: KeyFilter) -> Result<TrialData> {
    let mut data = TrialData::with_filter(filter);

    for file in &ctx.input_files {
        options::parse_into(&trial.join(file), ctx, &mut data)?;
    }
    log::parse_into(&trial.join(&ctx.log_file), &mut data)?;

    for body in &ctx.body_names {
        gather_body_series(trial, ctx, body, &mut data)?;
    }

    debug!(trial = %trial.display(), keys = data.len(), "gathered trial");
    Ok(data)
}

fn gather_body_series(
    trial: &Path,
    ctx: &SweepContext<'_>,
    body: &str,
    data: &mut TrialData,
) -> Result<()> {
    if let Some(pairs) = data.schema(body, SchemaKind::OutputOrder).map(<[_]>::to_vec) {
        let Some(direction) = series_direction(ctx, data) else {
            warn!(body, "schema declared but neither bDoForward nor bDoBackward set; skipping");
            return Ok(());
        };
        let file_name = data
            .get(&value_key(body, "sOutFile", Tag::Option))
            .and_then(first_scalar)
            .unwrap_or_else(|| {
                format!("{}.{body}.{}", ctx.system_name, direction.file_kind())
            });
        let path = trial.join(&file_name);
        if path.is_file() {
            series::parse_table_into(&path, body, &pairs, direction.tag(), data)?;
        } else {
            warn!(body, file = %path.display(), "series file absent; keeping empty stubs");
        }
    }

    if let Some(pairs) = data
        .schema(body, SchemaKind::GridOutputOrder)
        .map(<[_]>::to_vec)
    {
        let climate_name = format!("{}.{body}.Climate", ctx.system_name);
        let path = trial.join(&climate_name);
        if path.is_file() {
            series::parse_table_into(&path, body, &pairs, Tag::Climate, data)?;
        } else {
            warn!(body, file = %path.display(), "climate file absent; keeping empty stubs");
        }
        series::parse_seasonal_into(trial, &ctx.system_name, body, data)?;
    }
    Ok(())
}

fn series_direction(ctx: &SweepContext<'_>, data: &TrialData) -> Option<SeriesDirection> {
    let primary = ctx.primary_body();
    if data.contains(&value_key(primary, "bDoForward", Tag::Option)) {
        Some(SeriesDirection::Forward)
    } else if data.contains(&value_key(primary, "bDoBackward", Tag::Option)) {
        Some(SeriesDirection::Backward)
    } else {
        None
    }
}

fn first_scalar(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Scalars { values, .. } => values.first().cloned(),
        _ => None,
    }
}
