//! Simulator log parser.
//!
//! The log interleaves scalar property sections with column-schema
//! declarations. A small finite-state machine tracks the current scope:
//!
//! ```text
//! ---- INITIAL SYSTEM PROPERTIES ----     -> SystemInitial
//! ----- BODY: earth ----                  -> Body("earth"), phase retained
//! (TMan) Upper Mantle Temperature [K]: 3000.0
//! Output Order: Time [sec] TMan [K]
//! ---- FINAL SYSTEM PROPERTIES ----       -> SystemFinal
//! ```
//!
//! `(Name) Description [unit]: value` lines append to `body:Name:phase`.
//! `Output Order:` / `Grid Output Order:` lines record the ordered
//! (name, unit) schema for the current body and seed empty series stubs for
//! each named column. Line categories are tested in a fixed order and the
//! later rule wins on ambiguous lines.

use std::fs;
use std::path::Path;

use crate::key::{schema_key, value_key, SchemaKind, Tag};
use crate::parse::TrialData;
use crate::{Error, Result};

/// Scalar phase: which properties section the cursor is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Before any section header; values here are unreachable in practice
    Preamble,
    Initial,
    Final,
}

impl Phase {
    const fn tag(self) -> Tag {
        match self {
            // later rules always move the cursor out of the preamble before a
            // value line can land there; Initial is the safe default
            Self::Preamble | Self::Initial => Tag::Initial,
            Self::Final => Tag::Final,
        }
    }
}

/// Parser state: phase plus the body owning subsequent lines.
#[derive(Debug)]
struct LogState {
    phase: Phase,
    body: String,
}

/// One line, classified.
#[derive(Debug, PartialEq)]
enum LineKind<'a> {
    Blank,
    SectionHeader(&'a str),
    Value(&'a str),
    OutputOrder(&'a str),
    GridOutputOrder(&'a str),
    Other,
}

fn classify(line: &str) -> LineKind<'_> {
    if line.is_empty() {
        LineKind::Blank
    } else if line.starts_with('-') {
        LineKind::SectionHeader(line)
    } else if line.starts_with('(') {
        LineKind::Value(line)
    } else if let Some(rest) = header_payload(line, "Grid Output Order") {
        LineKind::GridOutputOrder(rest)
    } else if let Some(rest) = header_payload(line, "Output Order") {
        LineKind::OutputOrder(rest)
    } else {
        LineKind::Other
    }
}

/// `prefix: payload` with a non-empty payload.
fn header_payload<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    let rest = rest.strip_prefix(':')?.trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Parse a log file into the trial dictionary.
///
/// # Errors
/// Returns [`Error::Parse`] if the file cannot be read; unrecognized lines
/// are skipped.
pub fn parse_into(path: &Path, data: &mut TrialData) -> Result<()> {
    let text = fs::read_to_string(path).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        reason: format!("cannot read log file: {e}"),
    })?;

    let mut state = LogState {
        phase: Phase::Preamble,
        body: "system".to_string(),
    };

    for raw in text.lines() {
        let line = raw.trim();
        match classify(line) {
            LineKind::Blank | LineKind::Other => {}
            LineKind::SectionHeader(header) => apply_header(header, &mut state),
            LineKind::Value(line) => record_value(line, &state, data),
            LineKind::OutputOrder(payload) => record_schema(
                payload,
                &state.body,
                SchemaKind::OutputOrder,
                Tag::Forward,
                data,
            ),
            LineKind::GridOutputOrder(payload) => record_schema(
                payload,
                &state.body,
                SchemaKind::GridOutputOrder,
                Tag::Climate,
                data,
            ),
        }
    }
    Ok(())
}

/// Section headers are dash-framed; squeezing out dashes and colons leaves
/// the words that name the section.
fn apply_header(line: &str, state: &mut LogState) {
    let cleaned: Vec<&str> = line
        .split(|c| c == '-' || c == ':' || c == ' ')
        .filter(|t| !t.is_empty())
        .collect();

    match cleaned.as_slice() {
        ["INITIAL", "SYSTEM", "PROPERTIES", ..] => state.phase = Phase::Initial,
        ["FINAL", "SYSTEM", "PROPERTIES", ..] => {
            state.phase = Phase::Final;
            state.body = "system".to_string();
        }
        ["BODY", name, ..] => state.body = (*name).to_string(),
        _ => {}
    }
}

/// `(Name) Description [unit]: value`
fn record_value(line: &str, state: &LogState, data: &mut TrialData) {
    let Some(close) = line.find(')') else { return };
    let name = line[1..close].trim();
    if name.is_empty() {
        return;
    }

    let units = match (line.find('['), line.find(']')) {
        (Some(open), Some(end)) if open < end => line[open + 1..end].trim(),
        _ => "",
    };
    let units = if units.is_empty() { "nd" } else { units };

    let Some(colon) = line[close..].find(':').map(|i| close + i) else {
        return;
    };
    let value = line[colon + 1..].trim();

    let key = value_key(&state.body, name, state.phase.tag());
    data.push_scalar(&key, units, value);
}

/// Parse `Output Order: Time [sec] TMan [K] ...` into bracket-terminated
/// (name, unit) pairs. Each named column also seeds an empty series stub so the key (and
/// its units) exist even when the series file is missing or filtered.
fn record_schema(
    payload: &str,
    body: &str,
    kind: SchemaKind,
    stub_tag: Tag,
    data: &mut TrialData,
) {
    let mut pairs = Vec::new();
    for piece in payload.split(']') {
        let (name, unit) = match piece.split_once('[') {
            Some((name, unit)) => (name.trim(), unit.trim()),
            None => (piece.trim(), ""),
        };
        if name.is_empty() {
            continue;
        }
        let unit = if unit.is_empty() { "nd" } else { unit };
        pairs.push((name.to_string(), unit.to_string()));
        data.seed_series(&value_key(body, name, stub_tag), unit);
    }

    if !pairs.is_empty() {
        data.set_schema(&schema_key(body, kind), pairs);
    }
}
