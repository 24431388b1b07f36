//! Option-file parser.
//!
//! Each trial carries the simulator input files it ran with. Every
//! `key value` pair becomes `body:key:option`, where the body is the file
//! stem. `#` starts a comment, `$` continues a line, and list-valued options
//! drop the per-token `-` exclusion marker the simulator uses to suppress
//! default columns.

use std::fs;
use std::path::Path;

use crate::key::{value_key, Tag};
use crate::parse::units::{UnitOverrides, UnitResolver};
use crate::parse::{SweepContext, TrialData};
use crate::{Error, Result};

/// Parse one option file into the trial dictionary.
///
/// # Errors
/// Returns [`Error::Parse`] if the file (or the primary file needed for
/// unit overrides) cannot be read.
pub fn parse_into(path: &Path, ctx: &SweepContext<'_>, data: &mut TrialData) -> Result<()> {
    let text = read(path)?;

    let body = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    // Unit overrides: this file, then the primary file, then help defaults.
    let file_overrides = UnitOverrides::scan(&text);
    let primary_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&ctx.primary_file);
    let primary_overrides = if primary_path == path || !primary_path.is_file() {
        UnitOverrides::default()
    } else {
        UnitOverrides::scan(&read(&primary_path)?)
    };
    let resolver = UnitResolver::new(ctx.help, &file_overrides, &primary_overrides);

    for line in logical_lines(&text) {
        let mut tokens = line.split_whitespace();
        let (Some(key), Some(first)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let key: String = key.chars().filter(|c| *c != '-').collect();
        if key.is_empty() {
            continue;
        }

        let units = resolver.resolve(&key, first);
        let key_name = value_key(&body, &key, Tag::Option);

        if is_list_option(&key, ctx) {
            for token in std::iter::once(first).chain(tokens) {
                data.push_scalar(&key_name, &units, token.trim_start_matches('-'));
            }
        } else {
            data.push_scalar(&key_name, &units, first);
        }
    }
    Ok(())
}

/// List-valued options keep every token; scalars keep only the first.
/// The simulator's string-array options follow the `sa` naming convention,
/// which also covers options missing from the help dictionary.
fn is_list_option(key: &str, ctx: &SweepContext<'_>) -> bool {
    ctx.help
        .get(key)
        .and_then(|e| e.option_type.as_ref())
        .map_or_else(
            || key.starts_with("sa"),
            |t| matches!(t, crate::help::OptionType::StringArray),
        )
}

/// Strip comments and splice `$` line continuations.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.split('#').next().unwrap_or("").trim_end();

        if let Some(head) = line.split('$').next().filter(|_| line.contains('$')) {
            pending.push_str(head);
            pending.push(' ');
            continue;
        }

        if pending.is_empty() {
            lines.push(line.to_string());
        } else {
            pending.push_str(line);
            lines.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        lines.push(pending);
    }
    lines
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        reason: format!("cannot read option file: {e}"),
    })
}
