//! Help dictionary: option metadata parsed from the simulator's
//! self-documentation output.
//!
//! The simulator describes every input option it accepts (type, physical
//! dimension, default value, optional custom unit). That text is parsed once,
//! before any worker starts, and the resulting [`HelpDict`] is shared
//! read-only for the duration of the run; parsers receive it explicitly as a
//! parameter, never through globals.
//!
//! Input format (external, parsed as emitted):
//!
//! ```text
//!  **dSemi
//!    Type             | Double
//!    Dimension(s)     | length
//!    Custom unit      | AU
//!    Default value    | 1.0
//! ```
//!
//! An entry begins at a line whose trimmed text starts with `**`. Field lines
//! are recognized by substring (`Type`, `Custom unit`, `Dimension(s)`,
//! `Default value`) and take the text after the last `|`. Parsing stops at a
//! line containing `Output Parameters`.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{Error, Result};

/// Declared type of a simulator option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionType {
    /// Boolean flag
    Bool,
    /// Integer scalar
    Int,
    /// Floating-point scalar
    Double,
    /// Free-form string
    String,
    /// Whitespace-separated list of strings
    StringArray,
    /// Anything the current simulator version emits that we do not model
    Other(std::string::String),
}

impl OptionType {
    fn parse(raw: &str) -> Self {
        match raw {
            "Bool" | "Boolean" => Self::Bool,
            "Int" | "Integer" => Self::Int,
            "Double" => Self::Double,
            "String" => Self::String,
            "String-Array" | "Array of Strings" => Self::StringArray,
            other => Self::Other(other.to_string()),
        }
    }

    /// True when values of this type are stored as strings rather than floats.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::StringArray)
    }
}

/// Metadata for a single simulator option.
#[derive(Debug, Clone, Default)]
pub struct HelpEntry {
    /// Declared option type, when the help text carried one
    pub option_type: Option<OptionType>,
    /// Physical dimension string, e.g. `length` or `mass*length^2*time^-2`
    pub dimension: Option<String>,
    /// Compiled-in default value
    pub default_value: Option<String>,
    /// Unit used when the option is given a negative sentinel value
    pub custom_unit: Option<String>,
}

/// Immutable option-name → metadata map, shared read-only across workers.
#[derive(Debug, Clone, Default)]
pub struct HelpDict {
    entries: FxHashMap<String, HelpEntry>,
}

impl HelpDict {
    /// Parse the simulator's self-documentation text.
    ///
    /// Unrecognized lines are skipped; an empty result is legal (a sweep with
    /// no help text degrades to dimensionless units everywhere).
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut entries: FxHashMap<String, HelpEntry> = FxHashMap::default();
        let mut current: Option<String> = None;

        for line in text.lines() {
            if line.contains("Output Parameters") {
                break;
            }
            let trimmed = line.trim();
            if let Some(name) = trimmed.strip_prefix("**") {
                let name = name.trim_matches('*').trim().to_string();
                if !name.is_empty() {
                    entries.entry(name.clone()).or_default();
                    current = Some(name);
                }
                continue;
            }

            let Some(ref option) = current else { continue };
            let Some(value) = field_value(line) else { continue };
            let entry = entries
                .entry(option.clone())
                .or_default();

            // Substring matching mirrors the emitted table; order matters only
            // in that "Custom unit" must be tested before the bare "unit".
            if line.contains("Custom unit") {
                entry.custom_unit = Some(value);
            } else if line.contains("Dimension(s)") {
                entry.dimension = Some(value);
            } else if line.contains("Default value") {
                entry.default_value = Some(value);
            } else if line.contains("Type") {
                entry.option_type = Some(OptionType::parse(&value));
            }
        }

        debug!(options = entries.len(), "parsed help dictionary");
        Self { entries }
    }

    /// Load and parse a captured self-documentation file.
    ///
    /// # Errors
    /// Returns [`Error::Help`] if the file cannot be read.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Help(format!(
                "cannot read help text {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self::parse(&text))
    }

    /// Look up one option's metadata.
    #[must_use]
    pub fn get(&self, option: &str) -> Option<&HelpEntry> {
        self.entries.get(option)
    }

    /// Number of options described.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no options are described.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The compiled-in default unit for a base dimension directive such as
    /// `sUnitLength`. Last tier of the unit-resolution cascade.
    #[must_use]
    pub fn default_unit(&self, directive: &str) -> Option<&str> {
        self.entries
            .get(directive)
            .and_then(|e| e.default_value.as_deref())
    }

    /// True when the option's declared type stores as text rather than floats.
    /// Options absent from the dictionary default to numeric storage.
    #[must_use]
    pub fn is_textual(&self, option: &str) -> bool {
        self.entries
            .get(option)
            .and_then(|e| e.option_type.as_ref())
            .is_some_and(OptionType::is_textual)
    }
}

/// Text after the last `|` on a field line, if any.
fn field_value(line: &str) -> Option<String> {
    let (_, value) = line.rsplit_once('|')?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
