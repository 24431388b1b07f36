//! Typed datasets as stored in the archive container.
//!
//! A dataset is a units string plus one payload. Representation is chosen at
//! write time, per key: column schemas become string arrays with no unit
//! attribute; scalar values from logs and option files become numeric arrays
//! unless the help dictionary declares a textual type; series columns and
//! seasonal grids are always numeric.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::help::HelpDict;
use crate::key::ParsedKey;
use crate::parse::RawValue;

/// Dataset payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    /// String array (schemas, textual options, unparseable scalars)
    Text(Vec<String>),
    /// Numeric array (scalars across appends, series columns)
    Numeric(Vec<f64>),
    /// Numeric matrix (seasonal grids, flat-exported series)
    Matrix(Vec<Vec<f64>>),
}

impl StoredValue {
    /// Number of top-level elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(v) => v.len(),
            Self::Numeric(v) => v.len(),
            Self::Matrix(v) => v.len(),
        }
    }

    /// True when the payload holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One archived dataset: payload plus units attribute.
///
/// Schema datasets carry an empty units string (the container has no notion
/// of an absent attribute; readers treat empty as "none").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Resolved units string, immutable after parse time
    pub units: String,
    /// Payload
    pub value: StoredValue,
}

impl Dataset {
    /// Build a dataset from a parser value, choosing the stored
    /// representation for `key`.
    ///
    /// Scalars declared numeric (or absent from the help dictionary) are
    /// parsed to floats; if any token refuses to parse the whole dataset
    /// falls back to text storage so no data is dropped.
    #[must_use]
    pub fn from_raw(key: &str, raw: RawValue, help: &HelpDict) -> Self {
        match raw {
            RawValue::Schema(pairs) => {
                let mut flat = Vec::with_capacity(pairs.len() * 2);
                for (name, unit) in pairs {
                    flat.push(name);
                    flat.push(unit);
                }
                Self {
                    units: String::new(),
                    value: StoredValue::Text(flat),
                }
            }
            RawValue::Scalars { units, values } => {
                let textual = ParsedKey::parse(key)
                    .map(|k| help.is_textual(k.variable()))
                    .unwrap_or(false);
                if textual {
                    return Self {
                        units,
                        value: StoredValue::Text(values),
                    };
                }
                let parsed: Option<Vec<f64>> =
                    values.iter().map(|v| v.parse::<f64>().ok()).collect();
                match parsed {
                    Some(numbers) => Self {
                        units,
                        value: StoredValue::Numeric(numbers),
                    },
                    None => {
                        warn!(key, "numeric dataset holds non-numeric text; storing as strings");
                        Self {
                            units,
                            value: StoredValue::Text(values),
                        }
                    }
                }
            }
            RawValue::Series { units, values } => Self {
                units,
                value: StoredValue::Numeric(values),
            },
            RawValue::Grid { units, rows } => Self {
                units,
                value: StoredValue::Matrix(rows),
            },
        }
    }
}
