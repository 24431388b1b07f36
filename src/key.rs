//! Composite dataset keys.
//!
//! Every value a trial produces is addressed by a colon-delimited composite
//! key. Three shapes exist:
//!
//! - `entity:variable:tag` is a concrete value, e.g. `earth:TMan:forward`.
//!   The tag selects either raw data (`initial`, `final`, `option`,
//!   `forward`, `backward`, `climate`) or a derived statistic (`mean`,
//!   `stddev`, `min`, `max`, `mode`, `geomean`) computed lazily from the
//!   sibling `forward` series.
//! - `entity:OutputOrder` / `entity:GridOutputOrder` name the ordered column
//!   schema a body's series files follow.
//! - `entity:name` is a bare key for seasonal grid files, which carry
//!   neither schema nor aggregation semantics.
//!
//! The colon-delimited form is canonical; no legacy delimiter is accepted.

use crate::{Error, Result};

/// Key segment separator.
pub const KEY_DELIM: char = ':';

/// Aggregation tag: the final segment of a value key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Initial-properties section of the log
    Initial,
    /// Final-properties section of the log
    Final,
    /// Value taken from an input option file
    Option,
    /// Forward-evolution series column
    Forward,
    /// Backward-evolution series column
    Backward,
    /// Climate-grid series column
    Climate,
    /// Arithmetic mean of the sibling forward series
    Mean,
    /// Population standard deviation of the sibling forward series
    Stddev,
    /// Minimum of the sibling forward series
    Min,
    /// Maximum of the sibling forward series
    Max,
    /// Most frequent value of the sibling forward series
    Mode,
    /// Geometric mean of the sibling forward series
    Geomean,
}

impl Tag {
    /// Parse a tag segment. Returns `None` for unknown tags (`rms` and the
    /// legacy variants are deliberately not accepted).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "initial" => Self::Initial,
            "final" => Self::Final,
            "option" => Self::Option,
            "forward" => Self::Forward,
            "backward" => Self::Backward,
            "climate" => Self::Climate,
            "mean" => Self::Mean,
            "stddev" => Self::Stddev,
            "min" => Self::Min,
            "max" => Self::Max,
            "mode" => Self::Mode,
            "geomean" => Self::Geomean,
            _ => return None,
        })
    }

    /// Canonical segment text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Final => "final",
            Self::Option => "option",
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Climate => "climate",
            Self::Mean => "mean",
            Self::Stddev => "stddev",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mode => "mode",
            Self::Geomean => "geomean",
        }
    }

    /// True for tags derived from the sibling forward series at read time.
    #[must_use]
    pub const fn is_statistic(self) -> bool {
        matches!(
            self,
            Self::Mean | Self::Stddev | Self::Min | Self::Max | Self::Mode | Self::Geomean
        )
    }

    /// True for per-trial scalar tags (one value per trial when extracted).
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(self, Self::Initial | Self::Final | Self::Option) || self.is_statistic()
    }
}

/// Which schema a `*OutputOrder` key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Forward/backward series column schema
    OutputOrder,
    /// Climate-grid column schema
    GridOutputOrder,
}

impl SchemaKind {
    /// Canonical segment text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutputOrder => "OutputOrder",
            Self::GridOutputOrder => "GridOutputOrder",
        }
    }
}

/// Structured view of a composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedKey<'a> {
    /// `entity:variable:tag`
    Value {
        /// Body or system name
        body: &'a str,
        /// Variable name
        variable: &'a str,
        /// Raw tag segment (may be unknown; classified at use sites)
        tag: &'a str,
    },
    /// `entity:OutputOrder` / `entity:GridOutputOrder`
    Schema {
        /// Body or system name
        body: &'a str,
        /// Which schema
        kind: SchemaKind,
    },
    /// `entity:name` (seasonal grid files)
    Bare {
        /// Body name
        body: &'a str,
        /// File stem, e.g. `SeasonalTemp`
        variable: &'a str,
    },
}

impl<'a> ParsedKey<'a> {
    /// Split a composite key into its structured form.
    ///
    /// # Errors
    /// Returns [`Error::UnknownAggregation`] for keys with fewer than two or
    /// more than three segments.
    pub fn parse(key: &'a str) -> Result<Self> {
        let segments: Vec<&str> = key.split(KEY_DELIM).collect();
        match segments.as_slice() {
            &[body, variable] if !body.is_empty() && !variable.is_empty() => {
                Ok(match variable {
                    "OutputOrder" => Self::Schema {
                        body,
                        kind: SchemaKind::OutputOrder,
                    },
                    "GridOutputOrder" => Self::Schema {
                        body,
                        kind: SchemaKind::GridOutputOrder,
                    },
                    _ => Self::Bare { body, variable },
                })
            }
            &[body, variable, tag] if !body.is_empty() && !variable.is_empty() => {
                Ok(Self::Value {
                    body,
                    variable,
                    tag,
                })
            }
            _ => Err(Error::UnknownAggregation(key.to_string())),
        }
    }

    /// The variable segment used for help-dictionary lookups.
    #[must_use]
    pub const fn variable(&self) -> &'a str {
        match *self {
            Self::Value { variable, .. } | Self::Bare { variable, .. } => variable,
            Self::Schema { kind, .. } => kind.as_str(),
        }
    }
}

/// Compose `body:variable:tag`.
#[must_use]
pub fn value_key(body: &str, variable: &str, tag: Tag) -> String {
    format!("{body}{KEY_DELIM}{variable}{KEY_DELIM}{}", tag.as_str())
}

/// Compose `body:OutputOrder` / `body:GridOutputOrder`.
#[must_use]
pub fn schema_key(body: &str, kind: SchemaKind) -> String {
    format!("{body}{KEY_DELIM}{}", kind.as_str())
}

/// Sibling `…:forward` key for a statistic key: `earth:TMan:mean` →
/// `earth:TMan:forward`.
#[must_use]
pub fn sibling_forward(key: &str) -> String {
    match key.rsplit_once(KEY_DELIM) {
        Some((head, _)) => format!("{head}{KEY_DELIM}{}", Tag::Forward.as_str()),
        None => key.to_string(),
    }
}
