//! Unit resolution for option values.
//!
//! Units are resolved once, at parse time, and are immutable afterwards.
//! For a given option the resolver applies, in order:
//!
//! 1. **Custom unit**: a negative value with a declared custom unit means
//!    "the magnitude is expressed in that unit" (e.g. `dSemi -1.0` → `AU`).
//! 2. **Dimension expansion**: composite dimensions that are not base
//!    dimensions are rewritten first: `pressure` →
//!    `(mass*length^-1*time^-2)`, `energy` → `(mass*length^2*time^-2)`.
//! 3. **Base-dimension cascade**: each base-dimension placeholder resolves
//!    through a fixed three-tier cascade: an explicit `sUnit*` override in
//!    the current option file, then one in the primary config file, then the
//!    help dictionary's compiled-in default. This precedence order is
//!    load-bearing; do not reorder.

use rustc_hash::FxHashMap;

use crate::help::HelpDict;

/// The five base dimensions a unit placeholder can name.
///
/// Resolution order follows the declaration order here (length first); the
/// replacement is textual, so order is observable when a resolved unit name
/// itself contains a dimension word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseDim {
    /// `length` → `sUnitLength`
    Length,
    /// `angle` → `sUnitAngle`
    Angle,
    /// `temperature` → `sUnitTemp`
    Temperature,
    /// `mass` → `sUnitMass`
    Mass,
    /// `time` → `sUnitTime`
    Time,
}

impl BaseDim {
    /// All base dimensions in resolution order.
    pub const ALL: [Self; 5] = [
        Self::Length,
        Self::Angle,
        Self::Temperature,
        Self::Mass,
        Self::Time,
    ];

    /// Placeholder word inside dimension strings.
    #[must_use]
    pub const fn word(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Angle => "angle",
            Self::Temperature => "temperature",
            Self::Mass => "mass",
            Self::Time => "time",
        }
    }

    /// Option-file directive overriding this dimension's unit.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Length => "sUnitLength",
            Self::Angle => "sUnitAngle",
            Self::Temperature => "sUnitTemp",
            Self::Mass => "sUnitMass",
            Self::Time => "sUnitTime",
        }
    }

    fn from_directive(directive: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.directive() == directive)
    }
}

/// Explicit `sUnit*` overrides collected from one file.
#[derive(Debug, Clone, Default)]
pub struct UnitOverrides {
    map: FxHashMap<BaseDim, String>,
}

impl UnitOverrides {
    /// Scan file text for `sUnit*` directives (first one per dimension wins).
    #[must_use]
    pub fn scan(text: &str) -> Self {
        let mut map = FxHashMap::default();
        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let mut tokens = line.split_whitespace();
            let (Some(directive), Some(value)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            if let Some(dim) = BaseDim::from_directive(directive) {
                map.entry(dim).or_insert_with(|| value.to_string());
            }
        }
        Self { map }
    }

    /// Override for one dimension, if present.
    #[must_use]
    pub fn get(&self, dim: BaseDim) -> Option<&str> {
        self.map.get(&dim).map(String::as_str)
    }
}

/// Resolves option units against the cascade for one option file.
#[derive(Debug)]
pub struct UnitResolver<'a> {
    help: &'a HelpDict,
    file: &'a UnitOverrides,
    primary: &'a UnitOverrides,
}

impl<'a> UnitResolver<'a> {
    /// Build a resolver for one option file within one trial.
    #[must_use]
    pub const fn new(
        help: &'a HelpDict,
        file: &'a UnitOverrides,
        primary: &'a UnitOverrides,
    ) -> Self {
        Self {
            help,
            file,
            primary,
        }
    }

    /// Resolve the units string for `option` given its raw `value`.
    ///
    /// Options without a declared dimension (or with a dimensionless one)
    /// resolve to `nd`.
    #[must_use]
    pub fn resolve(&self, option: &str, value: &str) -> String {
        let entry = self.help.get(option);

        if value.trim().starts_with('-') {
            if let Some(custom) = entry.and_then(|e| e.custom_unit.as_deref()) {
                return custom.to_string();
            }
        }

        let Some(dim) = entry.and_then(|e| e.dimension.as_deref()) else {
            return "nd".to_string();
        };
        if dim == "nd" {
            return "nd".to_string();
        }

        let mut working = dim
            .replace("pressure", "(mass*length^-1*time^-2)")
            .replace("energy", "(mass*length^2*time^-2)");

        for base in BaseDim::ALL {
            if !working.contains(base.word()) {
                continue;
            }
            let unit = self
                .file
                .get(base)
                .or_else(|| self.primary.get(base))
                .or_else(|| self.help.default_unit(base.directive()))
                .unwrap_or_else(|| base.word());
            working = working.replace(base.word(), unit);
        }
        working
    }
}
