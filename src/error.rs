//! Error types for sweep-db
//!
//! One crate-wide enum: every public fallible operation returns
//! [`Result`]. Fatal-before-workers conditions (bad config, corrupt
//! checkpoint) and user-facing extraction errors (unknown aggregation tag,
//! matrix shape mismatch) get their own variants so callers can match on
//! them instead of parsing message strings.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// sweep-db error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete sweep configuration (fails before any worker starts)
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed simulator self-documentation text
    #[error("help dictionary error: {0}")]
    Help(String),

    /// Corrupt or unparseable checkpoint file (fatal; never auto-repaired)
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// A trial file is missing or malformed; aborts the run (re-running resumes
    /// from the checkpoint)
    #[error("parse error in {path}: {reason}")]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Archive container format violation
    #[error("archive error: {0}")]
    Archive(String),

    /// Attempted to rewrite a fully-written trial group
    #[error("group '{0}' already exists in archive (groups are write-once)")]
    GroupExists(String),

    /// A requested key is not present in the archive
    #[error("key '{key}' not found{}", group.as_ref().map(|g| format!(" in group '{g}'")).unwrap_or_default())]
    KeyNotFound {
        /// Missing dataset key
        key: String,
        /// Group searched, when the archive is grouped
        group: Option<String>,
    },

    /// Per-dataset digest mismatch; corruption is localized to one dataset
    #[error("dataset '{key}' in group '{group}' failed its integrity check")]
    DatasetCorrupt {
        /// Group holding the corrupt dataset
        group: String,
        /// Corrupt dataset key
        key: String,
    },

    /// Whole-file hash mismatch against the sidecar digest
    #[error("archive {path} does not match its sidecar hash (expected {expected}, got {actual}); \
             pass VerifyMode::IgnoreCorrupt to open anyway")]
    ChecksumMismatch {
        /// Archive that failed verification
        path: PathBuf,
        /// Digest recorded in the sidecar
        expected: String,
        /// Digest of the file as it is now
        actual: String,
    },

    /// Aggregation tag not in the supported set
    #[error("unknown aggregation tag '{0}' (expected initial, final, option, forward, backward, \
             climate, mean, stddev, min, max, mode or geomean)")]
    UnknownAggregation(String),

    /// Axis sizes do not multiply out to the dependent column length
    #[error("cannot reshape z-array of length {len} into a {rows} x {cols} matrix")]
    MatrixShape {
        /// Requested row count (y-axis size)
        rows: usize,
        /// Requested column count (x-axis size)
        cols: usize,
        /// Actual dependent column length
        len: usize,
    },

    /// Export-format violation (empty delimiter, non-scalar CSV column)
    #[error("export error: {0}")]
    Export(String),

    /// Anything without a better home (pool construction, etc.)
    #[error("{0}")]
    Other(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset payload (de)serialization error
    #[error("dataset encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
