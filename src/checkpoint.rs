//! Persisted work queue for archive builds.
//!
//! The checkpoint file records every trial and its build status so a killed
//! run can resume where it stopped:
//!
//! ```text
//! Config File: /sweeps/demo.in
//! Total Number of Trials: 3
//! /sweeps/demo_out/trial_00 1
//! /sweeps/demo_out/trial_01 0
//! /sweeps/demo_out/trial_02 -1
//! THE END
//! ```
//!
//! Statuses: `-1` pending, `0` in progress, `1` done. All mutation happens
//! under the build's single coordination lock; `claim_next` is an O(n) scan
//! by contract, the deliberate baseline at sweep scale. The queue
//! rewrites the file on every transition; this is crash-safe because a stale `0`
//! only ever causes the next run to redo one trial.
//!
//! A corrupt or unparseable checkpoint is fatal: the build refuses to start
//! rather than guess which trials are archived.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{Error, Result};

const SENTINEL: &str = "THE END";
const HEADER_CONFIG: &str = "Config File:";
const HEADER_TOTAL: &str = "Total Number of Trials:";

/// Build status of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialStatus {
    /// Not yet claimed by any worker (`-1`)
    Pending,
    /// Claimed, not yet archived (`0`)
    InProgress,
    /// Archived (`1`)
    Done,
}

impl TrialStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "-1" => Some(Self::Pending),
            "0" => Some(Self::InProgress),
            "1" => Some(Self::Done),
            _ => None,
        }
    }

    const fn code(self) -> &'static str {
        match self {
            Self::Pending => "-1",
            Self::InProgress => "0",
            Self::Done => "1",
        }
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One checkpoint record.
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    /// Absolute trial directory path
    pub trial: PathBuf,
    /// Current status
    pub status: TrialStatus,
}

/// The persisted work queue.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    source: String,
    records: Vec<CheckpointRecord>,
}

impl Checkpoint {
    /// Create a fresh checkpoint with every trial pending, and persist it.
    ///
    /// # Errors
    /// Rejects trial paths containing whitespace (the record format is
    /// space-delimited) and propagates IO failures.
    pub fn initialize(path: &Path, source: &Path, trials: &[PathBuf]) -> Result<Self> {
        for trial in trials {
            if trial.to_string_lossy().contains(char::is_whitespace) {
                return Err(Error::Checkpoint(format!(
                    "trial path contains whitespace: {}",
                    trial.display()
                )));
            }
        }
        let cp = Self {
            path: path.to_path_buf(),
            source: source.to_string_lossy().to_string(),
            records: trials
                .iter()
                .map(|t| CheckpointRecord {
                    trial: t.clone(),
                    status: TrialStatus::Pending,
                })
                .collect(),
        };
        cp.persist()?;
        info!(path = %path.display(), trials = trials.len(), "initialized checkpoint");
        Ok(cp)
    }

    /// Load an existing checkpoint. Any format deviation is fatal.
    ///
    /// # Errors
    /// Returns [`Error::Checkpoint`] on malformed headers, bad status codes,
    /// a record-count mismatch, or a missing end sentinel.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Checkpoint(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut lines = text.lines();

        let source = lines
            .next()
            .and_then(|l| l.strip_prefix(HEADER_CONFIG))
            .map(str::trim)
            .ok_or_else(|| Error::Checkpoint("missing config header line".to_string()))?
            .to_string();

        let total: usize = lines
            .next()
            .and_then(|l| l.strip_prefix(HEADER_TOTAL))
            .map(str::trim)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Error::Checkpoint("missing or bad trial-count line".to_string()))?;

        let mut records = Vec::with_capacity(total);
        let mut saw_sentinel = false;
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == SENTINEL {
                saw_sentinel = true;
                break;
            }
            let mut tokens = line.split_whitespace();
            let (Some(trial), Some(status), None) =
                (tokens.next(), tokens.next(), tokens.next())
            else {
                return Err(Error::Checkpoint(format!("malformed record line: '{line}'")));
            };
            let status = TrialStatus::parse(status).ok_or_else(|| {
                Error::Checkpoint(format!("bad status '{status}' for trial {trial}"))
            })?;
            records.push(CheckpointRecord {
                trial: PathBuf::from(trial),
                status,
            });
        }

        if !saw_sentinel {
            return Err(Error::Checkpoint("missing end sentinel".to_string()));
        }
        if records.len() != total {
            return Err(Error::Checkpoint(format!(
                "header promises {total} trials but {} records found",
                records.len()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            source,
            records,
        })
    }

    /// Claim the first pending trial: flip it to in-progress, persist, and
    /// return its path. `None` when nothing is pending. Callers must hold
    /// the build lock; claims are mutually exclusive by construction.
    ///
    /// # Errors
    /// Propagates persistence failures.
    pub fn claim_next(&mut self) -> Result<Option<PathBuf>> {
        let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.status == TrialStatus::Pending)
        else {
            return Ok(None);
        };
        record.status = TrialStatus::InProgress;
        let trial = record.trial.clone();
        self.persist()?;
        debug!(trial = %trial.display(), "claimed trial");
        Ok(Some(trial))
    }

    /// Flip a trial to done (from in-progress or pending) and persist.
    ///
    /// # Errors
    /// Returns [`Error::Checkpoint`] if the trial is not in the queue.
    pub fn complete(&mut self, trial: &Path) -> Result<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.trial == trial)
            .ok_or_else(|| {
                Error::Checkpoint(format!("trial {} not in checkpoint", trial.display()))
            })?;
        record.status = TrialStatus::Done;
        self.persist()
    }

    /// Demote every in-progress record to pending (crash recovery), persist,
    /// and return the demoted trial paths.
    ///
    /// # Errors
    /// Propagates persistence failures.
    pub fn demote_in_progress(&mut self) -> Result<Vec<PathBuf>> {
        let mut demoted = Vec::new();
        for record in &mut self.records {
            if record.status == TrialStatus::InProgress {
                record.status = TrialStatus::Pending;
                demoted.push(record.trial.clone());
            }
        }
        if !demoted.is_empty() {
            self.persist()?;
        }
        Ok(demoted)
    }

    /// All records, in file order.
    #[must_use]
    pub fn records(&self) -> &[CheckpointRecord] {
        &self.records
    }

    /// Status of one trial, if present.
    #[must_use]
    pub fn status_of(&self, trial: &Path) -> Option<TrialStatus> {
        self.records
            .iter()
            .find(|r| r.trial == trial)
            .map(|r| r.status)
    }

    /// (pending, in-progress, done) counts.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for r in &self.records {
            match r.status {
                TrialStatus::Pending => counts.0 += 1,
                TrialStatus::InProgress => counts.1 += 1,
                TrialStatus::Done => counts.2 += 1,
            }
        }
        counts
    }

    /// True when every record is done.
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.records.iter().all(|r| r.status == TrialStatus::Done)
    }

    /// Config path recorded in the header.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Checkpoint file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the checkpoint file (forced rebuild).
    ///
    /// # Errors
    /// Propagates IO failures.
    pub fn remove(self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format!("{HEADER_CONFIG} {}\n", self.source));
        out.push_str(&format!("{HEADER_TOTAL} {}\n", self.records.len()));
        for r in &self.records {
            out.push_str(&format!("{} {}\n", r.trial.display(), r.status));
        }
        out.push_str(SENTINEL);
        out.push('\n');
        fs::write(&self.path, out)?;
        Ok(())
    }
}
