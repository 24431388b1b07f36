//! Sweep configuration file.
//!
//! A small directive file drives both archive builds and filtered exports:
//!
//! ```text
//! sDestFolder   sweep_output
//! sPrimaryFile  vpl.in
//! saBodyFiles   [sun.in earth.in]
//! saKeyInclude  [earth:TMan:forward earth:TMan:mean]
//! ```
//!
//! One directive per line, whitespace-separated, `#` starts a comment.
//! List-valued directives may wrap their items in brackets. Configuration
//! errors (missing required directive, `saKeyInclude` and `saKeyExclude` both
//! set) fail fast, before any worker starts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Parsed sweep configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Path of the config file itself (recorded in the checkpoint header)
    pub source: PathBuf,
    /// Directory holding one subdirectory per trial
    pub dest_folder: PathBuf,
    /// Archive container path (default: `<dest_folder>.bpa`)
    pub archive_file: PathBuf,
    /// Filtered/flat output path (default: `<folder basename>_filtered.bpf`)
    pub output_name: PathBuf,
    /// Primary simulator input file name, e.g. `vpl.in`
    pub primary_file: String,
    /// Body input file names, e.g. `earth.in`
    pub body_files: Vec<String>,
    /// Keys to retain (exact match); empty = keep everything
    pub include: Vec<String>,
    /// Keys to drop (exact match)
    pub exclude: Vec<String>,
    /// Export in Ulysses layout (comma-delimited `User.csv` with headers)
    pub ulysses: bool,
    /// Restrict processing to one named trial directory
    pub sim_name: Option<String>,
    /// Column delimiter for plain-text export
    pub delimiter: String,
    /// Emit a `key[unit]` header row on plain-text export
    pub header: bool,
    /// Captured simulator self-documentation text, when available
    pub help_file: Option<PathBuf>,
}

impl SweepConfig {
    /// Read and validate a config file.
    ///
    /// # Errors
    /// Returns [`Error::Config`] on unreadable files, unknown or duplicate
    /// directives lacking values, a missing `sDestFolder`/`sPrimaryFile`, or
    /// `saKeyInclude` and `saKeyExclude` both present.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_str_at(&text, path)
    }

    /// Parse config text, resolving relative paths against the config file's
    /// parent directory.
    ///
    /// # Errors
    /// Same conditions as [`SweepConfig::from_file`].
    pub fn from_str_at(text: &str, source: &Path) -> Result<Self> {
        let base = source.parent().unwrap_or_else(|| Path::new("."));

        let mut dest_folder: Option<PathBuf> = None;
        let mut archive_file: Option<PathBuf> = None;
        let mut output_name: Option<PathBuf> = None;
        let mut primary_file: Option<String> = None;
        let mut body_files: Vec<String> = Vec::new();
        let mut include: Option<Vec<String>> = None;
        let mut exclude: Option<Vec<String>> = None;
        let mut ulysses = false;
        let mut sim_name: Option<String> = None;
        let mut delimiter = " ".to_string();
        let mut header = false;
        let mut help_file: Option<PathBuf> = None;

        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let directive = tokens.next().unwrap_or("");
            let values: Vec<String> = tokens
                .map(|t| t.trim_matches(|c| c == '[' || c == ']').to_string())
                .filter(|t| !t.is_empty())
                .collect();

            match directive {
                "sDestFolder" => dest_folder = Some(base.join(first_value(directive, &values)?)),
                "sArchiveFile" => archive_file = Some(base.join(first_value(directive, &values)?)),
                "sOutputName" => output_name = Some(base.join(first_value(directive, &values)?)),
                "sPrimaryFile" => primary_file = Some(first_value(directive, &values)?),
                "saBodyFiles" => body_files = values,
                "saKeyInclude" => include = Some(values),
                "saKeyExclude" => exclude = Some(values),
                "bUlysses" => {
                    ulysses = is_true(&first_value(directive, &values)?);
                }
                "sSimName" => sim_name = Some(first_value(directive, &values)?),
                "sDelimiter" => delimiter = first_value(directive, &values)?,
                "bHeader" => {
                    header = is_true(&first_value(directive, &values)?);
                }
                "sHelpFile" => help_file = Some(base.join(first_value(directive, &values)?)),
                other => {
                    return Err(Error::Config(format!("unknown directive '{other}'")));
                }
            }
        }

        if include.is_some() && exclude.is_some() {
            return Err(Error::Config(
                "saKeyInclude and saKeyExclude are mutually exclusive".to_string(),
            ));
        }
        let dest_folder = dest_folder
            .ok_or_else(|| Error::Config("sDestFolder directive is required".to_string()))?;
        let primary_file = primary_file
            .ok_or_else(|| Error::Config("sPrimaryFile directive is required".to_string()))?;

        let folder_name = dest_folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::Config("sDestFolder has no final path component".to_string()))?;

        let archive_file =
            archive_file.unwrap_or_else(|| dest_folder.with_extension("bpa"));
        let output_name =
            output_name.unwrap_or_else(|| base.join(format!("{folder_name}_filtered.bpf")));

        Ok(Self {
            source: source.to_path_buf(),
            dest_folder,
            archive_file,
            output_name,
            primary_file,
            body_files,
            include: include.unwrap_or_default(),
            exclude: exclude.unwrap_or_default(),
            ulysses,
            sim_name,
            delimiter,
            header,
            help_file,
        })
    }

    /// All trial input file names: bodies first, primary last.
    #[must_use]
    pub fn input_files(&self) -> Vec<String> {
        let mut files = self.body_files.clone();
        files.push(self.primary_file.clone());
        files
    }

    /// Sidecar hash path for the configured archive.
    #[must_use]
    pub fn sidecar_path(&self) -> PathBuf {
        crate::integrity::sidecar_path(&self.archive_file)
    }

    /// Checkpoint path for the configured sweep: a dotfile next to the dest
    /// folder, derived from the folder name (never from the process cwd).
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        let name = self
            .dest_folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "sweep".to_string());
        self.dest_folder.with_file_name(format!(".{name}_checkpoint"))
    }
}

fn first_value(directive: &str, values: &[String]) -> Result<String> {
    values
        .first()
        .cloned()
        .ok_or_else(|| Error::Config(format!("directive {directive} needs a value")))
}

fn is_true(value: &str) -> bool {
    matches!(value, "1" | "true" | "True")
}
