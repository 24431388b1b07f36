//! Sweep discovery: trial directories and the names that locate files inside
//! them.
//!
//! A sweep is a directory of trial subdirectories, each holding the same set
//! of simulator input files plus that trial's outputs. The system name (from
//! the primary file) and body names (from each body file) determine the log
//! and series file names for every trial, so they are resolved once, from the
//! first trial, before workers start.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::{Error, Result};

/// List trial directories under the sweep folder, sorted by path.
///
/// With `only` set, restricts the result to the single named trial.
///
/// # Errors
/// Returns [`Error::Config`] if the folder does not exist, is empty of
/// subdirectories, or the named trial is absent.
pub fn discover_trials(folder: &Path, only: Option<&str>) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::Config(format!(
            "sweep folder {} does not exist",
            folder.display()
        )));
    }

    let mut trials: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    trials.sort();

    if let Some(name) = only {
        trials.retain(|p| p.file_name().is_some_and(|n| n == name));
        if trials.is_empty() {
            return Err(Error::Config(format!(
                "trial '{name}' not found under {}",
                folder.display()
            )));
        }
    }
    if trials.is_empty() {
        return Err(Error::Config(format!(
            "no trial directories under {}",
            folder.display()
        )));
    }
    Ok(trials)
}

/// Group name for a trial: its directory basename.
#[must_use]
pub fn trial_group_name(trial: &Path) -> String {
    trial
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Resolve the system name and body names from one representative trial.
///
/// The primary file supplies `sSystemName`; every other input file
/// contributes its `sName`. Body files without an `sName` are skipped with a
/// warning (they cannot own any series files).
///
/// # Errors
/// Returns [`Error::Parse`] if the primary file is unreadable or carries no
/// `sSystemName`.
pub fn resolve_names(
    trial: &Path,
    input_files: &[String],
    primary_file: &str,
) -> Result<(String, Vec<String>)> {
    let mut system_name: Option<String> = None;
    let mut body_names = Vec::new();

    for file in input_files {
        let path = trial.join(file);
        if file == primary_file {
            system_name = directive_value(&path, "sSystemName")?;
        } else {
            match directive_value(&path, "sName")? {
                Some(name) => body_names.push(name),
                None => warn!(file = %path.display(), "body file has no sName; skipping"),
            }
        }
    }

    let system_name = system_name.ok_or_else(|| Error::Parse {
        path: trial.join(primary_file),
        reason: "missing sSystemName directive".to_string(),
    })?;
    Ok((system_name, body_names))
}

/// Log file name for a trial: an explicit `sLogFile` directive in any input
/// file wins; otherwise `<system name>.log`.
#[must_use]
pub fn resolve_log_name(trial: &Path, input_files: &[String], system_name: &str) -> String {
    for file in input_files {
        if let Ok(Some(name)) = directive_value(&trial.join(file), "sLogFile") {
            return name;
        }
    }
    format!("{system_name}.log")
}

/// First value of a `directive value` line in a simulator input file.
fn directive_value(path: &Path, directive: &str) -> Result<Option<String>> {
    let text = fs::read_to_string(path).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        reason: format!("cannot read input file: {e}"),
    })?;
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let mut tokens = line.split_whitespace();
        if tokens.next() == Some(directive) {
            if let Some(value) = tokens.next() {
                return Ok(Some(value.to_string()));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = File::create(dir.join(name)).expect("create");
        f.write_all(content.as_bytes()).expect("write");
    }

    #[test]
    fn test_discover_sorted_trials() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for name in ["trial_02", "trial_00", "trial_01"] {
            fs::create_dir(tmp.path().join(name)).expect("mkdir");
        }
        write_file(tmp.path(), "stray.txt", "not a trial");

        let trials = discover_trials(tmp.path(), None).expect("discover");
        let names: Vec<String> = trials.iter().map(|t| trial_group_name(t)).collect();
        assert_eq!(names, vec!["trial_00", "trial_01", "trial_02"]);
    }

    #[test]
    fn test_discover_single_trial() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(tmp.path().join("trial_00")).expect("mkdir");
        fs::create_dir(tmp.path().join("trial_01")).expect("mkdir");

        let trials = discover_trials(tmp.path(), Some("trial_01")).expect("discover");
        assert_eq!(trials.len(), 1);
        assert_eq!(trial_group_name(&trials[0]), "trial_01");

        assert!(discover_trials(tmp.path(), Some("missing")).is_err());
    }

    #[test]
    fn test_discover_missing_folder() {
        let err = discover_trials(Path::new("/definitely/not/here"), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_resolve_names() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_file(tmp.path(), "vpl.in", "sSystemName solar\nsUnitMass kg\n");
        write_file(tmp.path(), "earth.in", "sName earth\ndMass -1.0\n");
        write_file(tmp.path(), "sun.in", "sName sun\n");

        let files = vec![
            "sun.in".to_string(),
            "earth.in".to_string(),
            "vpl.in".to_string(),
        ];
        let (system, bodies) = resolve_names(tmp.path(), &files, "vpl.in").expect("names");
        assert_eq!(system, "solar");
        assert_eq!(bodies, vec!["sun", "earth"]);
    }

    #[test]
    fn test_resolve_names_missing_system() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_file(tmp.path(), "vpl.in", "sUnitMass kg\n");
        let files = vec!["vpl.in".to_string()];
        let err = resolve_names(tmp.path(), &files, "vpl.in").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_resolve_log_name_default_and_override() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_file(tmp.path(), "vpl.in", "sSystemName solar\n");
        let files = vec!["vpl.in".to_string()];
        assert_eq!(resolve_log_name(tmp.path(), &files, "solar"), "solar.log");

        write_file(tmp.path(), "vpl.in", "sSystemName solar\nsLogFile custom.log\n");
        assert_eq!(resolve_log_name(tmp.path(), &files, "solar"), "custom.log");
    }
}
