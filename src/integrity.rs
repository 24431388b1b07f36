//! Whole-file integrity: sidecar hash for finished archives.
//!
//! After a build completes, the archive's MD5 digest is written to a sidecar
//! file (`<archive>.md5`, one hex line). Readers recompute and compare on
//! open; a mismatch is fatal unless explicitly suppressed. The per-dataset
//! digests inside the container supersede this check for ongoing validation:
//! they localize corruption to one dataset and survive the appends a
//! recovery run makes (which would invalidate any whole-file hash), so
//! recovery re-stamps the sidecar when it finishes.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use md5::{Digest as _, Md5};
use tracing::{debug, warn};

use crate::{Error, Result};

/// How strictly readers treat integrity failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// Hash mismatches and dataset digest failures are fatal (default)
    #[default]
    Strict,
    /// Log and continue past corruption
    IgnoreCorrupt,
}

/// Hashing chunk size.
const CHUNK: usize = 32 * 1024;

/// Sidecar path for an archive: `<archive>.md5`.
#[must_use]
pub fn sidecar_path(archive: &Path) -> PathBuf {
    let mut name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.push_str(".md5");
    archive.with_file_name(name)
}

/// MD5 of a file, streamed in 32 KiB chunks, as lowercase hex.
///
/// # Errors
/// Propagates IO failures.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute and store the sidecar hash for a finished archive.
///
/// # Errors
/// Propagates IO failures.
pub fn write_sidecar(archive: &Path) -> Result<String> {
    let digest = file_digest(archive)?;
    let sidecar = sidecar_path(archive);
    fs::write(&sidecar, format!("{digest}\n"))?;
    debug!(archive = %archive.display(), digest = %digest, "wrote sidecar hash");
    Ok(digest)
}

/// Verify an archive against its sidecar.
///
/// A missing sidecar is tolerated with a warning; archives are only stamped
/// once a build finishes, and recovery must be able to open a mid-build
/// container. A present-but-mismatching sidecar is [`Error::ChecksumMismatch`]
/// under [`VerifyMode::Strict`].
///
/// # Errors
/// Propagates IO failures; returns the mismatch error described above.
pub fn verify_sidecar(archive: &Path, mode: VerifyMode) -> Result<()> {
    let sidecar = sidecar_path(archive);
    if !sidecar.is_file() {
        warn!(archive = %archive.display(), "no sidecar hash; skipping whole-file check");
        return Ok(());
    }
    let expected = fs::read_to_string(&sidecar)?
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    let actual = file_digest(archive)?;

    if expected != actual {
        match mode {
            VerifyMode::Strict => {
                return Err(Error::ChecksumMismatch {
                    path: archive.to_path_buf(),
                    expected,
                    actual,
                });
            }
            VerifyMode::IgnoreCorrupt => {
                warn!(
                    archive = %archive.display(),
                    expected = %expected,
                    actual = %actual,
                    "whole-file hash mismatch ignored"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/sweeps/demo.bpa")),
            Path::new("/sweeps/demo.bpa.md5")
        );
    }

    #[test]
    fn test_digest_matches_known_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.bin");
        fs::write(&path, b"hello").expect("write");
        assert_eq!(
            file_digest(&path).expect("digest"),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_write_then_verify() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("demo.bpa");
        fs::write(&path, b"archive bytes").expect("write");

        write_sidecar(&path).expect("sidecar");
        verify_sidecar(&path, VerifyMode::Strict).expect("verifies");
    }

    #[test]
    fn test_flipped_byte_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("demo.bpa");
        fs::write(&path, b"archive bytes").expect("write");
        write_sidecar(&path).expect("sidecar");

        let mut f = fs::OpenOptions::new().append(true).open(&path).expect("open");
        f.write_all(b"!").expect("append");

        let err = verify_sidecar(&path, VerifyMode::Strict).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));

        // suppressed in ignore mode
        verify_sidecar(&path, VerifyMode::IgnoreCorrupt).expect("ignored");
    }

    #[test]
    fn test_missing_sidecar_tolerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("demo.bpa");
        fs::write(&path, b"archive bytes").expect("write");
        verify_sidecar(&path, VerifyMode::Strict).expect("tolerated");
    }
}
