//! Consolidated sweep archive.
//!
//! One container file holds every trial's dictionary: a namespace group per
//! trial in the grouped shape, or bare datasets in the flat (filtered)
//! shape. The shape is carried by an explicit header tag, so readers never
//! sniff key patterns to decide what they were handed.
//!
//! Write discipline:
//!
//! - A group, once fully written, is never rewritten. [`Archive::write_group`]
//!   refuses to touch an existing group; the builder performs its
//!   existence-check + write + checkpoint-complete as one lock-held unit.
//! - The only mutations are appends. Crash recovery removes a partial
//!   trailing block by truncation ([`Archive::open_repair`]) and whole groups
//!   by appending tombstones ([`Archive::delete_group`]).
//! - Every dataset carries its own digest, verified on read, so corruption
//!   is pinned to a single dataset rather than poisoning the file.

pub mod codec;
pub mod dataset;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info, warn};

pub use codec::{Compression, Shape};
pub use dataset::{Dataset, StoredValue};

use crate::{Error, Result};

/// One group's datasets, keyed by composite key.
pub type GroupData = BTreeMap<String, Dataset>;

#[derive(Debug, Clone)]
struct DatasetEntry {
    units: String,
    payload_offset: u64,
    payload_len: u32,
    digest: [u8; 16],
}

/// An open archive container.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    file: File,
    shape: Shape,
    compression: Compression,
    writable: bool,
    end: u64,
    index: BTreeMap<String, BTreeMap<String, DatasetEntry>>,
}

impl Archive {
    /// Create a new, empty container (truncating any existing file).
    ///
    /// # Errors
    /// Propagates IO failures.
    pub fn create(path: &Path, shape: Shape, compression: Compression) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        codec::write_header(&mut file, shape, compression)?;
        file.flush()?;
        info!(path = %path.display(), ?shape, "created archive container");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            shape,
            compression,
            writable: true,
            end: codec::HEADER_LEN,
            index: BTreeMap::new(),
        })
    }

    /// Open an existing container read-only.
    ///
    /// # Errors
    /// Returns [`Error::Archive`] on format violations, including a
    /// truncated trailing block (only recovery may repair one).
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_inner(path, false, false)
    }

    /// Open read-write for appending groups (archive builds).
    ///
    /// # Errors
    /// Same conditions as [`Archive::open`].
    pub fn open_rw(path: &Path) -> Result<Self> {
        Self::open_inner(path, true, false)
    }

    /// Open read-write, truncating a partial trailing block left by a killed
    /// writer. Used by crash recovery only.
    ///
    /// # Errors
    /// Returns [`Error::Archive`] on non-tail corruption.
    pub fn open_repair(path: &Path) -> Result<Self> {
        Self::open_inner(path, true, true)
    }

    /// Open read-write if the file exists, else create it.
    ///
    /// # Errors
    /// Propagates open/create failures; a shape mismatch is an
    /// [`Error::Archive`].
    pub fn open_or_create(path: &Path, shape: Shape, compression: Compression) -> Result<Self> {
        if path.is_file() {
            let archive = Self::open_rw(path)?;
            if archive.shape != shape {
                return Err(Error::Archive(format!(
                    "{} has shape {:?}, expected {shape:?}",
                    path.display(),
                    archive.shape
                )));
            }
            Ok(archive)
        } else {
            Self::create(path, shape, compression)
        }
    }

    fn open_inner(path: &Path, writable: bool, repair: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        let scan = scan(&file)?;

        if let Some(valid_end) = scan.truncate_at {
            if repair {
                warn!(
                    path = %path.display(),
                    at = valid_end,
                    "truncating partial trailing block left by a crashed writer"
                );
                file.set_len(valid_end)?;
            } else {
                return Err(Error::Archive(format!(
                    "{} ends in a partial block (crashed writer?); run recovery",
                    path.display()
                )));
            }
        }

        let end = scan.truncate_at.unwrap_or(scan.end);
        Ok(Self {
            path: path.to_path_buf(),
            file,
            shape: scan.shape,
            compression: scan.compression,
            writable,
            end,
            index: scan.index,
        })
    }

    /// Container file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shape tag from the header.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Payload compression from the header.
    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// True when no groups (or flat datasets) are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Group names in sorted order.
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    /// Does a fully-written group exist?
    #[must_use]
    pub fn has_group(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Dataset keys within a group, sorted.
    #[must_use]
    pub fn dataset_keys(&self, group: &str) -> Vec<&str> {
        self.index
            .get(group)
            .map(|g| g.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Units attribute of a dataset, without reading its payload.
    #[must_use]
    pub fn units_of(&self, group: &str, key: &str) -> Option<&str> {
        self.index
            .get(group)
            .and_then(|g| g.get(key))
            .map(|e| e.units.as_str())
    }

    /// Append a trial group. Exactly-once by construction: an existing group
    /// is refused, and callers hold the build lock across their
    /// existence-check + write + checkpoint-complete sequence.
    ///
    /// # Errors
    /// Returns [`Error::GroupExists`] for a duplicate group and
    /// [`Error::Archive`] if the container was opened read-only.
    pub fn write_group(&mut self, name: &str, datasets: &GroupData) -> Result<()> {
        if !self.writable {
            return Err(Error::Archive("container opened read-only".to_string()));
        }
        if self.index.contains_key(name) {
            return Err(Error::GroupExists(name.to_string()));
        }

        let mut buf: Vec<u8> = Vec::new();
        let mut entries: BTreeMap<String, DatasetEntry> = BTreeMap::new();

        buf.write_u8(codec::BLOCK_GROUP)?;
        codec::write_str(&mut buf, name)?;
        buf.write_u32::<LittleEndian>(u32::try_from(datasets.len()).map_err(|_| {
            Error::Archive(format!("too many datasets in group '{name}'"))
        })?)?;

        for (key, ds) in datasets {
            codec::write_str(&mut buf, key)?;
            codec::write_str(&mut buf, &ds.units)?;
            let payload = self.compression.compress(&serde_json::to_vec(&ds.value)?)?;
            let len = u32::try_from(payload.len())
                .map_err(|_| Error::Archive(format!("dataset '{key}' payload too large")))?;
            buf.write_u32::<LittleEndian>(len)?;
            let payload_offset = self.end + buf.len() as u64;
            buf.extend_from_slice(&payload);
            let digest = codec::digest(&payload);
            buf.extend_from_slice(&digest);
            entries.insert(
                key.clone(),
                DatasetEntry {
                    units: ds.units.clone(),
                    payload_offset,
                    payload_len: len,
                    digest,
                },
            );
        }

        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&buf)?;
        self.file.flush()?;
        self.end += buf.len() as u64;
        self.index.insert(name.to_string(), entries);
        debug!(group = name, datasets = datasets.len(), "wrote group");
        Ok(())
    }

    /// Remove a group by appending a tombstone. Returns whether the group
    /// existed.
    ///
    /// # Errors
    /// Returns [`Error::Archive`] if the container was opened read-only.
    pub fn delete_group(&mut self, name: &str) -> Result<bool> {
        if !self.writable {
            return Err(Error::Archive("container opened read-only".to_string()));
        }
        if self.index.remove(name).is_none() {
            return Ok(false);
        }
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u8(codec::BLOCK_TOMBSTONE)?;
        codec::write_str(&mut buf, name)?;
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&buf)?;
        self.file.flush()?;
        self.end += buf.len() as u64;
        info!(group = name, "tombstoned group");
        Ok(true)
    }

    /// Read one dataset, verifying its digest.
    ///
    /// # Errors
    /// [`Error::KeyNotFound`] for absent keys, [`Error::DatasetCorrupt`] on a
    /// digest mismatch (siblings remain readable).
    pub fn read_dataset(&self, group: &str, key: &str) -> Result<Dataset> {
        self.read_dataset_inner(group, key, true)
    }

    /// Read one dataset without digest verification (ignore-corrupt mode).
    ///
    /// # Errors
    /// [`Error::KeyNotFound`] for absent keys; decompression may still fail
    /// on badly mangled payloads.
    pub fn read_dataset_unverified(&self, group: &str, key: &str) -> Result<Dataset> {
        self.read_dataset_inner(group, key, false)
    }

    fn read_dataset_inner(&self, group: &str, key: &str, verify: bool) -> Result<Dataset> {
        let entry = self
            .index
            .get(group)
            .and_then(|g| g.get(key))
            .ok_or_else(|| Error::KeyNotFound {
                key: key.to_string(),
                group: (self.shape == Shape::Grouped).then(|| group.to_string()),
            })?;

        let mut payload = vec![0u8; entry.payload_len as usize];
        let mut reader = &self.file;
        reader.seek(SeekFrom::Start(entry.payload_offset))?;
        reader.read_exact(&mut payload)?;

        if verify && codec::digest(&payload) != entry.digest {
            return Err(Error::DatasetCorrupt {
                group: group.to_string(),
                key: key.to_string(),
            });
        }

        let raw = self.compression.decompress(&payload)?;
        let value: StoredValue = serde_json::from_slice(&raw)?;
        Ok(Dataset {
            units: entry.units.clone(),
            value,
        })
    }
}

/// Flat-shape convenience: the single anonymous group.
pub const FLAT_GROUP: &str = "";

struct ScanResult {
    shape: Shape,
    compression: Compression,
    index: BTreeMap<String, BTreeMap<String, DatasetEntry>>,
    end: u64,
    truncate_at: Option<u64>,
}

/// Replay all blocks, building the live index. A clean EOF lands exactly on
/// a block boundary; anything else reports the offset where valid data ends.
fn scan(file: &File) -> Result<ScanResult> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(0))?;
    let (shape, compression) = codec::read_header(&mut reader)?;

    let mut index: BTreeMap<String, BTreeMap<String, DatasetEntry>> = BTreeMap::new();
    let mut pos = codec::HEADER_LEN;

    loop {
        if pos == file_len {
            return Ok(ScanResult {
                shape,
                compression,
                index,
                end: pos,
                truncate_at: None,
            });
        }
        let block_start = pos;
        match read_block(&mut reader, &mut pos, file_len) {
            Ok(Block::Group { name, datasets }) => {
                // last block wins: a rewritten group replaces its predecessor
                index.insert(name, datasets);
            }
            Ok(Block::Tombstone { name }) => {
                index.remove(&name);
            }
            Err(_) => {
                return Ok(ScanResult {
                    shape,
                    compression,
                    index,
                    end: block_start,
                    truncate_at: Some(block_start),
                });
            }
        }
    }
}

enum Block {
    Group {
        name: String,
        datasets: BTreeMap<String, DatasetEntry>,
    },
    Tombstone {
        name: String,
    },
}

fn read_block(
    reader: &mut BufReader<&File>,
    pos: &mut u64,
    file_len: u64,
) -> Result<Block> {
    let kind = reader.read_u8()?;
    *pos += 1;
    match kind {
        codec::BLOCK_GROUP => {
            let name = read_counted_str(reader, pos)?;
            let count = reader.read_u32::<LittleEndian>()?;
            *pos += 4;
            let mut datasets = BTreeMap::new();
            for _ in 0..count {
                let key = read_counted_str(reader, pos)?;
                let units = read_counted_str(reader, pos)?;
                let len = reader.read_u32::<LittleEndian>()?;
                *pos += 4;
                let payload_offset = *pos;
                if payload_offset + u64::from(len) + 16 > file_len {
                    return Err(Error::Archive("payload runs past end of file".to_string()));
                }
                reader.seek_relative(i64::from(len))?;
                let mut digest = [0u8; 16];
                reader.read_exact(&mut digest)?;
                *pos += u64::from(len) + 16;
                datasets.insert(
                    key,
                    DatasetEntry {
                        units,
                        payload_offset,
                        payload_len: len,
                        digest,
                    },
                );
            }
            Ok(Block::Group { name, datasets })
        }
        codec::BLOCK_TOMBSTONE => {
            let name = read_counted_str(reader, pos)?;
            Ok(Block::Tombstone { name })
        }
        other => Err(Error::Archive(format!("unknown block tag {other}"))),
    }
}

fn read_counted_str(reader: &mut BufReader<&File>, pos: &mut u64) -> Result<String> {
    let s = codec::read_str(reader)?;
    *pos += 2 + s.len() as u64;
    Ok(s)
}
