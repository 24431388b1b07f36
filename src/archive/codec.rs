//! Archive container wire format.
//!
//! A container is a header followed by append-only blocks:
//!
//! ```text
//! magic "SWDB" | version u16 | shape u8 | compression u8
//! block := 0x01 group-name{u16+bytes} count{u32} dataset*
//!        | 0x02 group-name{u16+bytes}            (tombstone)
//! dataset := key{u16+bytes} units{u16+bytes} len{u32} payload digest[16]
//! ```
//!
//! Payloads are the JSON encoding of a [`StoredValue`](super::dataset::StoredValue),
//! compressed; the MD5 digest of the compressed bytes rides directly behind
//! the payload so corruption is detected per dataset, not per file. All
//! integers are little-endian. Appending is the only mutation; a group is
//! removed by appending a tombstone and the last block wins on replay.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use md5::{Digest as _, Md5};

use crate::{Error, Result};

/// Container magic bytes.
pub const MAGIC: [u8; 4] = *b"SWDB";
/// Current format version.
pub const VERSION: u16 = 1;

/// Group block tag.
pub const BLOCK_GROUP: u8 = 0x01;
/// Tombstone block tag.
pub const BLOCK_TOMBSTONE: u8 = 0x02;

/// Container shape: whether datasets are namespaced by trial group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One group per trial (archive builds)
    Grouped,
    /// No group level; one dataset per key spanning all trials (filtered
    /// exports)
    Flat,
}

impl Shape {
    /// Header byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Grouped => 0,
            Self::Flat => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Self::Grouped),
            1 => Ok(Self::Flat),
            other => Err(Error::Archive(format!("unknown shape tag {other}"))),
        }
    }
}

/// Payload compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// LZ4: fast, the default
    #[default]
    Lz4,
    /// ZSTD: better ratio, slower
    Zstd,
}

impl Compression {
    /// Algorithm name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Header byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Lz4 => 0,
            Self::Zstd => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Self::Lz4),
            1 => Ok(Self::Zstd),
            other => Err(Error::Archive(format!("unknown compression id {other}"))),
        }
    }

    /// Compress a payload.
    ///
    /// # Errors
    /// Returns [`Error::Archive`] on a ZSTD internal failure.
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => zstd::encode_all(data, 3)
                .map_err(|e| Error::Archive(format!("zstd compression failed: {e}"))),
        }
    }

    /// Decompress a payload.
    ///
    /// # Errors
    /// Returns [`Error::Archive`] on corrupted input.
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| Error::Archive(format!("lz4 decompression failed: {e}"))),
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::Archive(format!("zstd decompression failed: {e}"))),
        }
    }
}

/// MD5 digest of a byte slice.
#[must_use]
pub fn digest(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Write the container header.
///
/// # Errors
/// Propagates IO failures.
pub fn write_header<W: Write>(w: &mut W, shape: Shape, compression: Compression) -> Result<()> {
    w.write_all(&MAGIC)?;
    w.write_u16::<LittleEndian>(VERSION)?;
    w.write_u8(shape.as_byte())?;
    w.write_u8(compression.as_byte())?;
    Ok(())
}

/// Header byte length.
pub const HEADER_LEN: u64 = 8;

/// Read and validate the container header.
///
/// # Errors
/// Returns [`Error::Archive`] on a bad magic, unsupported version, or
/// unknown shape/compression byte.
pub fn read_header<R: Read>(r: &mut R) -> Result<(Shape, Compression)> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)
        .map_err(|_| Error::Archive("file too short for container header".to_string()))?;
    if magic != MAGIC {
        return Err(Error::Archive("bad magic; not an archive container".to_string()));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != VERSION {
        return Err(Error::Archive(format!(
            "unsupported container version {version} (expected {VERSION})"
        )));
    }
    let shape = Shape::from_byte(r.read_u8()?)?;
    let compression = Compression::from_byte(r.read_u8()?)?;
    Ok((shape, compression))
}

/// Write a length-prefixed string.
///
/// # Errors
/// Rejects strings longer than `u16::MAX` bytes; propagates IO failures.
pub fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| Error::Archive(format!("string too long for frame: {} bytes", bytes.len())))?;
    w.write_u16::<LittleEndian>(len)?;
    w.write_all(bytes)?;
    Ok(())
}

/// Read a length-prefixed string.
///
/// # Errors
/// Returns [`Error::Archive`] on truncation or invalid UTF-8.
pub fn read_str<R: Read>(r: &mut R) -> Result<String> {
    let len = r
        .read_u16::<LittleEndian>()
        .map_err(|_| Error::Archive("truncated string frame".to_string()))?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)
        .map_err(|_| Error::Archive("truncated string frame".to_string()))?;
    String::from_utf8(buf).map_err(|e| Error::Archive(format!("invalid UTF-8 in frame: {e}")))
}
