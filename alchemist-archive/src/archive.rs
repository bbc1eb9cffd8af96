//! The in-memory archive and its load/save cycle.
//!
//! An [`Archive`] owns an ordered entry list for one command. Physical order is
//! on-disk order, duplicates are kept, and every save re-serializes the whole
//! list (the plain TAR append splice in [`crate::tar::splice_from`] excepted).

use crate::compress;
use crate::detect::ArchiveFormat;
use crate::{tar, zip};
use alchemist_core::entry::Entry;
use alchemist_core::error::{AlchemistError, Result};
use log::debug;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// A non-fatal finding recorded while parsing (checksum or header mismatch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Byte offset of the structure concerned, when known.
    pub offset: Option<u64>,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic tied to an offset.
    pub fn at(offset: u64, message: impl Into<String>) -> Self {
        Self {
            offset: Some(offset),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (offset {})", self.message, offset),
            None => write!(f, "{}", self.message),
        }
    }
}

/// An archive held fully in memory.
#[derive(Debug, Clone)]
pub struct Archive {
    /// Container format used for parsing and serialization.
    pub format: ArchiveFormat,
    /// Members in physical order.
    pub entries: Vec<Entry>,
    /// Findings from the last parse.
    pub diagnostics: Vec<Diagnostic>,
}

impl Archive {
    /// Create an empty archive.
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            entries: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Parse serialized archive bytes.
    pub fn parse(format: ArchiveFormat, bytes: &[u8]) -> Result<Self> {
        let (entries, diagnostics) = match format {
            ArchiveFormat::Zip => zip::parse(bytes)?,
            _ => {
                let stream = decode_stream(format, bytes)?;
                tar::parse(&stream)?
            }
        };
        debug!("Parsed {} entries from {} archive", entries.len(), format);

        Ok(Self {
            format,
            entries,
            diagnostics,
        })
    }

    /// Open an existing archive, resolving its format.
    pub fn open(path: &Path, explicit: Option<ArchiveFormat>) -> Result<Self> {
        if !path.exists() {
            return Err(AlchemistError::archive_missing(path.display().to_string()));
        }
        let format = ArchiveFormat::resolve(path, explicit)?;
        let bytes = fs::read(path)?;
        Self::parse(format, &bytes)
    }

    /// Open an archive, or start an empty one when the file is absent or empty.
    pub fn open_or_create(path: &Path, explicit: Option<ArchiveFormat>) -> Result<Self> {
        let format = ArchiveFormat::resolve(path, explicit)?;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(Self::new(format));
        }
        Self::parse(format, &bytes)
    }

    /// Serialize to the on-disk byte form, compressing TAR variants.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self.format {
            ArchiveFormat::Zip => zip::serialize(&self.entries),
            format => {
                let stream = tar::serialize(&self.entries)?;
                match format.compression() {
                    Some(compression) => compress::compress(compression, &stream),
                    None => Ok(stream),
                }
            }
        }
    }

    /// Serialize and replace the file at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_replacing(path, &bytes)
    }

    /// Index of the last entry whose path equals `path`.
    pub fn find_last(&self, path: &str) -> Option<usize> {
        self.entries.iter().rposition(|e| e.path == path)
    }

    /// Indices of every entry whose path equals `path`, in physical order.
    pub fn find_all(&self, path: &str) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.path == path)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Undo the stream compression of a TAR variant (identity for ZIP and plain TAR).
pub fn decode_stream(format: ArchiveFormat, bytes: &[u8]) -> Result<Vec<u8>> {
    match format.compression() {
        Some(compression) => compress::decompress(compression, bytes),
        None => Ok(bytes.to_vec()),
    }
}

/// Write `bytes` to a sibling `<file>.tmp`, then rename it over `path`.
pub fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
