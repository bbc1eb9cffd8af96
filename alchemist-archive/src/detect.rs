//! Archive format auto-detection.
//!
//! Resolution order: an explicit override, then magic bytes of a non-empty
//! existing file, then a structural TAR header check, then the file extension,
//! and finally ZIP.

use crate::compress::Compression;
use alchemist_core::error::{AlchemistError, Result};
use log::info;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Archive formats the codecs can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// ZIP archive (.zip).
    Zip,
    /// Uncompressed TAR archive (.tar).
    Tar,
    /// Gzip-compressed TAR (.tar.gz, .tgz).
    TarGz,
    /// XZ-compressed TAR (.tar.xz, .txz).
    TarXz,
    /// Bzip2-compressed TAR (.tar.bz2, .tbz2).
    TarBz2,
}

/// Leading-byte signatures, checked in order.
const MAGIC_TABLE: &[(&[u8], ArchiveFormat)] = &[
    (&[0x50, 0x4B, 0x03, 0x04], ArchiveFormat::Zip),
    (&[0x1F, 0x8B], ArchiveFormat::TarGz),
    (&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00], ArchiveFormat::TarXz),
    (&[0x42, 0x5A, 0x68], ArchiveFormat::TarBz2),
];

/// Filename suffixes, longest first so `.tar.gz` wins over `.gz`-less `.tar`.
const EXTENSION_TABLE: &[(&str, ArchiveFormat)] = &[
    (".tar.gz", ArchiveFormat::TarGz),
    (".tar.xz", ArchiveFormat::TarXz),
    (".tar.bz2", ArchiveFormat::TarBz2),
    (".tgz", ArchiveFormat::TarGz),
    (".txz", ArchiveFormat::TarXz),
    (".tbz2", ArchiveFormat::TarBz2),
    (".tar", ArchiveFormat::Tar),
    (".zip", ArchiveFormat::Zip),
];

impl ArchiveFormat {
    /// All formats, in CLI order.
    pub const ALL: [Self; 5] = [Self::Zip, Self::Tar, Self::TarGz, Self::TarXz, Self::TarBz2];

    /// Detect format from the leading bytes of a file.
    ///
    /// Falls back to a structural TAR check (valid header checksum at
    /// offset 0) when no signature matches.
    pub fn from_magic(magic: &[u8]) -> Option<Self> {
        for (signature, format) in MAGIC_TABLE {
            if magic.starts_with(signature) {
                return Some(*format);
            }
        }

        if crate::tar::looks_like_tar(magic) {
            return Some(Self::Tar);
        }

        None
    }

    /// Detect format from a filename suffix (case-insensitive).
    pub fn from_extension(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        EXTENSION_TABLE
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// Resolve the format for `path`, honoring an explicit override.
    pub fn resolve(path: &Path, explicit: Option<Self>) -> Result<Self> {
        if let Some(format) = explicit {
            return Ok(format);
        }

        let format = Self::sniff(path)?
            .or_else(|| Self::from_extension(path))
            .unwrap_or(Self::Zip);
        info!("Auto-detected archive type: {}", format);
        Ok(format)
    }

    /// Read the first header block of an existing, non-empty file and classify it.
    fn sniff(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }

        let mut head = Vec::with_capacity(crate::tar::BLOCK_SIZE);
        File::open(path)?
            .take(crate::tar::BLOCK_SIZE as u64)
            .read_to_end(&mut head)?;
        if head.is_empty() {
            return Ok(None);
        }

        Ok(Self::from_magic(&head))
    }

    /// Name used on the command line and in listings.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
            Self::TarBz2 => "tar.bz2",
        }
    }

    /// Stream compression wrapped around the TAR data, if any.
    pub fn compression(&self) -> Option<Compression> {
        match self {
            Self::TarGz => Some(Compression::Gzip),
            Self::TarXz => Some(Compression::Xz),
            Self::TarBz2 => Some(Compression::Bzip2),
            Self::Zip | Self::Tar => None,
        }
    }

    /// Check if this is a member of the TAR family.
    pub fn is_tar(&self) -> bool {
        !matches!(self, Self::Zip)
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ArchiveFormat {
    type Err = AlchemistError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AlchemistError::usage(format!("Unknown archive type: {}", s)))
    }
}
