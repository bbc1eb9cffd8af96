//! Argument groups and helpers shared by the commands.

use alchemist_archive::mutate::{Attributes, Payload};
use alchemist_core::error::{AlchemistError, Result};
use clap::Args;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

/// Inline or file-backed content (`append`, `polyglot`).
#[derive(Args, Debug, Default)]
pub struct ContentArgs {
    /// Literal content (bytes of the argument, taken as-is)
    #[arg(long)]
    pub content: Option<OsString>,

    /// Read the content from this local file
    #[arg(long)]
    pub content_file: Option<PathBuf>,
}

impl ContentArgs {
    /// Resolve to bytes. Exactly one source is required.
    pub fn require(self) -> Result<Vec<u8>> {
        read_content(self.content, self.content_file)?.ok_or_else(|| {
            AlchemistError::usage("Either --content or --content-file must be specified")
        })
    }
}

/// Every payload source of `add` and `replace`.
#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// Literal file content (bytes of the argument, taken as-is)
    #[arg(long)]
    pub content: Option<OsString>,

    /// Read file content from this local file
    #[arg(long)]
    pub content_file: Option<PathBuf>,

    /// Add this local directory tree recursively
    #[arg(long)]
    pub content_directory: Option<PathBuf>,

    /// Create a symlink to this target
    #[arg(long)]
    pub symlink: Option<String>,

    /// Create a hardlink to this target
    #[arg(long)]
    pub hardlink: Option<String>,
}

impl PayloadArgs {
    /// Pick the single payload given, or `None` when there is none.
    pub fn resolve(self) -> Result<Option<Payload>> {
        let given: Vec<&str> = [
            ("--content", self.content.is_some()),
            ("--content-file", self.content_file.is_some()),
            ("--content-directory", self.content_directory.is_some()),
            ("--symlink", self.symlink.is_some()),
            ("--hardlink", self.hardlink.is_some()),
        ]
        .into_iter()
        .filter(|(_, set)| *set)
        .map(|(flag, _)| flag)
        .collect();
        if given.len() > 1 {
            return Err(AlchemistError::usage(format!(
                "Cannot specify both {} and {}",
                given[0], given[1]
            )));
        }

        if let Some(target) = self.symlink {
            return Ok(Some(Payload::Symlink(target)));
        }
        if let Some(target) = self.hardlink {
            return Ok(Some(Payload::Hardlink(target)));
        }
        if let Some(dir) = self.content_directory {
            if !dir.is_dir() {
                return Err(AlchemistError::usage(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
            return Ok(Some(Payload::Directory(dir)));
        }
        Ok(read_content(self.content, self.content_file)?.map(Payload::Content))
    }
}

/// Attribute flags of `add`, `replace` and `modify`.
#[derive(Args, Debug, Default)]
pub struct AttrArgs {
    /// Permission bits in octal (e.g. 755 or 0o4755)
    #[arg(long, value_parser = parse_octal)]
    pub mode: Option<u32>,

    /// Owner user ID
    #[arg(long)]
    pub uid: Option<u32>,

    /// Owner group ID
    #[arg(long)]
    pub gid: Option<u32>,

    /// Modification time (seconds since the Unix epoch)
    #[arg(long)]
    pub mtime: Option<u64>,

    /// Set the setuid bit
    #[arg(long)]
    pub setuid: bool,

    /// Set the setgid bit
    #[arg(long)]
    pub setgid: bool,

    /// Set the sticky bit
    #[arg(long)]
    pub sticky: bool,
}

impl AttrArgs {
    /// Convert into library attributes.
    pub fn to_attributes(&self, unicode_path: Option<String>) -> Attributes {
        Attributes {
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            mtime: self.mtime,
            setuid: self.setuid,
            setgid: self.setgid,
            sticky: self.sticky,
            unicode_path,
        }
    }
}

/// Parse an octal mode, with or without a `0o` prefix.
pub fn parse_octal(value: &str) -> std::result::Result<u32, String> {
    let digits = value.trim_start_matches("0o");
    u32::from_str_radix(digits, 8).map_err(|_| format!("invalid octal mode: {}", value))
}

#[cfg(unix)]
fn os_bytes(value: OsString) -> Vec<u8> {
    use std::os::unix::ffi::OsStringExt;
    value.into_vec()
}

#[cfg(not(unix))]
fn os_bytes(value: OsString) -> Vec<u8> {
    value.to_string_lossy().into_owned().into_bytes()
}

/// Resolve `--content` / `--content-file` into bytes.
pub fn read_content(
    content: Option<OsString>,
    content_file: Option<PathBuf>,
) -> Result<Option<Vec<u8>>> {
    match (content, content_file) {
        (Some(_), Some(_)) => Err(AlchemistError::usage(
            "Cannot specify both --content and --content-file",
        )),
        (Some(content), None) => Ok(Some(os_bytes(content))),
        (None, Some(path)) => {
            if !path.is_file() {
                return Err(AlchemistError::content_file_not_found(
                    path.display().to_string(),
                ));
            }
            Ok(Some(fs::read(&path)?))
        }
        (None, None) => Ok(None),
    }
}
