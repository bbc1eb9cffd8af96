//! Polyglot command.

use super::CmdResult;
use crate::utils::ContentArgs;
use alchemist_archive::archive::write_replacing;
use alchemist_archive::{ArchiveFormat, polyglot};
use alchemist_core::error::AlchemistError;
use std::fs;
use std::path::Path;

pub fn cmd_polyglot(file: &Path, format: Option<ArchiveFormat>, content: ContentArgs) -> CmdResult {
    let prefix = content.require()?;
    if !file.exists() {
        return Err(AlchemistError::archive_missing(file.display().to_string()).into());
    }

    let format = ArchiveFormat::resolve(file, format)?;
    let bytes = fs::read(file)?;
    let out = polyglot::prepend(&bytes, format, &prefix)?;
    write_replacing(file, &out)?;

    println!(
        "Prepended {} bytes to {} ({} bytes total)",
        prefix.len(),
        file.display(),
        out.len()
    );
    Ok(())
}
