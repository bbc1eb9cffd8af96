//! Append command.

use super::CmdResult;
use crate::utils::ContentArgs;
use alchemist_archive::{Archive, ArchiveFormat, tar};
use log::debug;
use std::path::Path;

pub fn cmd_append(
    file: &Path,
    format: Option<ArchiveFormat>,
    path: &str,
    content: ContentArgs,
) -> CmdResult {
    let data = content.require()?;
    let mut archive = Archive::open(file, format)?;
    let index = archive.append(path, &data)?;

    if archive.format == ArchiveFormat::Tar {
        // Rewrite from the grown entry onward; earlier bytes stay untouched.
        debug!("Splicing {} in place from entry {}", file.display(), index);
        tar::splice_from(file, &archive.entries, index)?;
    } else {
        archive.save(file)?;
    }

    println!("Appended {} bytes to {} in {}", data.len(), path, file.display());
    Ok(())
}
