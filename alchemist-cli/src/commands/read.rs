//! Read command.

use super::CmdResult;
use alchemist_archive::{Archive, ArchiveFormat};
use alchemist_core::entry::EntryKind;
use alchemist_core::error::AlchemistError;
use std::io::Write;
use std::path::Path;

pub fn cmd_read(
    file: &Path,
    format: Option<ArchiveFormat>,
    path: &str,
    index: usize,
) -> CmdResult {
    let archive = Archive::open(file, format)?;
    let matches = archive.find_all(path);
    let entry = matches
        .get(index)
        .map(|&i| &archive.entries[i])
        .ok_or_else(|| AlchemistError::entry_not_found(format!("{} (index {})", path, index)))?;

    match &entry.kind {
        EntryKind::File(data) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
        }
        EntryKind::Symlink(target) | EntryKind::Hardlink(target) => println!("{}", target),
        EntryKind::Directory => return Err(AlchemistError::is_directory(path).into()),
    }
    Ok(())
}
