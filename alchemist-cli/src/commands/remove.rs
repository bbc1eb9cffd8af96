//! Remove command.

use super::CmdResult;
use alchemist_archive::{Archive, ArchiveFormat};
use std::path::Path;

pub fn cmd_remove(
    file: &Path,
    format: Option<ArchiveFormat>,
    path: &str,
    recursive: bool,
) -> CmdResult {
    let mut archive = Archive::open(file, format)?;
    let before: Vec<String> = archive.entries.iter().map(|e| e.path.clone()).collect();
    let removed = archive.remove(path, recursive)?;
    archive.save(file)?;

    if removed == 1 {
        println!("Removed {} from {}", path, file.display());
    } else {
        println!("Removed {} entries from {}", removed, file.display());
        let kept: Vec<&str> = archive.entries.iter().map(|e| e.path.as_str()).collect();
        let mut remaining = kept.into_iter().peekable();
        for name in &before {
            if remaining.peek() == Some(&name.as_str()) {
                remaining.next();
            } else {
                println!("  - {}", name);
            }
        }
    }
    Ok(())
}
