//! Modify command.

use super::CmdResult;
use crate::utils::AttrArgs;
use alchemist_archive::mutate::Modification;
use alchemist_archive::{Archive, ArchiveFormat};
use std::path::Path;

pub fn cmd_modify(
    file: &Path,
    format: Option<ArchiveFormat>,
    path: &str,
    attrs: &AttrArgs,
    symlink: Option<String>,
    hardlink: Option<String>,
) -> CmdResult {
    let changes = Modification {
        attributes: attrs.to_attributes(None),
        symlink,
        hardlink,
    };

    let mut archive = Archive::open(file, format)?;
    let count = archive.modify(path, &changes)?;
    archive.save(file)?;

    let what = match (&changes.symlink, &changes.hardlink) {
        (Some(target), _) => format!("{} to be a symlink to {}", path, target),
        (_, Some(target)) => format!("{} to be a hardlink to {}", path, target),
        _ => format!("attributes of {}", path),
    };
    if count > 1 {
        println!("Modified {} ({} entries) in {}", what, count, file.display());
    } else {
        println!("Modified {} in {}", what, file.display());
    }
    Ok(())
}
