//! Add and replace commands.

use super::CmdResult;
use crate::utils::{AttrArgs, PayloadArgs};
use alchemist_archive::mutate::Payload;
use alchemist_archive::{Archive, ArchiveFormat};
use alchemist_core::error::AlchemistError;
use std::path::Path;

fn describe(path: &str, payload: &Payload) -> String {
    match payload {
        Payload::Content(_) => path.to_string(),
        Payload::Symlink(target) => format!("symlink {} -> {}", path, target),
        Payload::Hardlink(target) => format!("hardlink {} -> {}", path, target),
        Payload::Directory(dir) => format!("{} (from {})", path, dir.display()),
    }
}

pub fn cmd_add(
    file: &Path,
    format: Option<ArchiveFormat>,
    path: &str,
    payload: PayloadArgs,
    attrs: &AttrArgs,
    unicode_path: Option<String>,
) -> CmdResult {
    // No payload at all means an empty regular file.
    let payload = payload.resolve()?.unwrap_or_default();
    let label = describe(path, &payload);

    let mut archive = Archive::open_or_create(file, format)?;
    archive.add(path, payload, &attrs.to_attributes(unicode_path))?;
    archive.save(file)?;

    println!("Added {} to {}", label, file.display());
    Ok(())
}

pub fn cmd_replace(
    file: &Path,
    format: Option<ArchiveFormat>,
    path: &str,
    payload: PayloadArgs,
    attrs: &AttrArgs,
    unicode_path: Option<String>,
) -> CmdResult {
    let payload = payload.resolve()?.ok_or_else(|| {
        AlchemistError::usage(
            "One of --content, --content-file, --content-directory, --symlink or --hardlink must be specified",
        )
    })?;
    let label = describe(path, &payload);

    let mut archive = Archive::open(file, format)?;
    archive.replace(path, payload, &attrs.to_attributes(unicode_path))?;
    archive.save(file)?;

    println!("Replaced {} in {}", label, file.display());
    Ok(())
}
