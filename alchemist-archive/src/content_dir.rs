//! Walk a local directory tree into archive items (`--content-directory`).
//!
//! Symlinks are never followed: a linked directory or file becomes a symlink
//! item carrying its literal target.

use alchemist_core::entry::EntryKind;
use alchemist_core::error::{AlchemistError, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Component, Path};
use walkdir::WalkDir;

/// One item found under the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    /// Archive path (directories end with `/`).
    pub path: String,
    /// Kind and payload.
    pub kind: EntryKind,
    /// Permission bits of the source, where the platform exposes them.
    pub source_mode: Option<u32>,
}

#[cfg(unix)]
fn source_mode(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & alchemist_core::mode::PERM_MASK)
}

#[cfg(not(unix))]
fn source_mode(_meta: &fs::Metadata) -> Option<u32> {
    None
}

fn join_archive_path(base: &str, rel: &Path) -> String {
    let mut path = base.to_string();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&part.to_string_lossy());
        }
    }
    path
}

/// Collect `dir` recursively, placing it at `archive_path` inside the archive.
///
/// The result lists the parents of `archive_path`, then `archive_path/`
/// itself, then the tree contents in sorted walk order.
pub fn walk_tree(dir: &Path, archive_path: &str) -> Result<Vec<TreeItem>> {
    if !dir.is_dir() {
        return Err(AlchemistError::usage(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let base = archive_path.trim_end_matches('/');
    let mut items = Vec::new();

    // Parents of the destination, so extractors see a complete hierarchy.
    let mut parent = String::new();
    let parts: Vec<&str> = base.split('/').collect();
    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        parent.push_str(part);
        parent.push('/');
        if part.is_empty() || *part == "." || *part == ".." {
            continue;
        }
        items.push(TreeItem {
            path: parent.clone(),
            kind: EntryKind::Directory,
            source_mode: None,
        });
    }

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let path = join_archive_path(base, rel);
        let file_type = entry.file_type();
        let meta = entry.metadata().map_err(std::io::Error::from)?;

        let item = if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            TreeItem {
                path,
                kind: EntryKind::Symlink(target.to_string_lossy().into_owned()),
                source_mode: None,
            }
        } else if file_type.is_dir() {
            if path.is_empty() {
                continue;
            }
            TreeItem {
                path: format!("{}/", path),
                kind: EntryKind::Directory,
                source_mode: source_mode(&meta),
            }
        } else if file_type.is_file() {
            TreeItem {
                path,
                kind: EntryKind::File(fs::read(entry.path())?),
                source_mode: source_mode(&meta),
            }
        } else {
            warn!("Skipping special file {}", entry.path().display());
            continue;
        };

        debug!("Collected {} from {}", item.path, entry.path().display());
        items.push(item);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_tree_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/empty")).unwrap();
        fs::write(dir.path().join("top.txt"), b"top").unwrap();
        fs::write(dir.path().join("sub/inner.txt"), b"inner").unwrap();

        let items = walk_tree(dir.path(), "pkg/data/").unwrap();
        let paths: Vec<&str> = items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "pkg/",
                "pkg/data/",
                "pkg/data/sub/",
                "pkg/data/sub/empty/",
                "pkg/data/sub/inner.txt",
                "pkg/data/top.txt",
            ]
        );
        assert_eq!(items[4].kind, EntryKind::File(b"inner".to_vec()));
    }

    #[test]
    fn test_walk_tree_at_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"1").unwrap();
        let items = walk_tree(dir.path(), "").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "a");
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_tree_symlinks_and_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("script"), b"#!/bin/sh").unwrap();
        fs::set_permissions(dir.path().join("script"), fs::Permissions::from_mode(0o750)).unwrap();
        std::os::unix::fs::symlink("/etc", dir.path().join("etc-link")).unwrap();

        let items = walk_tree(dir.path(), "x").unwrap();
        let link = items.iter().find(|i| i.path == "x/etc-link").unwrap();
        assert_eq!(link.kind, EntryKind::Symlink("/etc".into()));
        let script = items.iter().find(|i| i.path == "x/script").unwrap();
        assert_eq!(script.source_mode, Some(0o750));
    }

    #[test]
    fn test_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            walk_tree(&file, "x"),
            Err(AlchemistError::Usage { .. })
        ));
    }
}
