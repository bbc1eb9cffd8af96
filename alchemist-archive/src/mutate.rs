//! Archive mutations: add, replace, append, modify and remove.
//!
//! All operations work on the in-memory entry list. Nothing here deduplicates:
//! `add` happily writes a second member under an existing name, which is how
//! collision archives are built.

use crate::archive::Archive;
use crate::content_dir;
use crate::detect::ArchiveFormat;
use crate::time;
use alchemist_core::entry::{Entry, EntryKind, FormatExtras, TarExtras, ZipExtras};
use alchemist_core::error::{AlchemistError, Result};
use alchemist_core::mode::{MODE_MASK, apply_special_bits};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Where the data of a new entry comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Literal file content.
    Content(Vec<u8>),
    /// Symbolic link to the given target.
    Symlink(String),
    /// Hard link to another member path.
    Hardlink(String),
    /// A local directory tree, added recursively.
    Directory(PathBuf),
}

impl Default for Payload {
    fn default() -> Self {
        Self::Content(Vec::new())
    }
}

/// Metadata supplied alongside a payload. Unset fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    /// Permission bits; the format default when unset.
    pub mode: Option<u32>,
    /// Owner user ID.
    pub uid: Option<u32>,
    /// Owner group ID.
    pub gid: Option<u32>,
    /// Modification time; now when unset.
    pub mtime: Option<u64>,
    /// OR the setuid bit onto the mode.
    pub setuid: bool,
    /// OR the setgid bit onto the mode.
    pub setgid: bool,
    /// OR the sticky bit onto the mode.
    pub sticky: bool,
    /// Path written into a ZIP Unicode Path extra field.
    pub unicode_path: Option<String>,
}

impl Attributes {
    /// Builder method to set the mode.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Builder method to set uid and gid.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    /// Builder method to set the modification time.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Builder method to request special bits.
    pub fn with_special_bits(mut self, setuid: bool, setgid: bool, sticky: bool) -> Self {
        self.setuid = setuid;
        self.setgid = setgid;
        self.sticky = sticky;
        self
    }

    fn has_changes(&self) -> bool {
        self.mode.is_some()
            || self.uid.is_some()
            || self.gid.is_some()
            || self.mtime.is_some()
            || self.setuid
            || self.setgid
            || self.sticky
            || self.unicode_path.is_some()
    }
}

/// Deltas applied by [`Archive::modify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modification {
    /// Attribute changes.
    pub attributes: Attributes,
    /// Convert matches into symlinks to this target.
    pub symlink: Option<String>,
    /// Convert matches into hardlinks to this target.
    pub hardlink: Option<String>,
}

impl Archive {
    /// Default permission bits for a new entry of `kind` in this format.
    pub fn default_mode(&self, kind: &EntryKind) -> u32 {
        match (kind, self.format) {
            (EntryKind::Directory, _) => 0o755,
            (_, ArchiveFormat::Zip) => 0o644,
            _ => 0o744,
        }
    }

    fn build_entry(
        &self,
        path: String,
        kind: EntryKind,
        source_mode: Option<u32>,
        attrs: &Attributes,
    ) -> Entry {
        let base = attrs
            .mode
            .or(source_mode)
            .unwrap_or_else(|| self.default_mode(&kind));
        let mode = apply_special_bits(base, attrs.setuid, attrs.setgid, attrs.sticky) & MODE_MASK;

        let extras = match self.format {
            ArchiveFormat::Zip => FormatExtras::Zip(ZipExtras {
                unicode_path: attrs.unicode_path.clone(),
                ..ZipExtras::default()
            }),
            _ => FormatExtras::Tar(TarExtras::default()),
        };

        Entry {
            path,
            kind,
            mode,
            uid: attrs.uid.unwrap_or(0),
            gid: attrs.gid.unwrap_or(0),
            mtime: attrs.mtime.unwrap_or_else(time::now_unix),
            extras,
        }
    }

    /// Add an entry at `path`. Returns the number of entries written.
    ///
    /// Single payloads always append, even over an existing path. A
    /// [`Payload::Directory`] tree instead replaces the last entry with the same
    /// path, so re-adding a tree does not duplicate it.
    pub fn add(&mut self, path: &str, payload: Payload, attrs: &Attributes) -> Result<usize> {
        if attrs.unicode_path.is_some() && self.format != ArchiveFormat::Zip {
            warn!("--unicode-path only applies to ZIP archives, ignoring it");
        }

        let kind = match payload {
            Payload::Directory(dir) => {
                let items = content_dir::walk_tree(&dir, path)?;
                let count = items.len();
                for item in items {
                    let entry = self.build_entry(item.path, item.kind, item.source_mode, attrs);
                    self.upsert(entry);
                }
                info!("Added {} entries from {}", count, dir.display());
                return Ok(count);
            }
            Payload::Content(data) => EntryKind::File(data),
            Payload::Symlink(target) => EntryKind::Symlink(target),
            Payload::Hardlink(target) => EntryKind::Hardlink(target),
        };

        let entry = self.build_entry(path.to_string(), kind, None, attrs);
        debug!(
            "Adding {} {} (mode {:04o})",
            entry.kind.name(),
            entry.path,
            entry.mode
        );
        self.entries.push(entry);
        Ok(1)
    }

    fn upsert(&mut self, entry: Entry) {
        match self.find_last(&entry.path) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
    }

    /// Remove `path` (and everything under it), then add the payload.
    pub fn replace(&mut self, path: &str, payload: Payload, attrs: &Attributes) -> Result<usize> {
        match self.remove(path, true) {
            Ok(removed) => debug!("Removed {} entries for {}", removed, path),
            Err(AlchemistError::EntryNotFound { .. }) => {
                warn!("{} not found in the archive, adding it", path);
            }
            Err(e) => return Err(e),
        }
        self.add(path, payload, attrs)
    }

    /// Concatenate `data` onto the last file entry named `path`.
    ///
    /// Returns the index of the entry that grew.
    pub fn append(&mut self, path: &str, data: &[u8]) -> Result<usize> {
        let index = self
            .find_last(path)
            .ok_or_else(|| AlchemistError::entry_not_found(path))?;
        match &mut self.entries[index].kind {
            EntryKind::File(content) => content.extend_from_slice(data),
            _ => return Err(AlchemistError::not_a_file(path)),
        }
        debug!("Appended {} bytes to {}", data.len(), path);
        Ok(index)
    }

    /// Apply `changes` to every entry whose path equals `path`.
    pub fn modify(&mut self, path: &str, changes: &Modification) -> Result<usize> {
        if changes.symlink.is_some() && changes.hardlink.is_some() {
            return Err(AlchemistError::usage(
                "Cannot specify both --symlink and --hardlink",
            ));
        }
        if !changes.attributes.has_changes()
            && changes.symlink.is_none()
            && changes.hardlink.is_none()
        {
            return Err(AlchemistError::usage("No modifications specified"));
        }

        let indices = self.find_all(path);
        if indices.is_empty() {
            return Err(AlchemistError::entry_not_found(path));
        }

        let attrs = &changes.attributes;
        for &index in &indices {
            let entry = &mut self.entries[index];
            if let Some(mode) = attrs.mode {
                entry.mode = mode & MODE_MASK;
            }
            entry.mode = apply_special_bits(entry.mode, attrs.setuid, attrs.setgid, attrs.sticky);
            if let Some(uid) = attrs.uid {
                entry.uid = uid;
            }
            if let Some(gid) = attrs.gid {
                entry.gid = gid;
            }
            if let Some(mtime) = attrs.mtime {
                entry.mtime = mtime;
            }
            if let Some(target) = &changes.symlink {
                entry.kind = EntryKind::Symlink(target.clone());
            } else if let Some(target) = &changes.hardlink {
                entry.kind = EntryKind::Hardlink(target.clone());
            }
            if let Some(unicode) = &attrs.unicode_path {
                if let FormatExtras::Zip(zip) = &mut entry.extras {
                    zip.unicode_path = Some(unicode.clone());
                } else if self.format == ArchiveFormat::Zip {
                    entry.extras = FormatExtras::Zip(ZipExtras {
                        unicode_path: Some(unicode.clone()),
                        ..ZipExtras::default()
                    });
                } else {
                    warn!("--unicode-path only applies to ZIP archives, ignoring it");
                }
            }
        }

        debug!("Modified {} entries named {}", indices.len(), path);
        Ok(indices.len())
    }

    /// Remove `path` and its `path/` spelling; with `recursive`, everything
    /// nested under it too. Returns the number of entries removed.
    pub fn remove(&mut self, path: &str, recursive: bool) -> Result<usize> {
        // "dir" and "dir/" name the same member.
        let base = path.trim_end_matches('/');
        let prefix = format!("{}/", base);
        let before = self.entries.len();

        self.entries.retain(|entry| {
            let exact = entry.path == path || entry.path == base || entry.path == prefix;
            let nested = recursive && entry.path.starts_with(&prefix);
            !(exact || nested)
        });

        let removed = before - self.entries.len();
        if removed == 0 {
            return Err(AlchemistError::entry_not_found(path));
        }
        Ok(removed)
    }
}
