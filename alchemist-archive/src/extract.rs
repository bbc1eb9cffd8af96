//! Materialize archive entries on disk.
//!
//! Entries are written in physical order, so the last member for a path wins.
//! Safe mode confines every write to the output directory and never creates a
//! link. Vulnerable mode reproduces what a naive extractor does: paths are
//! joined verbatim, links are real, and special bits are applied.

use crate::archive::Archive;
use alchemist_core::entry::{Entry, EntryKind};
use alchemist_core::error::{AlchemistError, Result};
use alchemist_core::mode::{MODE_MASK, PERM_MASK};
use filetime::FileTime;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// How to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Destination root.
    pub output_dir: PathBuf,
    /// Join paths verbatim and create real links.
    pub vulnerable: bool,
    /// Force `0o644` for files and `0o755` for directories.
    pub normalize_permissions: bool,
    /// Only extract this path and everything nested under it.
    pub path_filter: Option<String>,
}

impl ExtractOptions {
    /// Safe extraction into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            vulnerable: false,
            normalize_permissions: false,
            path_filter: None,
        }
    }

    /// Builder method to toggle vulnerable mode.
    pub fn with_vulnerable(mut self, vulnerable: bool) -> Self {
        self.vulnerable = vulnerable;
        self
    }

    /// Builder method to toggle permission normalization.
    pub fn with_normalized_permissions(mut self, normalize: bool) -> Self {
        self.normalize_permissions = normalize;
        self
    }

    /// Builder method to restrict extraction to one path.
    pub fn with_path_filter(mut self, filter: Option<String>) -> Self {
        self.path_filter = filter;
        self
    }
}

/// Counts reported after an extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Regular files written.
    pub files: usize,
    /// Directories created.
    pub directories: usize,
    /// Real symbolic links created.
    pub symlinks: usize,
    /// Real hard links created (or copied when linking failed).
    pub hardlinks: usize,
    /// Text placeholders written in place of links.
    pub placeholders: usize,
    /// Entries whose sanitized path was empty.
    pub skipped: usize,
}

impl ExtractSummary {
    /// Everything that produced something on disk.
    pub fn total(&self) -> usize {
        self.files + self.directories + self.symlinks + self.hardlinks + self.placeholders
    }
}

struct DeferredLink {
    position: usize,
    dest: PathBuf,
    target: String,
    entry: usize,
}

fn matches_filter(path: &str, filter: &str) -> bool {
    let base = filter.trim_end_matches('/');
    path.trim_end_matches('/') == base || path.starts_with(&format!("{}/", base))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}

#[cfg(unix)]
fn make_symlink(target: &str, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn make_symlink(_target: &str, _dest: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

fn file_time(mtime: u64) -> FileTime {
    FileTime::from_unix_time(i64::try_from(mtime).unwrap_or(i64::MAX), 0)
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn ensure_parent(dest: &Path) -> io::Result<()> {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Remove whatever sits at `dest` without following symlinks.
fn clear_slot(dest: &Path) -> io::Result<()> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest),
        Ok(_) => fs::remove_file(dest),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

struct Extractor<'a> {
    archive: &'a Archive,
    options: &'a ExtractOptions,
    summary: ExtractSummary,
    directories: Vec<(PathBuf, u32, u64)>,
    deferred: Vec<DeferredLink>,
}

impl Extractor<'_> {
    fn destination(&self, entry: &Entry) -> Option<PathBuf> {
        if self.options.vulnerable {
            if entry.path.is_empty() {
                return None;
            }
            return Some(self.options.output_dir.join(&entry.path));
        }
        let name = entry.sanitized_name();
        if name.is_empty() {
            None
        } else {
            Some(self.options.output_dir.join(name))
        }
    }

    fn file_mode(&self, entry: &Entry) -> u32 {
        if self.options.normalize_permissions {
            0o644
        } else if self.options.vulnerable {
            entry.mode & MODE_MASK
        } else {
            entry.mode & PERM_MASK
        }
    }

    fn dir_mode(&self, entry: &Entry) -> u32 {
        if self.options.normalize_permissions {
            0o755
        } else if self.options.vulnerable {
            entry.mode & MODE_MASK
        } else {
            entry.mode & PERM_MASK
        }
    }

    /// Write a regular file over whatever occupies `dest`.
    ///
    /// Vulnerable mode writes through an existing symlink, and only replaces
    /// the link when its target cannot be written.
    fn write_file(&mut self, dest: &Path, data: &[u8], entry: &Entry) -> Result<()> {
        ensure_parent(dest)?;
        let through_link = self.options.vulnerable && is_symlink(dest);
        if !through_link {
            clear_slot(dest)?;
        }
        if let Err(e) = fs::write(dest, data) {
            if !through_link {
                return Err(e.into());
            }
            warn!(
                "Cannot write through symlink {} ({}), replacing it",
                dest.display(),
                e
            );
            clear_slot(dest)?;
            fs::write(dest, data)?;
        }
        set_mode(dest, self.file_mode(entry))?;
        filetime::set_file_mtime(dest, file_time(entry.mtime))?;
        Ok(())
    }

    fn write_placeholder(&mut self, dest: &Path, text: String, entry: &Entry) -> Result<()> {
        self.write_file(dest, text.as_bytes(), entry)?;
        self.summary.placeholders += 1;
        Ok(())
    }

    /// Hard link `dest` to `source`, copying the bytes when linking fails.
    fn link_or_copy(&mut self, source: &Path, dest: &Path) -> Result<()> {
        ensure_parent(dest)?;
        clear_slot(dest)?;
        if let Err(e) = fs::hard_link(source, dest) {
            debug!(
                "Hard link {} -> {} failed ({}), copying instead",
                dest.display(),
                source.display(),
                e
            );
            fs::copy(source, dest)?;
        }
        self.summary.hardlinks += 1;
        Ok(())
    }

    fn extract_entry(&mut self, position: usize, index: usize, entry: &Entry) -> Result<()> {
        let Some(dest) = self.destination(entry) else {
            debug!("Skipping {:?}, nothing left after sanitizing", entry.path);
            self.summary.skipped += 1;
            return Ok(());
        };
        debug!("Extracting {} -> {}", entry.path, dest.display());

        match &entry.kind {
            EntryKind::Directory => {
                // Without the trailing separator so a file at the path is seen.
                let slot: PathBuf = dest.components().collect();
                match fs::symlink_metadata(&slot) {
                    Ok(meta) if meta.is_dir() => {}
                    Ok(meta) if meta.file_type().is_symlink() && self.options.vulnerable => {}
                    Ok(_) => clear_slot(&slot)?,
                    Err(_) => {}
                }
                fs::create_dir_all(&dest)?;
                let mode = self.dir_mode(entry);
                self.directories.push((dest, mode, entry.mtime));
                self.summary.directories += 1;
            }
            EntryKind::File(data) => {
                self.write_file(&dest, data, entry)?;
                self.summary.files += 1;
            }
            EntryKind::Symlink(target) if self.options.vulnerable => {
                ensure_parent(&dest)?;
                clear_slot(&dest)?;
                match make_symlink(target, &dest) {
                    Ok(()) => {
                        let time = file_time(entry.mtime);
                        let _ = filetime::set_symlink_file_times(&dest, time, time);
                        self.summary.symlinks += 1;
                    }
                    Err(e) => {
                        warn!("Failed to create symlink {}: {}", dest.display(), e);
                        let text = format!("Failed to create symlink to: {}", target);
                        self.write_placeholder(&dest, text, entry)?;
                    }
                }
            }
            EntryKind::Symlink(target) => {
                let text = format!("symlink to: {}", target);
                self.write_placeholder(&dest, text, entry)?;
            }
            EntryKind::Hardlink(target) if self.options.vulnerable => {
                let source = self.options.output_dir.join(target);
                if source.is_file() {
                    self.link_or_copy(&source, &dest)?;
                } else {
                    debug!("Deferring hard link {} -> {}", entry.path, target);
                    self.deferred.push(DeferredLink {
                        position,
                        dest,
                        target: target.clone(),
                        entry: index,
                    });
                }
            }
            EntryKind::Hardlink(target) => {
                let text = format!("hardlink to: {}", target);
                self.write_placeholder(&dest, text, entry)?;
            }
        }
        Ok(())
    }

    fn resolve_deferred(&mut self, selected: &[usize]) -> Result<()> {
        let archive = self.archive;
        let deferred = std::mem::take(&mut self.deferred);
        for link in deferred {
            let claimed_later = selected[link.position + 1..].iter().any(|&i| {
                self.destination(&archive.entries[i]).as_deref() == Some(link.dest.as_path())
            });
            if claimed_later {
                debug!("Skipping deferred link {}, a later entry owns it", link.dest.display());
                continue;
            }

            let entry = &archive.entries[link.entry];
            let source = self.options.output_dir.join(&link.target);
            if source.is_file() {
                self.link_or_copy(&source, &link.dest)?;
                continue;
            }

            let content = archive
                .entries
                .iter()
                .rev()
                .find(|e| e.path == link.target)
                .and_then(Entry::content);
            match content {
                Some(data) => {
                    self.write_file(&link.dest, data, entry)?;
                    self.summary.hardlinks += 1;
                }
                None => {
                    warn!(
                        "Hard link target {} for {} not found, writing a placeholder",
                        link.target, entry.path
                    );
                    let text = format!("Hardlink to: {} (target not found)", link.target);
                    self.write_placeholder(&link.dest, text, entry)?;
                }
            }
        }
        Ok(())
    }

    fn finish_directories(&mut self) -> Result<()> {
        let mut directories = std::mem::take(&mut self.directories);
        directories.sort_by_key(|(path, _, _)| std::cmp::Reverse(path.components().count()));
        for (path, mode, mtime) in directories {
            // A later entry may have replaced the directory.
            if !fs::metadata(&path).is_ok_and(|m| m.is_dir()) {
                debug!("{} is no longer a directory, leaving its mode", path.display());
                continue;
            }
            set_mode(&path, mode)?;
            filetime::set_file_mtime(&path, file_time(mtime))?;
        }
        Ok(())
    }
}

impl Archive {
    /// Extract entries according to `options`.
    pub fn extract(&self, options: &ExtractOptions) -> Result<ExtractSummary> {
        let selected: Vec<usize> = match &options.path_filter {
            Some(filter) => {
                let hits: Vec<usize> = self
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| matches_filter(&e.path, filter))
                    .map(|(i, _)| i)
                    .collect();
                if hits.is_empty() {
                    return Err(AlchemistError::path_not_found(filter.as_str()));
                }
                hits
            }
            None => (0..self.entries.len()).collect(),
        };

        fs::create_dir_all(&options.output_dir)?;
        let mut extractor = Extractor {
            archive: self,
            options,
            summary: ExtractSummary::default(),
            directories: Vec::new(),
            deferred: Vec::new(),
        };

        for (position, &index) in selected.iter().enumerate() {
            extractor.extract_entry(position, index, &self.entries[index])?;
        }
        extractor.resolve_deferred(&selected)?;
        extractor.finish_directories()?;

        Ok(extractor.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ArchiveFormat;

    fn archive_of(entries: Vec<Entry>) -> Archive {
        let mut archive = Archive::new(ArchiveFormat::Tar);
        archive.entries = entries;
        archive
    }

    #[test]
    fn test_last_entry_wins() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_of(vec![
            Entry::symlink("config.txt", "/etc/passwd"),
            Entry::file("config.txt", b"X".to_vec()),
        ]);
        archive.extract(&ExtractOptions::new(dir.path())).unwrap();
        assert_eq!(fs::read(dir.path().join("config.txt")).unwrap(), b"X");
    }

    #[test]
    fn test_safe_mode_sanitizes() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let archive = archive_of(vec![
            Entry::file("../../evil.txt", b"evil".to_vec()),
            Entry::file("/abs/path.txt", b"abs".to_vec()),
            Entry::file("..", b"nothing".to_vec()),
        ]);
        let summary = archive.extract(&ExtractOptions::new(&out)).unwrap();

        assert_eq!(fs::read(out.join("evil.txt")).unwrap(), b"evil");
        assert_eq!(fs::read(out.join("abs/path.txt")).unwrap(), b"abs");
        assert!(!tmp.path().join("evil.txt").exists());
        assert_eq!(summary.files, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_safe_mode_link_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_of(vec![
            Entry::symlink("s", "/etc/passwd"),
            Entry::hardlink("h", "target"),
        ]);
        let summary = archive.extract(&ExtractOptions::new(dir.path())).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("s")).unwrap(), "symlink to: /etc/passwd");
        assert_eq!(fs::read_to_string(dir.path().join("h")).unwrap(), "hardlink to: target");
        assert_eq!(summary.placeholders, 2);
    }

    #[test]
    fn test_vulnerable_mode_traverses() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let archive = archive_of(vec![Entry::file("../evil.txt", b"evil".to_vec())]);
        archive
            .extract(&ExtractOptions::new(&out).with_vulnerable(true))
            .unwrap();
        assert_eq!(fs::read(tmp.path().join("evil.txt")).unwrap(), b"evil");
    }

    #[test]
    fn test_path_filter() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_of(vec![
            Entry::directory("keep/"),
            Entry::file("keep/a", b"a".to_vec()),
            Entry::file("keeper", b"no".to_vec()),
        ]);
        let options = ExtractOptions::new(dir.path()).with_path_filter(Some("keep".into()));
        let summary = archive.extract(&options).unwrap();
        assert_eq!(summary.total(), 2);
        assert!(!dir.path().join("keeper").exists());

        let missing = ExtractOptions::new(dir.path()).with_path_filter(Some("nope".into()));
        assert!(matches!(
            archive.extract(&missing),
            Err(AlchemistError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_file_replaces_directory() {
        for vulnerable in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let archive = archive_of(vec![
                Entry::directory("x/"),
                Entry::file("x/inner", b"gone".to_vec()),
                Entry::file("x", b"X".to_vec()),
            ]);
            archive
                .extract(&ExtractOptions::new(dir.path()).with_vulnerable(vulnerable))
                .unwrap();
            assert_eq!(fs::read(dir.path().join("x")).unwrap(), b"X");
        }
    }

    #[test]
    fn test_directory_replaces_file() {
        for vulnerable in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let archive = archive_of(vec![
                Entry::file("x", b"X".to_vec()),
                Entry::directory("x/"),
                Entry::file("x/inner", b"inner".to_vec()),
            ]);
            archive
                .extract(&ExtractOptions::new(dir.path()).with_vulnerable(vulnerable))
                .unwrap();
            assert!(dir.path().join("x").is_dir());
            assert_eq!(fs::read(dir.path().join("x/inner")).unwrap(), b"inner");
        }
    }

    #[test]
    fn test_placeholder_replaces_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_of(vec![
            Entry::directory("s/"),
            Entry::symlink("s", "/etc/passwd"),
        ]);
        archive.extract(&ExtractOptions::new(dir.path())).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("s")).unwrap(), "symlink to: /etc/passwd");
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_file_overwritten() {
        for vulnerable in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let archive = archive_of(vec![
                Entry::file("ro.txt", b"old".to_vec()).with_mode(0o444),
                Entry::file("ro.txt", b"new".to_vec()).with_mode(0o644),
            ]);
            archive
                .extract(&ExtractOptions::new(dir.path()).with_vulnerable(vulnerable))
                .unwrap();
            assert_eq!(fs::read(dir.path().join("ro.txt")).unwrap(), b"new");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_vulnerable_write_through_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let victim = tmp.path().join("victim.txt");
        fs::write(&victim, b"original").unwrap();

        let archive = archive_of(vec![
            Entry::symlink("config.txt", victim.to_string_lossy()),
            Entry::file("config.txt", b"overwritten".to_vec()),
        ]);
        archive
            .extract(&ExtractOptions::new(&out).with_vulnerable(true))
            .unwrap();
        assert_eq!(fs::read(&victim).unwrap(), b"overwritten");
        assert!(is_symlink(&out.join("config.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_modes_per_mode() {
        use std::os::unix::fs::PermissionsExt;

        let archive = archive_of(vec![Entry::file("su", b"x".to_vec()).with_mode(0o4755)]);
        let mode_of = |dir: &Path| fs::metadata(dir.join("su")).unwrap().permissions().mode() & 0o7777;

        let safe = tempfile::tempdir().unwrap();
        archive.extract(&ExtractOptions::new(safe.path())).unwrap();
        assert_eq!(mode_of(safe.path()), 0o755);

        let normalized = tempfile::tempdir().unwrap();
        archive
            .extract(&ExtractOptions::new(normalized.path()).with_normalized_permissions(true))
            .unwrap();
        assert_eq!(mode_of(normalized.path()), 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_vulnerable_symlink_is_real() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_of(vec![Entry::symlink("link", "/etc/hostname")]);
        archive
            .extract(&ExtractOptions::new(dir.path()).with_vulnerable(true))
            .unwrap();
        let target = fs::read_link(dir.path().join("link")).unwrap();
        assert_eq!(target, PathBuf::from("/etc/hostname"));
    }

    #[cfg(unix)]
    #[test]
    fn test_vulnerable_hardlink_deferred() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let archive = archive_of(vec![
            Entry::hardlink("early", "late"),
            Entry::file("late", b"payload".to_vec()),
            Entry::hardlink("orphan", "missing"),
        ]);
        archive
            .extract(&ExtractOptions::new(dir.path()).with_vulnerable(true))
            .unwrap();

        let early = fs::metadata(dir.path().join("early")).unwrap();
        let late = fs::metadata(dir.path().join("late")).unwrap();
        assert_eq!(early.ino(), late.ino());
        assert_eq!(
            fs::read_to_string(dir.path().join("orphan")).unwrap(),
            "Hardlink to: missing (target not found)"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_modes_applied_last() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let archive = archive_of(vec![
            Entry::directory("ro/").with_mode(0o555),
            Entry::file("ro/inner", b"x".to_vec()),
        ]);
        archive.extract(&ExtractOptions::new(dir.path())).unwrap();
        let mode = fs::metadata(dir.path().join("ro")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);
        assert!(dir.path().join("ro/inner").exists());

        fs::set_permissions(dir.path().join("ro"), fs::Permissions::from_mode(0o755)).unwrap();
    }
}
