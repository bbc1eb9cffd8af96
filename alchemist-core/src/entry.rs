//! Archive entry model.
//!
//! An [`Entry`] is one archive member exactly as stored: the path is kept
//! verbatim (it may start with `/` or contain `..`), and duplicate paths are
//! legal. Only the extraction engine ever interprets the path.

use std::path::{Component, Path};

/// What an entry is, together with the data that only makes sense for that kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file with its full, uncompressed content.
    File(Vec<u8>),
    /// Directory.
    Directory,
    /// Symbolic link to the given target, stored literally.
    Symlink(String),
    /// Hard link to another member path.
    Hardlink(String),
}

impl EntryKind {
    /// Short lowercase name used in listings and JSON output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Directory => "directory",
            Self::Symlink(_) => "symlink",
            Self::Hardlink(_) => "hardlink",
        }
    }
}

/// ZIP-only attributes that survive a parse/serialize cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZipExtras {
    /// Alternate path carried in the Info-ZIP Unicode Path (0x7075) field.
    pub unicode_path: Option<String>,
    /// Extra-field sub-records with tags the codec does not regenerate.
    pub extra: Vec<u8>,
    /// Per-entry comment from the central directory.
    pub comment: Vec<u8>,
}

/// TAR-only attributes that survive a parse/serialize cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TarExtras {
    /// Owner user name.
    pub uname: String,
    /// Owner group name.
    pub gname: String,
    /// Device major number.
    pub devmajor: u32,
    /// Device minor number.
    pub devminor: u32,
    /// Raw typeflag for kinds outside file/dir/link (device, fifo, contiguous).
    pub typeflag: Option<u8>,
    /// Offset of the first header block belonging to this entry, when parsed.
    pub header_offset: Option<u64>,
}

/// Format-specific data attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FormatExtras {
    /// Nothing beyond the common fields.
    #[default]
    Plain,
    /// ZIP extras.
    Zip(ZipExtras),
    /// TAR extras.
    Tar(TarExtras),
}

/// A single archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Member path, stored exactly as given.
    pub path: String,
    /// Kind and kind-specific payload.
    pub kind: EntryKind,
    /// Permission bits plus setuid/setgid/sticky (`0o7777`).
    pub mode: u32,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: u64,
    /// Format-specific extras.
    pub extras: FormatExtras,
}

impl Entry {
    fn with_kind(path: impl Into<String>, kind: EntryKind, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind,
            mode,
            uid: 0,
            gid: 0,
            mtime: 0,
            extras: FormatExtras::Plain,
        }
    }

    /// Create a regular file entry.
    pub fn file(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self::with_kind(path, EntryKind::File(content), 0o644)
    }

    /// Create a directory entry.
    pub fn directory(path: impl Into<String>) -> Self {
        Self::with_kind(path, EntryKind::Directory, 0o755)
    }

    /// Create a symbolic link entry.
    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(path, EntryKind::Symlink(target.into()), 0o777)
    }

    /// Create a hard link entry.
    pub fn hardlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(path, EntryKind::Hardlink(target.into()), 0o644)
    }

    /// Builder method to set the mode (masked to `0o7777`).
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & crate::mode::MODE_MASK;
        self
    }

    /// Builder method to set uid and gid.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Builder method to set the modification time.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Builder method to set format extras.
    pub fn with_extras(mut self, extras: FormatExtras) -> Self {
        self.extras = extras;
        self
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File(_))
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// File content, if this is a regular file.
    pub fn content(&self) -> Option<&[u8]> {
        match &self.kind {
            EntryKind::File(data) => Some(data),
            _ => None,
        }
    }

    /// Link target, if this is a symlink or hardlink.
    pub fn link_target(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Symlink(target) | EntryKind::Hardlink(target) => Some(target),
            _ => None,
        }
    }

    /// Size of the stored payload in bytes.
    pub fn size(&self) -> u64 {
        self.content().map_or(0, |c| c.len() as u64)
    }

    /// Leading character of the `ls -l` permission string.
    pub fn type_char(&self) -> char {
        match self.kind {
            EntryKind::Directory => 'd',
            EntryKind::Symlink(_) => 'l',
            EntryKind::Hardlink(_) => 'h',
            EntryKind::File(_) => '-',
        }
    }

    /// ZIP extras, if any.
    pub fn zip_extras(&self) -> Option<&ZipExtras> {
        match &self.extras {
            FormatExtras::Zip(z) => Some(z),
            _ => None,
        }
    }

    /// TAR extras, if any.
    pub fn tar_extras(&self) -> Option<&TarExtras> {
        match &self.extras {
            FormatExtras::Tar(t) => Some(t),
            _ => None,
        }
    }

    /// Get a sanitized path that's safe for extraction.
    ///
    /// Drops root, `.` and `..` components so the result is always relative
    /// and never climbs. The result is empty when nothing is left.
    pub fn sanitized_name(&self) -> String {
        let mut result = String::new();

        for component in Path::new(&self.path).components() {
            if let Component::Normal(s) = component {
                if !result.is_empty() {
                    result.push('/');
                }
                result.push_str(&s.to_string_lossy().replace('\0', "_"));
            }
        }

        result
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:>10} {}",
            crate::mode::format_mode(self.type_char(), self.mode),
            self.size(),
            self.path
        )?;
        match &self.kind {
            EntryKind::Symlink(target) => write!(f, " -> {}", target),
            EntryKind::Hardlink(target) => write!(f, " link to {}", target),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_file() {
        let entry = Entry::file("test.txt", b"hello".to_vec())
            .with_mode(0o100755)
            .with_owner(1000, 100);

        assert!(entry.is_file());
        assert!(!entry.is_dir());
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.mode, 0o755);
        assert_eq!(entry.content(), Some(&b"hello"[..]));
        assert_eq!(entry.link_target(), None);
    }

    #[test]
    fn test_entry_links() {
        let sym = Entry::symlink("config.txt", "/etc/passwd");
        assert_eq!(sym.type_char(), 'l');
        assert_eq!(sym.link_target(), Some("/etc/passwd"));
        assert_eq!(sym.size(), 0);

        let hard = Entry::hardlink("b", "a");
        assert_eq!(hard.type_char(), 'h');
        assert_eq!(hard.kind.name(), "hardlink");
    }

    #[test]
    fn test_path_kept_verbatim() {
        let entry = Entry::file("/../../etc/cron.d/x", Vec::new());
        assert_eq!(entry.path, "/../../etc/cron.d/x");
    }

    #[test]
    fn test_sanitized_name() {
        let entry = Entry::file("../etc/passwd", Vec::new());
        assert_eq!(entry.sanitized_name(), "etc/passwd");

        let entry = Entry::file("/absolute/path/file.txt", Vec::new());
        assert_eq!(entry.sanitized_name(), "absolute/path/file.txt");

        let entry = Entry::file("./current/./path/../file.txt", Vec::new());
        assert_eq!(entry.sanitized_name(), "current/path/file.txt");

        let entry = Entry::file("../..", Vec::new());
        assert_eq!(entry.sanitized_name(), "");
    }

    #[test]
    fn test_display() {
        let entry = Entry::symlink("link", "target").with_mode(0o777);
        assert_eq!(entry.to_string(), "lrwxrwxrwx          0 link -> target");
    }
}
