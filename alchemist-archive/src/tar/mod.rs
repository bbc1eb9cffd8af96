//! TAR codec.
//!
//! Reads and writes USTAR headers with support for:
//! - PAX extended headers (POSIX.1-2001) for long paths and link targets
//! - GNU LongName/LongLink headers on read
//! - device, fifo and contiguous typeflags, preserved through a rewrite
//!
//! Compressed variants are handled by the caller: this module only ever sees
//! the plain TAR stream.

pub mod raw;

use crate::archive::Diagnostic;
use alchemist_core::entry::{Entry, EntryKind, FormatExtras, TarExtras};
use alchemist_core::error::{AlchemistError, Result};
use alchemist_core::mode::MODE_MASK;
use log::debug;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// TAR block size.
pub const BLOCK_SIZE: usize = 512;

/// Two zero blocks terminate an archive.
const END_MARKER: [u8; 2 * BLOCK_SIZE] = [0u8; 2 * BLOCK_SIZE];

/// Regular file.
pub const REGTYPE: u8 = b'0';
/// Regular file (pre-POSIX).
pub const AREGTYPE: u8 = 0;
/// Hard link.
pub const LNKTYPE: u8 = b'1';
/// Symbolic link.
pub const SYMTYPE: u8 = b'2';
/// Character device.
pub const CHRTYPE: u8 = b'3';
/// Block device.
pub const BLKTYPE: u8 = b'4';
/// Directory.
pub const DIRTYPE: u8 = b'5';
/// FIFO.
pub const FIFOTYPE: u8 = b'6';
/// Contiguous file.
pub const CONTTYPE: u8 = b'7';
/// PAX extended header (applies to next file only).
pub const PAX_HEADER: u8 = b'x';
/// PAX global extended header (applies to all subsequent files).
pub const PAX_GLOBAL_HEADER: u8 = b'g';
/// GNU LongName.
pub const GNU_LONGNAME: u8 = b'L';
/// GNU LongLink.
pub const GNU_LONGLINK: u8 = b'K';

const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const CHKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// TAR header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    /// Name field (without prefix).
    pub name: String,
    /// File mode.
    pub mode: u32,
    /// Owner UID.
    pub uid: u32,
    /// Owner GID.
    pub gid: u32,
    /// File size.
    pub size: u64,
    /// Modification time.
    pub mtime: u64,
    /// Type flag.
    pub typeflag: u8,
    /// Link name.
    pub linkname: String,
    /// Magic is POSIX `ustar\0`.
    pub ustar: bool,
    /// Owner name.
    pub uname: String,
    /// Group name.
    pub gname: String,
    /// Device major number.
    pub devmajor: u32,
    /// Device minor number.
    pub devminor: u32,
    /// Prefix for long names.
    pub prefix: String,
}

impl TarHeader {
    /// Create a header for a regular file.
    pub fn for_file(name: &str, size: u64, mode: u32, mtime: u64) -> Self {
        Self {
            name: name.to_string(),
            mode,
            uid: 0,
            gid: 0,
            size,
            mtime,
            typeflag: REGTYPE,
            linkname: String::new(),
            ustar: true,
            uname: String::new(),
            gname: String::new(),
            devmajor: 0,
            devminor: 0,
            prefix: String::new(),
        }
    }

    /// Read a TAR header from a block. `None` for an all-zero block.
    pub fn from_block(block: &[u8]) -> Result<Option<Self>> {
        let block = block
            .get(..BLOCK_SIZE)
            .ok_or_else(|| AlchemistError::unexpected_eof(BLOCK_SIZE - block.len()))?;
        if block.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let ustar = &block[257..263] == b"ustar\0";
        let prefix = if ustar {
            Self::parse_string(&block[345..500])
        } else {
            String::new()
        };

        Ok(Some(Self {
            name: Self::parse_string(&block[0..100]),
            mode: Self::parse_octal(&block[100..108], "mode")? as u32,
            uid: Self::parse_octal(&block[108..116], "uid")? as u32,
            gid: Self::parse_octal(&block[116..124], "gid")? as u32,
            size: Self::parse_octal(&block[124..136], "size")?,
            mtime: Self::parse_octal(&block[136..148], "mtime")?,
            typeflag: block[156],
            linkname: Self::parse_string(&block[157..257]),
            ustar,
            uname: Self::parse_string(&block[265..297]),
            gname: Self::parse_string(&block[297..329]),
            devmajor: Self::parse_octal(&block[329..337], "devmajor")? as u32,
            devminor: Self::parse_octal(&block[337..345], "devminor")? as u32,
            prefix,
        }))
    }

    /// Path with the USTAR prefix joined on.
    pub fn full_name(&self) -> String {
        if self.prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.prefix, self.name)
        }
    }

    /// Parse a null-terminated string.
    pub(crate) fn parse_string(data: &[u8]) -> String {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        String::from_utf8_lossy(&data[..end]).into_owned()
    }

    /// Parse an octal field, or a GNU base-256 field when the high bit is set.
    pub(crate) fn parse_octal(data: &[u8], what: &str) -> Result<u64> {
        if data.first().is_some_and(|b| b & 0x80 != 0) {
            let mut value = (data[0] & 0x7F) as u64;
            for &b in &data[1..] {
                value = value
                    .checked_mul(256)
                    .map(|v| v | b as u64)
                    .ok_or_else(|| AlchemistError::invalid_header(format!("{} overflows", what)))?;
            }
            return Ok(value);
        }

        let s = Self::parse_string(data);
        let s = s.trim_matches(|c: char| c == ' ' || c == '\0');
        if s.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(s, 8)
            .map_err(|_| AlchemistError::invalid_header(format!("Invalid octal in {}: {:?}", what, s)))
    }

    /// Convert header to a 512-byte block with a valid checksum.
    pub fn to_block(&self) -> Result<[u8; BLOCK_SIZE]> {
        let mut block = [0u8; BLOCK_SIZE];

        Self::write_string(&mut block[0..100], &self.name, "name")?;
        Self::write_octal(&mut block[100..108], self.mode as u64, "mode")?;
        Self::write_octal(&mut block[108..116], self.uid as u64, "uid")?;
        Self::write_octal(&mut block[116..124], self.gid as u64, "gid")?;
        Self::write_octal(&mut block[124..136], self.size, "size")?;
        Self::write_octal(&mut block[136..148], self.mtime, "mtime")?;
        block[CHKSUM_RANGE].copy_from_slice(b"        ");
        block[156] = self.typeflag;
        Self::write_string(&mut block[157..257], &self.linkname, "linkname")?;
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");
        Self::write_string(&mut block[265..297], &self.uname, "uname")?;
        Self::write_string(&mut block[297..329], &self.gname, "gname")?;
        Self::write_octal(&mut block[329..337], self.devmajor as u64, "devmajor")?;
        Self::write_octal(&mut block[337..345], self.devminor as u64, "devminor")?;
        Self::write_string(&mut block[345..500], &self.prefix, "prefix")?;

        let checksum = compute_checksum(&block);
        let checksum_str = format!("{:06o}\0 ", checksum);
        block[CHKSUM_RANGE].copy_from_slice(&checksum_str.as_bytes()[..8]);

        Ok(block)
    }

    /// Write a string to a field; the terminating NUL is optional when it fills the field.
    fn write_string(field: &mut [u8], s: &str, what: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > field.len() {
            return Err(AlchemistError::invalid_header(format!(
                "{} is {} bytes, field holds {}",
                what,
                bytes.len(),
                field.len()
            )));
        }
        field[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Write a zero-padded octal number followed by NUL.
    fn write_octal(field: &mut [u8], value: u64, what: &str) -> Result<()> {
        let width = field.len() - 1;
        let s = format!("{:0width$o}", value, width = width);
        if s.len() > width {
            return Err(AlchemistError::invalid_header(format!(
                "{} value {} does not fit a {}-byte octal field",
                what,
                value,
                field.len()
            )));
        }
        field[..width].copy_from_slice(s.as_bytes());
        Ok(())
    }

    /// Apply PAX extended attributes to this header.
    pub fn apply_pax_attrs(&mut self, attrs: &HashMap<String, String>) {
        fn number<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
            // PAX times may carry a fractional part.
            value.and_then(|v| v.split('.').next()).and_then(|v| v.parse().ok())
        }

        if let Some(path) = attrs.get("path") {
            self.name = path.clone();
            self.prefix.clear();
        }
        if let Some(linkpath) = attrs.get("linkpath") {
            self.linkname = linkpath.clone();
        }
        if let Some(size) = number(attrs.get("size")) {
            self.size = size;
        }
        if let Some(mtime) = number(attrs.get("mtime")) {
            self.mtime = mtime;
        }
        if let Some(uid) = number(attrs.get("uid")) {
            self.uid = uid;
        }
        if let Some(gid) = number(attrs.get("gid")) {
            self.gid = gid;
        }
        if let Some(uname) = attrs.get("uname") {
            self.uname = uname.clone();
        }
        if let Some(gname) = attrs.get("gname") {
            self.gname = gname.clone();
        }
    }

    /// Parse PAX extended header data.
    /// Format: "length key=value\n" repeated
    pub fn parse_pax_data(data: &[u8]) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        let mut pos = 0;

        while pos < data.len() {
            let space_pos = match data[pos..].iter().position(|&b| b == b' ') {
                Some(p) => pos + p,
                None => break,
            };

            let len_str = String::from_utf8_lossy(&data[pos..space_pos]);
            let record_len: usize = match len_str.trim().parse() {
                Ok(l) => l,
                Err(_) => break,
            };
            if record_len == 0 || pos + record_len > data.len() || space_pos >= pos + record_len {
                break;
            }

            let record_end = pos + record_len;
            let mut value_end = record_end;
            if data[value_end - 1] == b'\n' {
                value_end -= 1;
            }
            let record = &data[space_pos + 1..value_end];

            if let Some(eq_pos) = record.iter().position(|&b| b == b'=') {
                let key = String::from_utf8_lossy(&record[..eq_pos]).into_owned();
                let value = String::from_utf8_lossy(&record[eq_pos + 1..]).into_owned();
                attrs.insert(key, value);
            }

            pos = record_end;
        }

        attrs
    }

    /// Build the entry this header describes.
    fn into_entry(self, data: &[u8], header_offset: u64) -> Entry {
        let path = self.full_name();
        let (kind, typeflag) = match self.typeflag {
            REGTYPE | AREGTYPE => (EntryKind::File(data.to_vec()), None),
            LNKTYPE => (EntryKind::Hardlink(self.linkname), None),
            SYMTYPE => (EntryKind::Symlink(self.linkname), None),
            DIRTYPE => (EntryKind::Directory, None),
            other => (EntryKind::File(data.to_vec()), Some(other)),
        };

        Entry {
            path,
            kind,
            mode: self.mode & MODE_MASK,
            uid: self.uid,
            gid: self.gid,
            mtime: self.mtime,
            extras: FormatExtras::Tar(TarExtras {
                uname: self.uname,
                gname: self.gname,
                devmajor: self.devmajor,
                devminor: self.devminor,
                typeflag,
                header_offset: Some(header_offset),
            }),
        }
    }
}

/// Header checksum: byte sum with the checksum field read as spaces.
pub fn compute_checksum(block: &[u8]) -> u32 {
    block
        .iter()
        .take(BLOCK_SIZE)
        .enumerate()
        .map(|(i, &b)| if CHKSUM_RANGE.contains(&i) { b' ' as u32 } else { b as u32 })
        .sum()
}

/// Checksum recorded in the header, if it parses.
pub fn stored_checksum(block: &[u8]) -> Option<u32> {
    let field = block.get(CHKSUM_RANGE)?;
    let s = TarHeader::parse_string(field);
    let s = s.trim_matches(|c: char| c == ' ' || c == '\0');
    u32::from_str_radix(s, 8).ok()
}

/// Structural check: a non-zero header block whose checksum verifies.
pub fn looks_like_tar(data: &[u8]) -> bool {
    let Some(block) = data.get(..BLOCK_SIZE) else {
        return false;
    };
    !is_zero_block(block) && stored_checksum(block) == Some(compute_checksum(block))
}

fn is_zero_block(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

fn padded_len(size: usize) -> usize {
    size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

fn take(stream: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    stream
        .get(start..start.saturating_add(len))
        .ok_or_else(|| AlchemistError::unexpected_eof(start.saturating_add(len) - stream.len()))
}

/// Parse a plain TAR stream into entries plus diagnostics.
pub fn parse(stream: &[u8]) -> Result<(Vec<Entry>, Vec<Diagnostic>)> {
    let mut entries = Vec::new();
    let mut diagnostics = Vec::new();
    let mut offset = 0usize;
    let mut pax_attrs: HashMap<String, String> = HashMap::new();
    let mut global_pax_attrs: HashMap<String, String> = HashMap::new();
    let mut gnu_longname: Option<String> = None;
    let mut gnu_longlink: Option<String> = None;
    let mut entry_start: Option<usize> = None;

    while offset < stream.len() {
        let Some(block) = stream.get(offset..offset + BLOCK_SIZE) else {
            if is_zero_block(&stream[offset..]) {
                break;
            }
            return Err(AlchemistError::unexpected_eof(
                offset + BLOCK_SIZE - stream.len(),
            ));
        };

        let mut header = match TarHeader::from_block(block)? {
            Some(header) => header,
            None => {
                match stream.get(offset + BLOCK_SIZE..offset + 2 * BLOCK_SIZE) {
                    Some(next) if !is_zero_block(next) => {
                        diagnostics.push(Diagnostic::at(
                            offset as u64,
                            "isolated zero block inside archive",
                        ));
                        offset += BLOCK_SIZE;
                        continue;
                    }
                    _ => break,
                }
            }
        };

        let computed = compute_checksum(block);
        let stored = stored_checksum(block);
        if stored != Some(computed) {
            diagnostics.push(Diagnostic::at(
                offset as u64,
                format!(
                    "header checksum mismatch for {}: stored {}, computed {:o}",
                    header.full_name(),
                    stored.map_or_else(|| "invalid".to_string(), |s| format!("{:o}", s)),
                    computed
                ),
            ));
        }

        // A global header applies to every later member, so it belongs to none.
        if header.typeflag != PAX_GLOBAL_HEADER {
            entry_start.get_or_insert(offset);
        }
        let data_start = offset + BLOCK_SIZE;

        if matches!(
            header.typeflag,
            PAX_HEADER | PAX_GLOBAL_HEADER | GNU_LONGNAME | GNU_LONGLINK
        ) {
            let size = header.size as usize;
            let data = take(stream, data_start, size)?;
            match header.typeflag {
                PAX_HEADER => pax_attrs = TarHeader::parse_pax_data(data),
                PAX_GLOBAL_HEADER => global_pax_attrs.extend(TarHeader::parse_pax_data(data)),
                GNU_LONGNAME => gnu_longname = Some(long_name(data)),
                _ => gnu_longlink = Some(long_name(data)),
            }
            offset = data_start + padded_len(size);
            continue;
        }

        if !global_pax_attrs.is_empty() {
            header.apply_pax_attrs(&global_pax_attrs);
        }
        if !pax_attrs.is_empty() {
            header.apply_pax_attrs(&pax_attrs);
            pax_attrs.clear();
        }
        if let Some(name) = gnu_longname.take() {
            header.name = name;
            header.prefix.clear();
        }
        if let Some(link) = gnu_longlink.take() {
            header.linkname = link;
        }

        let size = usize::try_from(header.size)
            .map_err(|_| AlchemistError::invalid_header("entry size exceeds address space"))?;
        let data = take(stream, data_start, size)?;
        let start = entry_start.take().unwrap_or(offset);
        entries.push(header.into_entry(data, start as u64));

        offset = data_start + padded_len(size);
    }

    Ok((entries, diagnostics))
}

fn long_name(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim_end_matches('\0').to_string()
}

/// Split a path into a USTAR (prefix, name) pair, if it fits.
fn split_path(path: &str) -> Option<(&str, &str)> {
    if path.len() <= NAME_LEN {
        return Some(("", path));
    }
    path.match_indices('/')
        .map(|(i, _)| i)
        .filter(|&i| i > 0 && i <= PREFIX_LEN && path.len() - i - 1 <= NAME_LEN && i + 1 < path.len())
        .next_back()
        .map(|i| (&path[..i], &path[i + 1..]))
}

/// Longest prefix of `s` that fits in `max` bytes on a char boundary.
fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Format a single PAX record: "len key=value\n"
fn format_pax_record(key: &str, value: &str) -> String {
    // The length counts its own digits.
    let base_len = key.len() + value.len() + 3;
    let mut total_len = base_len + 1;
    loop {
        let expected = base_len + total_len.to_string().len();
        if expected == total_len {
            break;
        }
        total_len = expected;
    }
    format!("{} {}={}\n", total_len, key, value)
}

fn write_padded(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    out.resize(out.len() + padded_len(data.len()) - data.len(), 0);
}

/// Append one entry (with a PAX header when needed) to `out`.
fn write_entry(out: &mut Vec<u8>, entry: &Entry) -> Result<()> {
    let extras = entry.tar_extras();
    let (typeflag, linkname, data): (u8, &str, &[u8]) = match &entry.kind {
        EntryKind::File(data) => (
            extras.and_then(|t| t.typeflag).unwrap_or(REGTYPE),
            "",
            data.as_slice(),
        ),
        EntryKind::Directory => (DIRTYPE, "", &[][..]),
        EntryKind::Symlink(target) => (SYMTYPE, target.as_str(), &[][..]),
        EntryKind::Hardlink(target) => (LNKTYPE, target.as_str(), &[][..]),
    };

    let split = split_path(&entry.path);
    let long_link = linkname.len() > NAME_LEN;
    if split.is_none() || long_link {
        let mut records = String::new();
        if split.is_none() {
            records.push_str(&format_pax_record("path", &entry.path));
        }
        if long_link {
            records.push_str(&format_pax_record("linkpath", linkname));
        }
        let base = entry.path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("");
        let pax_name = format!("PaxHeaders.0/{}", base);
        let mut pax = TarHeader::for_file(
            truncate_str(&pax_name, NAME_LEN),
            records.len() as u64,
            0o644,
            entry.mtime,
        );
        pax.typeflag = PAX_HEADER;
        out.extend_from_slice(&pax.to_block()?);
        write_padded(out, records.as_bytes());
    }

    let (prefix, name) = split.unwrap_or(("", truncate_str(&entry.path, NAME_LEN)));
    let header = TarHeader {
        name: name.to_string(),
        mode: entry.mode & MODE_MASK,
        uid: entry.uid,
        gid: entry.gid,
        size: data.len() as u64,
        mtime: entry.mtime,
        typeflag,
        linkname: truncate_str(linkname, NAME_LEN).to_string(),
        ustar: true,
        uname: extras.map(|t| t.uname.clone()).unwrap_or_default(),
        gname: extras.map(|t| t.gname.clone()).unwrap_or_default(),
        devmajor: extras.map_or(0, |t| t.devmajor),
        devminor: extras.map_or(0, |t| t.devminor),
        prefix: prefix.to_string(),
    };
    out.extend_from_slice(&header.to_block()?);
    write_padded(out, data);
    Ok(())
}

/// Serialize entries as a plain TAR stream, end marker included.
pub fn serialize(entries: &[Entry]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for entry in entries {
        write_entry(&mut out, entry)?;
    }
    out.extend_from_slice(&END_MARKER);
    Ok(out)
}

/// Rewrite a plain TAR file in place from `entries[index]` onward.
///
/// Every byte before that entry's first header block is left untouched; the
/// entry, everything after it, and a fresh end marker are written from there
/// and the file is cut to the new length.
pub fn splice_from(path: &Path, entries: &[Entry], index: usize) -> Result<()> {
    let start = entries
        .get(index)
        .and_then(|e| e.tar_extras())
        .and_then(|t| t.header_offset)
        .ok_or_else(|| AlchemistError::invalid_header("entry has no recorded header offset"))?;

    let mut tail = Vec::new();
    for entry in &entries[index..] {
        write_entry(&mut tail, entry)?;
    }
    tail.extend_from_slice(&END_MARKER);

    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(start))?;
    file.write_all(&tail)?;
    file.set_len(start + tail.len() as u64)?;
    file.flush()?;
    debug!(
        "Rewrote {} bytes of {} starting at offset {}",
        tail.len(),
        path.display(),
        start
    );
    Ok(())
}
