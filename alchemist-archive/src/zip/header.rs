//! ZIP header structures.
//!
//! Local and central headers are parsed from an in-memory archive image and
//! kept as two independent records; nothing here merges them.

use alchemist_core::error::{AlchemistError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use std::io::Write;

/// ZIP local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// ZIP central directory header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// ZIP end of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// Data descriptor signature (optional, PK\x07\x08).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074B50;

/// ZIP64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// ZIP64 end of central directory locator signature.
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG: u32 = 0x07064B50;

/// Fixed part of a local file header.
pub const LOCAL_HEADER_LEN: usize = 30;
/// Fixed part of a central directory header.
pub const CENTRAL_HEADER_LEN: usize = 46;
/// Fixed part of the end of central directory record.
pub const EOCD_LEN: usize = 22;

/// General purpose flag: filename and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;
/// Version made by: Unix, APPNOTE 3.0.
pub const VERSION_MADE_BY_UNIX: u16 = 0x031E;
/// Version needed to extract stored entries with directories.
pub const VERSION_NEEDED_DEFAULT: u16 = 20;
/// MS-DOS directory attribute in the low byte of `external_attr`.
pub const DOS_DIRECTORY_ATTR: u32 = 0x10;

/// Largest comment the EOCD length field can describe.
const MAX_COMMENT_LEN: usize = 0xFFFF;

/// Borrow `len` bytes at `start`, or fail with an EOF error.
pub(crate) fn field(buf: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    let end = start
        .checked_add(len)
        .ok_or_else(|| AlchemistError::unexpected_eof(len))?;
    buf.get(start..end)
        .ok_or_else(|| AlchemistError::unexpected_eof(end.saturating_sub(buf.len())))
}

pub(crate) fn le_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

pub(crate) fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn to_usize(offset: u64) -> Result<usize> {
    usize::try_from(offset).map_err(|_| AlchemistError::unexpected_eof(usize::MAX))
}

fn len_u16(what: &str, len: usize) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| AlchemistError::unsupported(format!("{} length {} exceeds 65535", what, len)))
}

fn check_signature(found: u32, expected: u32) -> Result<()> {
    if found != expected {
        return Err(AlchemistError::invalid_magic(
            expected.to_le_bytes().to_vec(),
            found.to_le_bytes().to_vec(),
        ));
    }
    Ok(())
}

/// ZIP local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Offset of the signature within the archive.
    pub offset: u64,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time (DOS).
    pub mtime: u16,
    /// Last modification date (DOS).
    pub mdate: u16,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub uncompressed_size: u32,
    /// Raw file name bytes.
    pub filename: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
    /// Offset to file data.
    pub data_offset: u64,
}

impl LocalFileHeader {
    /// Parse the local header starting at `offset`.
    pub fn parse(buf: &[u8], offset: u64) -> Result<Self> {
        let start = to_usize(offset)?;
        let b = field(buf, start, LOCAL_HEADER_LEN)?;
        check_signature(le_u32(b, 0), LOCAL_FILE_HEADER_SIG)?;

        let filename_len = le_u16(b, 26) as usize;
        let extra_len = le_u16(b, 28) as usize;
        let filename = field(buf, start + LOCAL_HEADER_LEN, filename_len)?.to_vec();
        let extra = field(buf, start + LOCAL_HEADER_LEN + filename_len, extra_len)?.to_vec();

        Ok(Self {
            offset,
            version_needed: le_u16(b, 4),
            flags: le_u16(b, 6),
            method: le_u16(b, 8),
            mtime: le_u16(b, 10),
            mdate: le_u16(b, 12),
            crc32: le_u32(b, 14),
            compressed_size: le_u32(b, 18),
            uncompressed_size: le_u32(b, 22),
            filename,
            extra,
            data_offset: offset + (LOCAL_HEADER_LEN + filename_len + extra_len) as u64,
        })
    }

    /// File name decoded lossily as UTF-8.
    pub fn filename(&self) -> String {
        String::from_utf8_lossy(&self.filename).into_owned()
    }

    /// Borrow `len` bytes of member data following this header.
    pub fn data<'a>(&self, buf: &'a [u8], len: u32) -> Result<&'a [u8]> {
        field(buf, to_usize(self.data_offset)?, len as usize)
    }

    /// Write the local file header.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let filename_len = len_u16("filename", self.filename.len())?;
        let extra_len = len_u16("extra field", self.extra.len())?;

        writer.write_all(&LOCAL_FILE_HEADER_SIG.to_le_bytes())?;
        writer.write_all(&self.version_needed.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.method.to_le_bytes())?;
        writer.write_all(&self.mtime.to_le_bytes())?;
        writer.write_all(&self.mdate.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&filename_len.to_le_bytes())?;
        writer.write_all(&extra_len.to_le_bytes())?;
        writer.write_all(&self.filename)?;
        writer.write_all(&self.extra)?;
        Ok(())
    }
}

/// ZIP central directory header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirHeader {
    /// Offset of the signature within the archive.
    pub offset: u64,
    /// Version made by (high byte: host system).
    pub version_made_by: u16,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time (DOS).
    pub mtime: u16,
    /// Last modification date (DOS).
    pub mdate: u16,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub uncompressed_size: u32,
    /// Raw file name bytes.
    pub filename: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
    /// File comment.
    pub comment: Vec<u8>,
    /// Disk number start.
    pub disk_start: u16,
    /// Internal file attributes.
    pub internal_attr: u16,
    /// External file attributes; Unix `st_mode` lives in the high 16 bits.
    pub external_attr: u32,
    /// Offset of the matching local header.
    pub local_header_offset: u32,
}

impl CentralDirHeader {
    /// Parse the central header starting at `offset`.
    pub fn parse(buf: &[u8], offset: u64) -> Result<Self> {
        let start = to_usize(offset)?;
        let b = field(buf, start, CENTRAL_HEADER_LEN)?;
        check_signature(le_u32(b, 0), CENTRAL_DIR_HEADER_SIG)?;

        let filename_len = le_u16(b, 28) as usize;
        let extra_len = le_u16(b, 30) as usize;
        let comment_len = le_u16(b, 32) as usize;
        let mut cursor = start + CENTRAL_HEADER_LEN;
        let filename = field(buf, cursor, filename_len)?.to_vec();
        cursor += filename_len;
        let extra = field(buf, cursor, extra_len)?.to_vec();
        cursor += extra_len;
        let comment = field(buf, cursor, comment_len)?.to_vec();

        Ok(Self {
            offset,
            version_made_by: le_u16(b, 4),
            version_needed: le_u16(b, 6),
            flags: le_u16(b, 8),
            method: le_u16(b, 10),
            mtime: le_u16(b, 12),
            mdate: le_u16(b, 14),
            crc32: le_u32(b, 16),
            compressed_size: le_u32(b, 20),
            uncompressed_size: le_u32(b, 24),
            filename,
            extra,
            comment,
            disk_start: le_u16(b, 34),
            internal_attr: le_u16(b, 36),
            external_attr: le_u32(b, 38),
            local_header_offset: le_u32(b, 42),
        })
    }

    /// File name decoded lossily as UTF-8.
    pub fn filename(&self) -> String {
        String::from_utf8_lossy(&self.filename).into_owned()
    }

    /// Unix `st_mode` from the high half of the external attributes.
    pub fn unix_mode(&self) -> u32 {
        self.external_attr >> 16
    }

    /// Get the size of this header when written.
    pub fn written_size(&self) -> usize {
        CENTRAL_HEADER_LEN + self.filename.len() + self.extra.len() + self.comment.len()
    }

    /// Write the central directory header.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let filename_len = len_u16("filename", self.filename.len())?;
        let extra_len = len_u16("extra field", self.extra.len())?;
        let comment_len = len_u16("comment", self.comment.len())?;

        writer.write_all(&CENTRAL_DIR_HEADER_SIG.to_le_bytes())?;
        writer.write_all(&self.version_made_by.to_le_bytes())?;
        writer.write_all(&self.version_needed.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.method.to_le_bytes())?;
        writer.write_all(&self.mtime.to_le_bytes())?;
        writer.write_all(&self.mdate.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&filename_len.to_le_bytes())?;
        writer.write_all(&extra_len.to_le_bytes())?;
        writer.write_all(&comment_len.to_le_bytes())?;
        writer.write_all(&self.disk_start.to_le_bytes())?;
        writer.write_all(&self.internal_attr.to_le_bytes())?;
        writer.write_all(&self.external_attr.to_le_bytes())?;
        writer.write_all(&self.local_header_offset.to_le_bytes())?;
        writer.write_all(&self.filename)?;
        writer.write_all(&self.extra)?;
        writer.write_all(&self.comment)?;
        Ok(())
    }
}

/// ZIP end of central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDir {
    /// Offset of the signature within the archive.
    pub offset: u64,
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk where the central directory starts.
    pub cd_disk: u16,
    /// Central directory records on this disk.
    pub entries_on_disk: u16,
    /// Total central directory records.
    pub total_entries: u16,
    /// Size of the central directory in bytes.
    pub cd_size: u32,
    /// Offset of the first central directory header.
    pub cd_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDir {
    /// Find the EOCD by scanning backward over the trailing 64 KiB + 22 bytes.
    pub fn locate(buf: &[u8]) -> Result<Self> {
        let search_start = buf.len().saturating_sub(MAX_COMMENT_LEN + EOCD_LEN);
        let sig = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        let found = buf[search_start..]
            .windows(4)
            .rposition(|w| w == sig)
            .ok_or_else(|| AlchemistError::invalid_header("End of central directory not found"))?;
        Self::parse(buf, (search_start + found) as u64)
    }

    /// Parse the EOCD record starting at `offset`.
    pub fn parse(buf: &[u8], offset: u64) -> Result<Self> {
        let start = to_usize(offset)?;
        let b = field(buf, start, EOCD_LEN)?;
        check_signature(le_u32(b, 0), END_OF_CENTRAL_DIR_SIG)?;

        let comment_len = le_u16(b, 20) as usize;
        // Tolerate a truncated comment; the directory fields are what matter.
        let comment_end = (start + EOCD_LEN + comment_len).min(buf.len());
        let comment = buf[start + EOCD_LEN..comment_end].to_vec();

        Ok(Self {
            offset,
            disk_number: le_u16(b, 4),
            cd_disk: le_u16(b, 6),
            entries_on_disk: le_u16(b, 8),
            total_entries: le_u16(b, 10),
            cd_size: le_u32(b, 12),
            cd_offset: le_u32(b, 16),
            comment,
        })
    }

    /// True when any field holds a ZIP64 marker value.
    pub fn is_zip64(&self) -> bool {
        self.total_entries == 0xFFFF || self.cd_size == 0xFFFF_FFFF || self.cd_offset == 0xFFFF_FFFF
    }

    /// Write the EOCD record.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let comment_len = len_u16("archive comment", self.comment.len())?;

        writer.write_all(&END_OF_CENTRAL_DIR_SIG.to_le_bytes())?;
        writer.write_all(&self.disk_number.to_le_bytes())?;
        writer.write_all(&self.cd_disk.to_le_bytes())?;
        writer.write_all(&self.entries_on_disk.to_le_bytes())?;
        writer.write_all(&self.total_entries.to_le_bytes())?;
        writer.write_all(&self.cd_size.to_le_bytes())?;
        writer.write_all(&self.cd_offset.to_le_bytes())?;
        writer.write_all(&comment_len.to_le_bytes())?;
        writer.write_all(&self.comment)?;
        Ok(())
    }
}

/// Convert a DOS date/time pair to Unix seconds (UTC). Invalid dates map to 0.
pub fn dos_to_unix(mdate: u16, mtime: u16) -> u64 {
    let year = ((mdate >> 9) & 0x7F) as i32 + 1980;
    let month = ((mdate >> 5) & 0x0F) as u32;
    let day = (mdate & 0x1F) as u32;
    let hour = ((mtime >> 11) & 0x1F) as u32;
    let minute = ((mtime >> 5) & 0x3F) as u32;
    let second = ((mtime & 0x1F) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .map(|dt| dt.and_utc().timestamp().max(0) as u64)
        .unwrap_or(0)
}

/// Convert Unix seconds to a DOS (time, date) pair, clamped to 1980..=2107.
pub fn unix_to_dos(secs: u64) -> (u16, u16) {
    const DOS_EPOCH: (u16, u16) = (0, (1 << 5) | 1);

    let Some(dt) = i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
    else {
        return DOS_EPOCH;
    };
    if dt.year() < 1980 {
        return DOS_EPOCH;
    }
    if dt.year() > 2107 {
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }

    let time = ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 / 2);
    let date = (((dt.year() - 1980) as u16) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
    (time, date)
}
