//! Field-by-field dump of TAR header blocks, for forensic listings.
//!
//! Unlike [`super::parse`], this never fails: malformed numeric fields are
//! shown as `INVALID:<hex>` and the walk stops at the first zero block, a
//! truncated block, or a size it cannot trust.

use super::{BLOCK_SIZE, GNU_LONGLINK, GNU_LONGNAME, TarHeader, compute_checksum, stored_checksum};
use crate::time::format_timestamp;
use alchemist_core::mode::{MODE_MASK, format_mode};

/// Raw header fields in on-disk order: (name, offset, length).
const FIELDS: [(&str, usize, usize); 16] = [
    ("name", 0, 100),
    ("mode", 100, 8),
    ("uid", 108, 8),
    ("gid", 116, 8),
    ("size", 124, 12),
    ("mtime", 136, 12),
    ("chksum", 148, 8),
    ("typeflag", 156, 1),
    ("linkname", 157, 100),
    ("magic", 257, 6),
    ("version", 263, 2),
    ("uname", 265, 32),
    ("gname", 297, 32),
    ("devmajor", 329, 8),
    ("devminor", 337, 8),
    ("prefix", 345, 155),
];

const NUMERIC: [&str; 8] = [
    "mode", "uid", "gid", "size", "mtime", "chksum", "devmajor", "devminor",
];

/// One header block, decoded for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    /// Offset of the block in the (decompressed) stream.
    pub offset: u64,
    /// Name to show: the raw name field, or the GNU long name that preceded it.
    pub display_name: String,
    /// Whether this header's name came from a preceding GNU long-name block.
    pub from_long_name: bool,
    /// `(field, rendered value)` pairs in on-disk order.
    pub fields: Vec<(&'static str, String)>,
    /// Whether the stored checksum equals the computed one.
    pub checksum_valid: bool,
}

/// Human description of a typeflag byte.
pub fn type_description(typeflag: u8) -> &'static str {
    match typeflag {
        b'0' | 0 => "regular file",
        b'1' => "hard link",
        b'2' => "symbolic link",
        b'3' => "character device",
        b'4' => "block device",
        b'5' => "directory",
        b'6' => "fifo",
        b'7' => "contiguous file",
        b'S' => "GNU sparse",
        b'L' => "GNU long name",
        b'K' => "GNU long link",
        b'x' => "PAX extended header",
        b'g' => "PAX global header",
        _ => "unknown",
    }
}

fn render_field(name: &str, bytes: &[u8]) -> String {
    if name == "typeflag" {
        let flag = bytes[0];
        let shown = if flag == 0 {
            "\\0".to_string()
        } else {
            (flag as char).to_string()
        };
        return format!("'{}' ({})", shown, type_description(flag));
    }

    if !NUMERIC.contains(&name) {
        let value = TarHeader::parse_string(bytes);
        if name == "magic" {
            let ustar = value.starts_with("ustar");
            return format!(
                "{} (USTAR format: {})",
                value,
                if ustar { "Yes" } else { "No" }
            );
        }
        return value;
    }

    let value = match TarHeader::parse_octal(bytes, name) {
        Ok(v) => v,
        Err(_) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            return format!("INVALID:{}", hex);
        }
    };
    match name {
        "mode" => format!(
            "0o{:o} ({})",
            value,
            format_mode('-', value as u32 & MODE_MASK)
        ),
        "mtime" => format!("{} ({})", value, format_timestamp(value)),
        "chksum" => format!("{:o}", value),
        _ => value.to_string(),
    }
}

/// Decode every header block in a plain TAR stream.
pub fn dump_headers(stream: &[u8]) -> Vec<RawHeader> {
    let mut headers = Vec::new();
    let mut offset = 0usize;
    let mut pending_long_name: Option<String> = None;

    while let Some(block) = stream.get(offset..offset + BLOCK_SIZE) {
        if block.iter().all(|&b| b == 0) {
            break;
        }

        let fields: Vec<(&'static str, String)> = FIELDS
            .iter()
            .map(|&(name, start, len)| (name, render_field(name, &block[start..start + len])))
            .collect();
        let typeflag = block[156];
        let raw_name = TarHeader::parse_string(&block[0..100]);
        let checksum_valid = stored_checksum(block) == Some(compute_checksum(block));

        let (display_name, from_long_name) = match pending_long_name.take() {
            Some(long) if typeflag != GNU_LONGNAME && typeflag != GNU_LONGLINK => (long, true),
            Some(long) => {
                pending_long_name = Some(long);
                (raw_name, false)
            }
            None => (raw_name, false),
        };

        headers.push(RawHeader {
            offset: offset as u64,
            display_name,
            from_long_name,
            fields,
            checksum_valid,
        });

        let Ok(size) = TarHeader::parse_octal(&block[124..136], "size") else {
            break;
        };
        let Ok(size) = usize::try_from(size) else {
            break;
        };
        let data_start = offset + BLOCK_SIZE;
        if typeflag == GNU_LONGNAME {
            if let Some(data) = stream.get(data_start..data_start + size) {
                pending_long_name = Some(super::long_name(data));
            }
        }
        offset = data_start + size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    }

    headers
}
