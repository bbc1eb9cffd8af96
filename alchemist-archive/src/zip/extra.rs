//! Extra-field sub-records.
//!
//! The codec regenerates the Unix owner (0x7875), extended timestamp (0x5455)
//! and Unicode path (0x7075) records on every save. Other records pass through
//! byte for byte.

use alchemist_core::error::{AlchemistError, Result};

/// Info-ZIP "new Unix" owner record.
pub const UNIX_OWNER_TAG: u16 = 0x7875;
/// Extended timestamp record.
pub const EXTENDED_TIMESTAMP_TAG: u16 = 0x5455;
/// Info-ZIP Unicode path record.
pub const UNICODE_PATH_TAG: u16 = 0x7075;

/// One `(tag, data)` sub-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    /// Header ID.
    pub tag: u16,
    /// Record payload.
    pub data: Vec<u8>,
}

/// Decoded uid/gid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixOwner {
    /// User ID.
    pub uid: u32,
    /// Group ID.
    pub gid: u32,
}

/// Decoded extended timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    /// Presence flags (bit 0 mtime, bit 1 atime, bit 2 ctime).
    pub flags: u8,
    /// Modification time.
    pub mtime: Option<u32>,
    /// Access time.
    pub atime: Option<u32>,
    /// Creation time.
    pub ctime: Option<u32>,
}

/// Decoded Unicode path record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodePath {
    /// Record version (1).
    pub version: u8,
    /// CRC-32 of the primary filename the record claims to shadow.
    pub name_crc: u32,
    /// The alternate path.
    pub path: String,
}

/// Split an extra field into records. A truncated trailing record is dropped.
pub fn split(extra: &[u8]) -> Vec<ExtraField> {
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let tag = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
        let len = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        let Some(data) = extra.get(pos + 4..pos + 4 + len) else {
            break;
        };
        fields.push(ExtraField {
            tag,
            data: data.to_vec(),
        });
        pos += 4 + len;
    }
    fields
}

/// Find the first record with `tag`.
pub fn find(extra: &[u8], tag: u16) -> Option<ExtraField> {
    split(extra).into_iter().find(|f| f.tag == tag)
}

fn read_sized(data: &[u8], pos: usize) -> Option<(u32, usize)> {
    let size = *data.get(pos)? as usize;
    let bytes = data.get(pos + 1..pos + 1 + size)?;
    let mut value = 0u64;
    for (i, b) in bytes.iter().take(8).enumerate() {
        value |= (*b as u64) << (8 * i);
    }
    Some((value as u32, pos + 1 + size))
}

/// Decode a 0x7875 payload.
pub fn decode_owner(data: &[u8]) -> Option<UnixOwner> {
    let (uid, next) = read_sized(data, 1)?;
    let (gid, _) = read_sized(data, next)?;
    Some(UnixOwner { uid, gid })
}

/// Encode a 0x7875 payload with 4-byte ids.
pub fn encode_owner(uid: u32, gid: u32) -> Vec<u8> {
    let mut data = vec![1, 4];
    data.extend_from_slice(&uid.to_le_bytes());
    data.push(4);
    data.extend_from_slice(&gid.to_le_bytes());
    data
}

/// Decode a 0x5455 payload.
///
/// Central directory copies usually carry only the mtime even when the flags
/// announce more, so missing trailing values are simply absent.
pub fn decode_timestamps(data: &[u8]) -> Option<Timestamps> {
    let flags = *data.first()?;
    let mut ts = Timestamps {
        flags,
        ..Timestamps::default()
    };
    let mut pos = 1;
    let mut next = |present: bool| -> Option<u32> {
        if !present {
            return None;
        }
        let b = data.get(pos..pos + 4)?;
        pos += 4;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };
    ts.mtime = next(flags & 0x01 != 0);
    ts.atime = next(flags & 0x02 != 0);
    ts.ctime = next(flags & 0x04 != 0);
    Some(ts)
}

/// Encode a 0x5455 payload holding only the mtime.
pub fn encode_mtime(mtime: u32) -> Vec<u8> {
    let mut data = vec![0x01];
    data.extend_from_slice(&mtime.to_le_bytes());
    data
}

/// Decode a 0x7075 payload.
pub fn decode_unicode_path(data: &[u8]) -> Option<UnicodePath> {
    if data.len() < 5 {
        return None;
    }
    Some(UnicodePath {
        version: data[0],
        name_crc: u32::from_le_bytes([data[1], data[2], data[3], data[4]]),
        path: String::from_utf8_lossy(&data[5..]).into_owned(),
    })
}

/// Encode a 0x7075 payload shadowing `primary_name`.
pub fn encode_unicode_path(primary_name: &[u8], path: &str) -> Vec<u8> {
    let mut data = vec![1];
    data.extend_from_slice(&crc32fast::hash(primary_name).to_le_bytes());
    data.extend_from_slice(path.as_bytes());
    data
}

/// Concatenate records back into an extra field.
pub fn join(fields: &[ExtraField]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for f in fields {
        let len = u16::try_from(f.data.len()).map_err(|_| {
            AlchemistError::unsupported(format!("extra field 0x{:04x} exceeds 65535 bytes", f.tag))
        })?;
        out.extend_from_slice(&f.tag.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&f.data);
    }
    Ok(out)
}

/// Records whose tags the codec does not regenerate, re-encoded.
pub fn passthrough(extra: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for f in split(extra) {
        if matches!(
            f.tag,
            UNIX_OWNER_TAG | EXTENDED_TIMESTAMP_TAG | UNICODE_PATH_TAG
        ) {
            continue;
        }
        out.extend_from_slice(&f.tag.to_le_bytes());
        out.extend_from_slice(&(f.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&f.data);
    }
    out
}

/// Build the extra field written for one member.
pub fn build(
    primary_name: &[u8],
    mtime: u64,
    uid: u32,
    gid: u32,
    unicode_path: Option<&str>,
    passthrough: &[u8],
) -> Result<Vec<u8>> {
    let mtime = u32::try_from(mtime).map_err(|_| {
        AlchemistError::unsupported(format!("mtime {} does not fit the ZIP timestamp field", mtime))
    })?;

    let mut fields = vec![
        ExtraField {
            tag: EXTENDED_TIMESTAMP_TAG,
            data: encode_mtime(mtime),
        },
        ExtraField {
            tag: UNIX_OWNER_TAG,
            data: encode_owner(uid, gid),
        },
    ];
    if let Some(path) = unicode_path {
        fields.push(ExtraField {
            tag: UNICODE_PATH_TAG,
            data: encode_unicode_path(primary_name, path),
        });
    }

    let mut out = join(&fields)?;
    out.extend_from_slice(passthrough);
    Ok(out)
}

/// One-line description of a record for raw listings.
pub fn describe(field: &ExtraField) -> String {
    match field.tag {
        UNIX_OWNER_TAG => match decode_owner(&field.data) {
            Some(o) => format!("0x7875 Unix owner: uid={} gid={}", o.uid, o.gid),
            None => "0x7875 Unix owner: <malformed>".to_string(),
        },
        EXTENDED_TIMESTAMP_TAG => match decode_timestamps(&field.data) {
            Some(ts) => {
                let mut parts = vec![format!("flags=0x{:02x}", ts.flags)];
                for (name, value) in [("mtime", ts.mtime), ("atime", ts.atime), ("ctime", ts.ctime)] {
                    if let Some(v) = value {
                        parts.push(format!("{}={}", name, v));
                    }
                }
                format!("0x5455 Extended timestamp: {}", parts.join(" "))
            }
            None => "0x5455 Extended timestamp: <malformed>".to_string(),
        },
        UNICODE_PATH_TAG => match decode_unicode_path(&field.data) {
            Some(u) => format!(
                "0x7075 Unicode path: version={} crc=0x{:08x} path={}",
                u.version, u.name_crc, u.path
            ),
            None => "0x7075 Unicode path: <malformed>".to_string(),
        },
        tag => format!("0x{:04x} ({} bytes)", tag, field.data.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_decode() {
        let passthrough = vec![0xCA, 0xFE, 0x02, 0x00, 0x01, 0x02];
        let extra = build(b"name.txt", 1_700_000_000, 1000, 100, Some("other.txt"), &passthrough)
            .unwrap();

        let fields = split(&extra);
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].tag, EXTENDED_TIMESTAMP_TAG);
        assert_eq!(fields[3].tag, 0xFECA);

        let ts = decode_timestamps(&fields[0].data).unwrap();
        assert_eq!(ts.mtime, Some(1_700_000_000));
        assert_eq!(ts.atime, None);

        let owner = decode_owner(&fields[1].data).unwrap();
        assert_eq!(owner, UnixOwner { uid: 1000, gid: 100 });

        let unicode = decode_unicode_path(&fields[2].data).unwrap();
        assert_eq!(unicode.path, "other.txt");
        assert_eq!(unicode.name_crc, crc32fast::hash(b"name.txt"));

        assert_eq!(super::passthrough(&extra), passthrough);
    }

    #[test]
    fn test_owner_with_short_ids() {
        // Info-ZIP writes the smallest width that fits; here 2-byte ids.
        let data = [1, 2, 0xE8, 0x03, 2, 0x64, 0x00];
        assert_eq!(
            decode_owner(&data),
            Some(UnixOwner { uid: 1000, gid: 100 })
        );
        assert_eq!(decode_owner(&[1, 4, 0]), None);
    }

    #[test]
    fn test_split_drops_truncated_tail() {
        let extra = [0x55, 0x54, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x75, 0x78, 0x09];
        let fields = split(&extra);
        assert_eq!(fields.len(), 1);
        assert!(find(&extra, UNIX_OWNER_TAG).is_none());
    }

    #[test]
    fn test_mtime_overflow_rejected() {
        assert!(build(b"a", u64::from(u32::MAX) + 1, 0, 0, None, &[]).is_err());
    }

    #[test]
    fn test_describe() {
        let field = ExtraField {
            tag: UNIX_OWNER_TAG,
            data: encode_owner(0, 0),
        };
        assert_eq!(describe(&field), "0x7875 Unix owner: uid=0 gid=0");
    }
}
