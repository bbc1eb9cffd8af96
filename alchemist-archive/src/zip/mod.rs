//! ZIP codec.
//!
//! Parsing walks the central directory and keeps each member's local and
//! central headers side by side ([`ZipRecord`]). Member data always comes from
//! the local header's data offset, metadata from the central header.
//! Serialization writes every member stored and recomputes all offsets.

pub mod diag;
pub mod extra;
mod header;

pub use header::{
    CENTRAL_DIR_HEADER_SIG, CentralDirHeader, DATA_DESCRIPTOR_SIG, DOS_DIRECTORY_ATTR,
    END_OF_CENTRAL_DIR_SIG, EndOfCentralDir, FLAG_UTF8, LOCAL_FILE_HEADER_SIG, LocalFileHeader,
    VERSION_MADE_BY_UNIX, VERSION_NEEDED_DEFAULT, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG,
    ZIP64_END_OF_CENTRAL_DIR_SIG, dos_to_unix, unix_to_dos,
};

use crate::archive::Diagnostic;
use crate::compress::{self, ZIP_METHOD_STORED};
use alchemist_core::entry::{Entry, EntryKind, FormatExtras, ZipExtras};
use alchemist_core::error::{AlchemistError, Result};
use alchemist_core::mode::{MODE_MASK, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use log::warn;

/// One member as stored: its central header and the local header it points at.
#[derive(Debug, Clone)]
pub struct ZipRecord {
    /// Central directory header.
    pub central: CentralDirHeader,
    /// Local header at `central.local_header_offset`, or why it could not be read.
    pub local: std::result::Result<LocalFileHeader, String>,
}

/// The structural skeleton of a ZIP file.
#[derive(Debug, Clone)]
pub struct ZipLayout {
    /// End of central directory record.
    pub eocd: EndOfCentralDir,
    /// Members in central directory order.
    pub records: Vec<ZipRecord>,
}

/// Read the EOCD, every central header, and the local header each references.
pub fn read_layout(buf: &[u8]) -> Result<ZipLayout> {
    let eocd = EndOfCentralDir::locate(buf)?;
    if eocd.is_zip64() {
        return Err(AlchemistError::unsupported("ZIP64 archives"));
    }

    let mut records = Vec::with_capacity(eocd.total_entries as usize);
    let mut cursor = eocd.cd_offset as u64;
    for _ in 0..eocd.total_entries {
        let central = CentralDirHeader::parse(buf, cursor)?;
        cursor += central.written_size() as u64;
        let local = LocalFileHeader::parse(buf, central.local_header_offset as u64)
            .map_err(|e| e.to_string());
        records.push(ZipRecord { central, local });
    }

    Ok(ZipLayout { eocd, records })
}

/// Parse a ZIP image into entries plus diagnostics.
///
/// Only a missing or unreadable central directory is fatal. A member whose
/// local header, data or compression method cannot be read is skipped and
/// reported as a diagnostic.
pub fn parse(buf: &[u8]) -> Result<(Vec<Entry>, Vec<Diagnostic>)> {
    let layout = read_layout(buf)?;
    let mut entries = Vec::with_capacity(layout.records.len());
    let mut diagnostics = Vec::new();

    for record in &layout.records {
        let central = &record.central;
        let name = central.filename();
        let local = match &record.local {
            Ok(local) => local,
            Err(reason) => {
                warn!("Skipping {}: unreadable local header: {}", name, reason);
                diagnostics.push(Diagnostic::at(
                    central.local_header_offset as u64,
                    format!("skipping {}: unreadable local header: {}", name, reason),
                ));
                continue;
            }
        };

        let mismatched: Vec<&str> = diag::compare_headers(central, local)
            .into_iter()
            .filter(|c| !c.matches())
            .map(|c| c.field)
            .collect();
        if !mismatched.is_empty() {
            diagnostics.push(Diagnostic::at(
                local.offset,
                format!(
                    "local header for {} disagrees with central directory: {}",
                    name,
                    mismatched.join(", ")
                ),
            ));
        }

        let data = match local
            .data(buf, central.compressed_size)
            .and_then(|raw| compress::decode_zip_payload(central.method, raw))
        {
            Ok(data) => data,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                diagnostics.push(Diagnostic::at(
                    local.data_offset,
                    format!("skipping {}: {}", name, e),
                ));
                continue;
            }
        };
        let crc = crc32fast::hash(&data);
        if crc != central.crc32 {
            diagnostics.push(Diagnostic::at(
                local.offset,
                format!(
                    "CRC mismatch for {}: stored 0x{:08x}, computed 0x{:08x}",
                    name, central.crc32, crc
                ),
            ));
        }

        entries.push(entry_from_record(central, local, name, data));
    }

    Ok((entries, diagnostics))
}

fn entry_from_record(
    central: &CentralDirHeader,
    local: &LocalFileHeader,
    name: String,
    data: Vec<u8>,
) -> Entry {
    let unix_mode = central.unix_mode();
    let file_type = unix_mode & S_IFMT;
    let is_dir = file_type == S_IFDIR || name.ends_with('/');

    let kind = if file_type == S_IFLNK {
        EntryKind::Symlink(String::from_utf8_lossy(&data).into_owned())
    } else if is_dir {
        EntryKind::Directory
    } else {
        EntryKind::File(data)
    };

    let mode = match unix_mode & MODE_MASK {
        0 if is_dir => 0o755,
        0 => 0o644,
        perm => perm,
    };

    let mtime = [&central.extra, &local.extra]
        .into_iter()
        .filter_map(|e| extra::find(e, extra::EXTENDED_TIMESTAMP_TAG))
        .filter_map(|f| extra::decode_timestamps(&f.data))
        .find_map(|ts| ts.mtime)
        .map(u64::from)
        .unwrap_or_else(|| dos_to_unix(central.mdate, central.mtime));

    let owner = [&central.extra, &local.extra]
        .into_iter()
        .filter_map(|e| extra::find(e, extra::UNIX_OWNER_TAG))
        .find_map(|f| extra::decode_owner(&f.data));

    let unicode_path = [&central.extra, &local.extra]
        .into_iter()
        .filter_map(|e| extra::find(e, extra::UNICODE_PATH_TAG))
        .find_map(|f| extra::decode_unicode_path(&f.data))
        .map(|u| u.path);

    let mut entry = Entry {
        path: name,
        kind,
        mode,
        uid: 0,
        gid: 0,
        mtime,
        extras: FormatExtras::Zip(ZipExtras {
            unicode_path,
            extra: extra::passthrough(&central.extra),
            comment: central.comment.clone(),
        }),
    };
    if let Some(owner) = owner {
        entry.uid = owner.uid;
        entry.gid = owner.gid;
    }
    entry
}

fn to_u32(what: &str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        AlchemistError::unsupported(format!(
            "{} of {} bytes needs ZIP64, which is not supported",
            what, value
        ))
    })
}

/// Serialize entries as a stored-only ZIP image.
pub fn serialize(entries: &[Entry]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut centrals = Vec::with_capacity(entries.len());

    for entry in entries {
        let (payload, file_type, dos_attr): (&[u8], u32, u32) = match &entry.kind {
            EntryKind::File(data) => (data.as_slice(), S_IFREG, 0),
            EntryKind::Directory => (&[][..], S_IFDIR, DOS_DIRECTORY_ATTR),
            EntryKind::Symlink(target) => (target.as_bytes(), S_IFLNK, 0),
            EntryKind::Hardlink(target) => {
                warn!(
                    "ZIP format doesn't support hardlinks; storing {} as a regular file containing '{}'",
                    entry.path, target
                );
                (target.as_bytes(), S_IFREG, 0)
            }
        };

        let zip_extras = entry.zip_extras();
        let filename = entry.path.as_bytes().to_vec();
        let extra = extra::build(
            &filename,
            entry.mtime,
            entry.uid,
            entry.gid,
            zip_extras.and_then(|z| z.unicode_path.as_deref()),
            zip_extras.map_or(&[][..], |z| z.extra.as_slice()),
        )?;
        let (mtime, mdate) = unix_to_dos(entry.mtime);
        let flags = if entry.path.is_ascii() { 0 } else { FLAG_UTF8 };
        let size = to_u32(&format!("member {}", entry.path), payload.len())?;
        let crc32 = crc32fast::hash(payload);
        let offset = to_u32("local header offset", out.len())?;

        let local = LocalFileHeader {
            offset: offset as u64,
            version_needed: VERSION_NEEDED_DEFAULT,
            flags,
            method: ZIP_METHOD_STORED,
            mtime,
            mdate,
            crc32,
            compressed_size: size,
            uncompressed_size: size,
            filename: filename.clone(),
            extra: extra.clone(),
            data_offset: 0,
        };
        local.write(&mut out)?;
        out.extend_from_slice(payload);

        centrals.push(CentralDirHeader {
            offset: 0,
            version_made_by: VERSION_MADE_BY_UNIX,
            version_needed: VERSION_NEEDED_DEFAULT,
            flags,
            method: ZIP_METHOD_STORED,
            mtime,
            mdate,
            crc32,
            compressed_size: size,
            uncompressed_size: size,
            filename,
            extra,
            comment: zip_extras.map(|z| z.comment.clone()).unwrap_or_default(),
            disk_start: 0,
            internal_attr: 0,
            external_attr: ((file_type | (entry.mode & MODE_MASK)) << 16) | dos_attr,
            local_header_offset: offset,
        });
    }

    let cd_offset = to_u32("central directory offset", out.len())?;
    for central in &centrals {
        central.write(&mut out)?;
    }
    let cd_size = to_u32("central directory", out.len() - cd_offset as usize)?;
    let count = u16::try_from(centrals.len()).map_err(|_| {
        AlchemistError::unsupported(format!(
            "{} entries needs ZIP64, which is not supported",
            centrals.len()
        ))
    })?;

    EndOfCentralDir {
        offset: 0,
        disk_number: 0,
        cd_disk: 0,
        entries_on_disk: count,
        total_entries: count,
        cd_size,
        cd_offset,
        comment: Vec::new(),
    }
    .write(&mut out)?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_roundtrip_kinds_and_attributes() {
        let entries = vec![
            Entry::directory("dir/").with_mtime(1_700_000_000),
            Entry::file("dir/bin", vec![0, 159, 146, 150, 255])
                .with_mode(0o4755)
                .with_owner(1000, 100)
                .with_mtime(1_700_000_001),
            Entry::symlink("dir/link", "../../etc/passwd").with_mtime(1_700_000_000),
        ];
        let bytes = serialize(&entries).unwrap();
        let (parsed, diagnostics) = parse(&bytes).unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_dir());
        assert_eq!(parsed[0].mode, 0o755);
        assert_eq!(parsed[1].content(), Some(&[0, 159, 146, 150, 255][..]));
        assert_eq!(parsed[1].mode, 0o4755);
        assert_eq!((parsed[1].uid, parsed[1].gid), (1000, 100));
        assert_eq!(parsed[1].mtime, 1_700_000_001);
        assert_eq!(parsed[2].link_target(), Some("../../etc/passwd"));
    }

    #[test]
    fn test_symlink_external_attributes() {
        let bytes = serialize(&[Entry::symlink("l", "t").with_mode(0o755)]).unwrap();
        let layout = read_layout(&bytes).unwrap();
        assert_eq!(layout.records[0].central.external_attr, (0o120755) << 16);
        assert_eq!(layout.records[0].central.version_made_by, 0x031E);
    }

    #[test]
    fn test_hardlink_stored_as_file() {
        let bytes = serialize(&[Entry::hardlink("b", "a")]).unwrap();
        let (parsed, _) = parse(&bytes).unwrap();
        assert_eq!(parsed[0].content(), Some(&b"a"[..]));
    }

    #[test]
    fn test_duplicates_and_offsets() {
        let entries = vec![
            Entry::file("config.txt", b"first".to_vec()),
            Entry::file("config.txt", b"second".to_vec()),
        ];
        let bytes = serialize(&entries).unwrap();
        let layout = read_layout(&bytes).unwrap();
        assert_eq!(layout.records.len(), 2);
        assert_eq!(layout.records[0].central.local_header_offset, 0);
        let second = layout.records[1].central.local_header_offset as usize;
        assert_eq!(&bytes[second..second + 4], b"PK\x03\x04");
        assert_eq!(le_u32(&bytes, layout.eocd.offset as usize + 16), layout.eocd.cd_offset);
    }

    #[test]
    fn test_unicode_path_and_utf8_flag() {
        let entry = Entry::file("caf\u{e9}.txt", b"x".to_vec()).with_extras(FormatExtras::Zip(
            ZipExtras {
                unicode_path: Some("../evil.txt".into()),
                ..ZipExtras::default()
            },
        ));
        let bytes = serialize(&[entry]).unwrap();
        let layout = read_layout(&bytes).unwrap();
        assert_eq!(layout.records[0].central.flags & FLAG_UTF8, FLAG_UTF8);

        let (parsed, _) = parse(&bytes).unwrap();
        assert_eq!(
            parsed[0].zip_extras().and_then(|z| z.unicode_path.as_deref()),
            Some("../evil.txt")
        );
    }

    #[test]
    fn test_crc_mismatch_is_diagnostic() {
        let mut bytes = serialize(&[Entry::file("a", b"abc".to_vec())]).unwrap();
        let layout = read_layout(&bytes).unwrap();
        let data_offset = layout.records[0].local.as_ref().unwrap().data_offset as usize;
        bytes[data_offset] = b'X';

        let (parsed, diagnostics) = parse(&bytes).unwrap();
        assert_eq!(parsed[0].content(), Some(&b"Xbc"[..]));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("CRC mismatch"));
    }

    #[test]
    fn test_header_mismatch_is_diagnostic() {
        let mut bytes = serialize(&[Entry::file("a", b"abc".to_vec())]).unwrap();
        // Local header flags at offset 6.
        bytes[6] = 0x01;
        let (_, diagnostics) = parse(&bytes).unwrap();
        assert!(diagnostics.iter().any(|d| d.message.contains("flags")));
    }

    #[test]
    fn test_deflated_member_from_foreign_writer() {
        use std::io::Write;

        let content = b"deflated content deflated content".to_vec();
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&content).unwrap();
        let deflated = encoder.finish().unwrap();

        let mut bytes = Vec::new();
        let lfh = LocalFileHeader {
            offset: 0,
            version_needed: 20,
            flags: 0,
            method: compress::ZIP_METHOD_DEFLATE,
            mtime: 0,
            mdate: 0x21,
            crc32: crc32fast::hash(&content),
            compressed_size: deflated.len() as u32,
            uncompressed_size: content.len() as u32,
            filename: b"d.txt".to_vec(),
            extra: Vec::new(),
            data_offset: 0,
        };
        lfh.write(&mut bytes).unwrap();
        bytes.extend_from_slice(&deflated);
        let cd_offset = bytes.len() as u32;
        CentralDirHeader {
            offset: 0,
            version_made_by: 20,
            version_needed: 20,
            flags: 0,
            method: lfh.method,
            mtime: 0,
            mdate: 0x21,
            crc32: lfh.crc32,
            compressed_size: lfh.compressed_size,
            uncompressed_size: lfh.uncompressed_size,
            filename: b"d.txt".to_vec(),
            extra: Vec::new(),
            comment: Vec::new(),
            disk_start: 0,
            internal_attr: 0,
            external_attr: 0,
            local_header_offset: 0,
        }
        .write(&mut bytes)
        .unwrap();
        let cd_size = bytes.len() as u32 - cd_offset;
        EndOfCentralDir {
            offset: 0,
            disk_number: 0,
            cd_disk: 0,
            entries_on_disk: 1,
            total_entries: 1,
            cd_size,
            cd_offset,
            comment: Vec::new(),
        }
        .write(&mut bytes)
        .unwrap();

        let (parsed, diagnostics) = parse(&bytes).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(parsed[0].content(), Some(content.as_slice()));
        assert_eq!(parsed[0].mode, 0o644);
    }

    #[test]
    fn test_unreadable_local_header_is_skipped() {
        let mut bytes = serialize(&[
            Entry::file("a", b"first".to_vec()),
            Entry::file("b", b"second".to_vec()),
        ])
        .unwrap();
        bytes[..4].copy_from_slice(&[0, 0, 0, 0]);

        let (parsed, diagnostics) = parse(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].path, "b");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("skipping a"));
        assert_eq!(diagnostics[0].offset, Some(0));
    }

    #[test]
    fn test_unsupported_method_is_skipped() {
        let mut bytes = serialize(&[
            Entry::file("lzma", b"x".to_vec()),
            Entry::file("plain", b"y".to_vec()),
        ])
        .unwrap();
        let cd_offset = read_layout(&bytes).unwrap().eocd.cd_offset as usize;
        // Method 14 (LZMA) in both headers so only the decode fails.
        bytes[8..10].copy_from_slice(&14u16.to_le_bytes());
        bytes[cd_offset + 10..cd_offset + 12].copy_from_slice(&14u16.to_le_bytes());

        let (parsed, diagnostics) = parse(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].path, "plain");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("skipping lzma"));
    }

    #[test]
    fn test_truncated_data_is_skipped() {
        let mut bytes = serialize(&[Entry::file("big", b"abc".to_vec())]).unwrap();
        let cd_offset = read_layout(&bytes).unwrap().eocd.cd_offset as usize;
        let huge = 0x00FF_FFFFu32.to_le_bytes();
        bytes[18..22].copy_from_slice(&huge);
        bytes[cd_offset + 20..cd_offset + 24].copy_from_slice(&huge);

        let (parsed, diagnostics) = parse(&bytes).unwrap();
        assert!(parsed.is_empty());
        assert!(diagnostics.iter().any(|d| d.message.contains("skipping big")));
    }

    #[test]
    fn test_empty_archive() {
        let bytes = serialize(&[]).unwrap();
        assert_eq!(bytes.len(), 22);
        let (parsed, _) = parse(&bytes).unwrap();
        assert!(parsed.is_empty());
    }
}
