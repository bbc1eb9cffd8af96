//! Structural diagnostics for ZIP images.
//!
//! Compares each member's local header against its central header, builds
//! the `(U)/(C)/(L)` display name when the three recorded names disagree, and
//! finds headers outside the referenced structure: local headers no central
//! header points at, and central headers stashed outside the directory (for
//! example inside the EOCD comment).

use super::ZipLayout;
use super::header::{
    CENTRAL_DIR_HEADER_SIG, CentralDirHeader, DATA_DESCRIPTOR_SIG, END_OF_CENTRAL_DIR_SIG,
    LOCAL_FILE_HEADER_SIG, LocalFileHeader, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG,
    ZIP64_END_OF_CENTRAL_DIR_SIG,
};
use std::collections::HashSet;

/// One field compared between the central and local copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldComparison {
    /// Field name.
    pub field: &'static str,
    /// Value in the central directory header.
    pub central: String,
    /// Value in the local file header.
    pub local: String,
}

impl FieldComparison {
    /// Whether both copies agree.
    pub fn matches(&self) -> bool {
        self.central == self.local
    }

    /// `MATCH` or `MISMATCH`.
    pub fn status(&self) -> &'static str {
        if self.matches() { "MATCH" } else { "MISMATCH" }
    }
}

/// Compare the fields both headers carry.
pub fn compare_headers(central: &CentralDirHeader, local: &LocalFileHeader) -> Vec<FieldComparison> {
    fn row(field: &'static str, central: String, local: String) -> FieldComparison {
        FieldComparison {
            field,
            central,
            local,
        }
    }

    vec![
        row(
            "version_needed",
            central.version_needed.to_string(),
            local.version_needed.to_string(),
        ),
        row(
            "flags",
            format!("0x{:04x}", central.flags),
            format!("0x{:04x}", local.flags),
        ),
        row(
            "compression_method",
            central.method.to_string(),
            local.method.to_string(),
        ),
        row(
            "mod_time",
            format!("0x{:04x}", central.mtime),
            format!("0x{:04x}", local.mtime),
        ),
        row(
            "mod_date",
            format!("0x{:04x}", central.mdate),
            format!("0x{:04x}", local.mdate),
        ),
        row(
            "crc32",
            format!("0x{:08x}", central.crc32),
            format!("0x{:08x}", local.crc32),
        ),
        row(
            "compressed_size",
            central.compressed_size.to_string(),
            local.compressed_size.to_string(),
        ),
        row(
            "uncompressed_size",
            central.uncompressed_size.to_string(),
            local.uncompressed_size.to_string(),
        ),
        row("filename", central.filename(), local.filename()),
    ]
}

/// Name to show for a member whose Unicode, central and local names may differ.
///
/// Collapses to one name when every recorded name agrees; otherwise lists each
/// with its source marker: `a (U) b (C) c (L)`.
pub fn display_name(unicode: Option<&str>, central: Option<&str>, local: Option<&str>) -> String {
    let all_agree = match unicode {
        Some(u) => Some(u) == central && Some(u) == local,
        None => central == local,
    };
    if all_agree {
        if let Some(name) = unicode.or(central).or(local) {
            return name.to_string();
        }
    }

    [(unicode, "U"), (central, "C"), (local, "L")]
        .into_iter()
        .filter_map(|(name, marker)| name.map(|n| format!("{} ({})", n, marker)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Kind of `PK` record found by a raw scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// `PK\x03\x04`.
    LocalFileHeader,
    /// `PK\x01\x02`.
    CentralDirHeader,
    /// `PK\x05\x06`.
    EndOfCentralDir,
    /// `PK\x07\x08`.
    DataDescriptor,
    /// `PK\x06\x06`.
    Zip64EndOfCentralDir,
    /// `PK\x06\x07`.
    Zip64Locator,
}

impl SignatureKind {
    fn from_sig(sig: u32) -> Option<Self> {
        match sig {
            LOCAL_FILE_HEADER_SIG => Some(Self::LocalFileHeader),
            CENTRAL_DIR_HEADER_SIG => Some(Self::CentralDirHeader),
            END_OF_CENTRAL_DIR_SIG => Some(Self::EndOfCentralDir),
            DATA_DESCRIPTOR_SIG => Some(Self::DataDescriptor),
            ZIP64_END_OF_CENTRAL_DIR_SIG => Some(Self::Zip64EndOfCentralDir),
            ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG => Some(Self::Zip64Locator),
            _ => None,
        }
    }
}

/// Offsets of every recognised `PK` signature, in file order.
pub fn scan_signatures(buf: &[u8]) -> Vec<(u64, SignatureKind)> {
    buf.windows(4)
        .enumerate()
        .filter(|(_, w)| w[0] == b'P' && w[1] == b'K')
        .filter_map(|(i, w)| {
            let sig = u32::from_le_bytes([w[0], w[1], w[2], w[3]]);
            SignatureKind::from_sig(sig).map(|kind| (i as u64, kind))
        })
        .collect()
}

/// Local headers present in the file but not referenced by any central header.
///
/// Without a layout (no readable central directory) every local header counts.
pub fn orphaned_local_headers(buf: &[u8], layout: Option<&ZipLayout>) -> Vec<LocalFileHeader> {
    let referenced: HashSet<u64> = layout
        .map(|l| &l.records[..])
        .unwrap_or_default()
        .iter()
        .map(|r| r.central.local_header_offset as u64)
        .collect();

    scan_signatures(buf)
        .into_iter()
        .filter(|(offset, kind)| {
            *kind == SignatureKind::LocalFileHeader && !referenced.contains(offset)
        })
        .filter_map(|(offset, _)| LocalFileHeader::parse(buf, offset).ok())
        .collect()
}

/// Central headers found outside the directory the EOCD points at.
pub fn orphaned_central_headers(buf: &[u8], layout: Option<&ZipLayout>) -> Vec<CentralDirHeader> {
    let listed: HashSet<u64> = layout
        .map(|l| &l.records[..])
        .unwrap_or_default()
        .iter()
        .map(|r| r.central.offset)
        .collect();

    scan_signatures(buf)
        .into_iter()
        .filter(|(offset, kind)| {
            *kind == SignatureKind::CentralDirHeader && !listed.contains(offset)
        })
        .filter_map(|(offset, _)| CentralDirHeader::parse(buf, offset).ok())
        .collect()
}

/// A member that a standard reader would not list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenMember {
    /// Unreferenced local header, if one exists.
    pub local: Option<LocalFileHeader>,
    /// Central header outside the directory, if one exists.
    pub central: Option<CentralDirHeader>,
}

impl HiddenMember {
    /// Name from whichever header is present, central first.
    pub fn name(&self) -> String {
        match (&self.central, &self.local) {
            (Some(central), _) => central.filename(),
            (None, Some(local)) => local.filename(),
            (None, None) => String::new(),
        }
    }
}

/// Orphaned local and central headers, paired up.
///
/// A hidden central header pairs with the orphaned local header at its
/// `local_header_offset`, failing that with one of the same file name. Local
/// headers come first in file order, unpaired central headers after them.
pub fn hidden_members(buf: &[u8], layout: Option<&ZipLayout>) -> Vec<HiddenMember> {
    let mut centrals: Vec<Option<CentralDirHeader>> = orphaned_central_headers(buf, layout)
        .into_iter()
        .map(Some)
        .collect();

    let mut members: Vec<HiddenMember> = orphaned_local_headers(buf, layout)
        .into_iter()
        .map(|local| {
            let by_offset = centrals.iter().position(|c| {
                c.as_ref()
                    .is_some_and(|c| c.local_header_offset as u64 == local.offset)
            });
            let slot = by_offset.or_else(|| {
                centrals
                    .iter()
                    .position(|c| c.as_ref().is_some_and(|c| c.filename == local.filename))
            });
            HiddenMember {
                central: slot.and_then(|i| centrals[i].take()),
                local: Some(local),
            }
        })
        .collect();

    members.extend(centrals.into_iter().flatten().map(|central| HiddenMember {
        local: None,
        central: Some(central),
    }));
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{EndOfCentralDir, read_layout, serialize};
    use alchemist_core::entry::Entry;

    #[test]
    fn test_display_name_collapses() {
        assert_eq!(display_name(None, Some("a"), Some("a")), "a");
        assert_eq!(display_name(Some("a"), Some("a"), Some("a")), "a");
        assert_eq!(
            display_name(None, Some("a"), Some("b")),
            "a (C) b (L)"
        );
        assert_eq!(
            display_name(Some("u"), Some("a"), Some("a")),
            "u (U) a (C) a (L)"
        );
        assert_eq!(display_name(None, Some("a"), None), "a (C)");
    }

    #[test]
    fn test_compare_identical_headers() {
        let bytes = serialize(&[Entry::file("x", b"1".to_vec())]).unwrap();
        let layout = read_layout(&bytes).unwrap();
        let record = &layout.records[0];
        let rows = compare_headers(&record.central, record.local.as_ref().unwrap());
        assert_eq!(rows.len(), 9);
        assert!(rows.iter().all(|r| r.status() == "MATCH"));
    }

    #[test]
    fn test_scan_and_orphans() {
        let bytes = serialize(&[
            Entry::file("kept", b"1".to_vec()),
            Entry::file("hidden", b"2".to_vec()),
        ])
        .unwrap();
        let layout = read_layout(&bytes).unwrap();

        let kinds: Vec<SignatureKind> = scan_signatures(&bytes).into_iter().map(|(_, k)| k).collect();
        assert_eq!(
            kinds,
            vec![
                SignatureKind::LocalFileHeader,
                SignatureKind::LocalFileHeader,
                SignatureKind::CentralDirHeader,
                SignatureKind::CentralDirHeader,
                SignatureKind::EndOfCentralDir,
            ]
        );
        assert!(orphaned_local_headers(&bytes, Some(&layout)).is_empty());
        assert!(orphaned_central_headers(&bytes, Some(&layout)).is_empty());

        // Drop the second central record from the directory count.
        let mut truncated = layout.clone();
        truncated.records.truncate(1);
        let orphans = orphaned_local_headers(&bytes, Some(&truncated));
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].filename(), "hidden");

        assert_eq!(orphaned_local_headers(&bytes, None).len(), 2);
    }

    /// Two listed members, two unlisted local headers, and two central
    /// headers hidden in the EOCD comment: one matching `with_cdh.txt`, one
    /// pointing nowhere.
    fn archive_with_hidden_directory() -> Vec<u8> {
        let full = serialize(&[
            Entry::file("normal.txt", b"listed".to_vec()),
            Entry::file("alone.txt", b"no central header".to_vec()),
            Entry::file("with_cdh.txt", b"central header in comment".to_vec()),
            Entry::file("normal2.txt", b"listed too".to_vec()),
        ])
        .unwrap();
        let layout = read_layout(&full).unwrap();
        let cd_offset = layout.eocd.cd_offset;

        let mut bytes = full[..cd_offset as usize].to_vec();
        for i in [0, 3] {
            layout.records[i].central.write(&mut bytes).unwrap();
        }
        let cd_size = bytes.len() as u32 - cd_offset;

        let mut comment = b"Hidden CDHs: ".to_vec();
        layout.records[2].central.write(&mut comment).unwrap();
        let mut nowhere = layout.records[2].central.clone();
        nowhere.filename = b"nonexistent.txt".to_vec();
        nowhere.local_header_offset = 0x9999_9999;
        nowhere.write(&mut comment).unwrap();

        EndOfCentralDir {
            offset: 0,
            disk_number: 0,
            cd_disk: 0,
            entries_on_disk: 2,
            total_entries: 2,
            cd_size,
            cd_offset,
            comment,
        }
        .write(&mut bytes)
        .unwrap();
        bytes
    }

    #[test]
    fn test_central_headers_in_eocd_comment() {
        let bytes = archive_with_hidden_directory();
        let layout = read_layout(&bytes).unwrap();
        assert_eq!(layout.records.len(), 2);

        let hidden = orphaned_central_headers(&bytes, Some(&layout));
        let names: Vec<String> = hidden.iter().map(|c| c.filename()).collect();
        assert_eq!(names, vec!["with_cdh.txt", "nonexistent.txt"]);
        assert!(hidden[0].offset > layout.eocd.offset);
    }

    #[test]
    fn test_hidden_members_pairing() {
        let bytes = archive_with_hidden_directory();
        let layout = read_layout(&bytes).unwrap();
        let members = hidden_members(&bytes, Some(&layout));

        let summary: Vec<(String, bool, bool)> = members
            .iter()
            .map(|m| (m.name(), m.local.is_some(), m.central.is_some()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("alone.txt".to_string(), true, false),
                ("with_cdh.txt".to_string(), true, true),
                ("nonexistent.txt".to_string(), false, true),
            ]
        );
        let paired = &members[1];
        assert_eq!(
            paired.central.as_ref().unwrap().local_header_offset as u64,
            paired.local.as_ref().unwrap().offset
        );
    }

    #[test]
    fn test_hidden_members_pair_by_name() {
        let bytes = archive_with_hidden_directory();
        let layout = read_layout(&bytes).unwrap();
        // Point the hidden central header somewhere else; the name still pairs.
        let hidden = orphaned_central_headers(&bytes, Some(&layout));
        let at = hidden[0].offset as usize + 42;
        let mut bytes = bytes;
        bytes[at..at + 4].copy_from_slice(&7u32.to_le_bytes());

        let members = hidden_members(&bytes, Some(&layout));
        assert_eq!(members[1].name(), "with_cdh.txt");
        assert!(members[1].local.is_some() && members[1].central.is_some());
    }
}
