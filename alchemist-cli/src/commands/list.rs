//! List command implementation.

use super::CmdResult;
use alchemist_archive::archive::decode_stream;
use alchemist_archive::tar::raw;
use alchemist_archive::time::format_timestamp;
use alchemist_archive::zip::{self, ZipLayout, diag, extra};
use alchemist_archive::{Archive, ArchiveFormat};
use alchemist_core::entry::{Entry, EntryKind};
use alchemist_core::error::AlchemistError;
use alchemist_core::mode::{format_mode, format_octal};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// JSON serializable entry data for archive listings.
#[derive(Debug, Serialize)]
struct EntryJson {
    path: String,
    kind: String,
    size: u64,
    mode: String,
    permissions: String,
    uid: u32,
    gid: u32,
    mtime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
}

impl EntryJson {
    fn from_entry(entry: &Entry) -> Self {
        Self {
            path: entry.path.clone(),
            kind: entry.kind.name().to_string(),
            size: entry.size(),
            mode: format_octal(entry.mode),
            permissions: format_mode(entry.type_char(), entry.mode),
            uid: entry.uid,
            gid: entry.gid,
            mtime: entry.mtime,
            target: entry.link_target().map(str::to_string),
        }
    }
}

/// JSON output for archive listing.
#[derive(Debug, Serialize)]
struct ArchiveListJson {
    archive: String,
    format: String,
    entries: Vec<EntryJson>,
    diagnostics: Vec<String>,
}

pub fn cmd_list(file: &Path, format: Option<ArchiveFormat>, level: u8, json: bool) -> CmdResult {
    if level >= 2 && !json {
        return list_raw(file, format);
    }

    let archive = Archive::open(file, format)?;

    if json {
        let listing = ArchiveListJson {
            archive: file.display().to_string(),
            format: archive.format.to_string(),
            entries: archive.entries.iter().map(EntryJson::from_entry).collect(),
            diagnostics: archive.diagnostics.iter().map(|d| d.to_string()).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    print_entries(file, &archive, level);
    Ok(())
}

fn print_entries(file: &Path, archive: &Archive, level: u8) {
    if archive.entries.is_empty() {
        println!("Archive {} is empty", file.display());
    } else if level == 0 {
        print_names(&archive.entries);
    } else {
        print_long(&archive.entries);
    }

    for diagnostic in &archive.diagnostics {
        println!("Warning: {}", diagnostic);
    }
}

/// Raw header dump followed by the long listing.
///
/// The dump works from the bytes alone, so it is printed even when the entry
/// parse fails or finds nothing.
fn list_raw(file: &Path, format: Option<ArchiveFormat>) -> CmdResult {
    if !file.exists() {
        return Err(AlchemistError::archive_missing(file.display().to_string()).into());
    }
    let format = ArchiveFormat::resolve(file, format)?;
    let bytes = fs::read(file)?;

    match format {
        ArchiveFormat::Zip => print_zip_headers(&bytes),
        format => print_tar_headers(&decode_stream(format, &bytes)?),
    }
    println!();

    match Archive::parse(format, &bytes) {
        Ok(archive) => print_entries(file, &archive, 2),
        Err(e) => println!("Warning: entries could not be parsed: {}", e),
    }
    Ok(())
}

fn print_names(entries: &[Entry]) {
    for entry in entries {
        if entry.is_dir() && !entry.path.ends_with('/') {
            println!("{}/", entry.path);
        } else {
            println!("{}", entry.path);
        }
    }
}

fn owner(entry: &Entry) -> String {
    match entry.tar_extras() {
        Some(tar) if !tar.uname.is_empty() && !tar.gname.is_empty() => {
            format!("{}/{}", tar.uname, tar.gname)
        }
        _ => format!("{}/{}", entry.uid, entry.gid),
    }
}

fn annotated_name(entry: &Entry) -> String {
    match &entry.kind {
        EntryKind::Symlink(target) => format!("{} -> {}", entry.path, target),
        EntryKind::Hardlink(target) => format!("{} link to {}", entry.path, target),
        _ => entry.path.clone(),
    }
}

fn print_long(entries: &[Entry]) {
    println!(
        "{:<11} {:<4} {:<15} {:>10} {:>19} Name",
        "Permissions", "Mode", "Owner/Group", "Size", "Modified"
    );
    println!(
        "{} {} {} {} {} {}",
        "-".repeat(11),
        "-".repeat(4),
        "-".repeat(15),
        "-".repeat(10),
        "-".repeat(19),
        "-".repeat(30)
    );
    for entry in entries {
        println!(
            "{:<11} {:<4} {:<15} {:>10} {:>19} {}",
            format_mode(entry.type_char(), entry.mode),
            format_octal(entry.mode),
            owner(entry),
            entry.size(),
            format_timestamp(entry.mtime),
            annotated_name(entry)
        );
    }
}

fn print_zip_headers(bytes: &[u8]) {
    let layout = match zip::read_layout(bytes) {
        Ok(layout) => Some(layout),
        Err(e) => {
            println!("Central directory unreadable: {}", e);
            println!();
            None
        }
    };

    if let Some(layout) = &layout {
        print_zip_layout(layout);
    }

    let hidden = diag::hidden_members(bytes, layout.as_ref());
    if !hidden.is_empty() {
        println!();
        println!("Hidden members (not listed by the central directory):");
        for member in hidden {
            println!("    {}", member.name());
            match &member.local {
                Some(local) => println!(
                    "      local header at offset {} ({} bytes)",
                    local.offset, local.compressed_size
                ),
                None => println!("      no local header"),
            }
            match &member.central {
                Some(central) => println!(
                    "      central header at offset {} (points at {})",
                    central.offset, central.local_header_offset
                ),
                None => println!("      no central header"),
            }
        }
    }
}

fn print_zip_layout(layout: &ZipLayout) {
    for (i, record) in layout.records.iter().enumerate() {
        let central = &record.central;
        let local = record.local.as_ref().ok();
        let unicode = extra::find(&central.extra, extra::UNICODE_PATH_TAG)
            .and_then(|f| extra::decode_unicode_path(&f.data))
            .map(|u| u.path);
        let central_name = central.filename();
        let local_name = local.map(|l| l.filename());

        println!("Entry #{} (central header at offset {})", i + 1, central.offset);
        println!(
            "  Name: {}",
            diag::display_name(
                unicode.as_deref(),
                Some(central_name.as_str()),
                local_name.as_deref()
            )
        );

        let fields = extra::split(&central.extra);
        if !fields.is_empty() {
            println!("  Extra fields:");
            for field in &fields {
                println!("    {}", extra::describe(field));
            }
        }

        match &record.local {
            Ok(local) => {
                println!("  Local header at offset {}", local.offset);
                println!("    {:<20} {:>12} {:>12}  Status", "Field", "Central", "Local");
                for row in diag::compare_headers(central, local) {
                    println!(
                        "    {:<20} {:>12} {:>12}  {}",
                        row.field,
                        row.central,
                        row.local,
                        row.status()
                    );
                }
            }
            Err(reason) => println!(
                "  Local header at offset {} unreadable: {}",
                central.local_header_offset, reason
            ),
        }
        println!();
    }

    let eocd = &layout.eocd;
    println!("End of central directory at offset {}", eocd.offset);
    println!("    {:<20}: {}", "entries on disk", eocd.entries_on_disk);
    println!("    {:<20}: {}", "total entries", eocd.total_entries);
    println!("    {:<20}: {}", "directory size", eocd.cd_size);
    println!("    {:<20}: {}", "directory offset", eocd.cd_offset);
    println!("    {:<20}: {} bytes", "comment", eocd.comment.len());
}

fn print_tar_headers(stream: &[u8]) {
    for header in raw::dump_headers(stream) {
        println!("File: {}", header.display_name);
        if header.from_long_name {
            println!("  (Actual file entry for previous GNU long name)");
        }
        println!("  Header at offset {}", header.offset);
        println!("{}", "-".repeat(70));
        for (field, value) in &header.fields {
            println!("    {:<15}: {}", field, value);
        }
        let status = if header.checksum_valid { "VALID" } else { "INVALID" };
        println!("    {:<15}: {}", "checksum status", status);
        println!("{}", "-".repeat(70));
    }
}
