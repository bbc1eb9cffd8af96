//! Extract command.

use super::CmdResult;
use alchemist_archive::{Archive, ArchiveFormat, ExtractOptions};
use log::warn;
use std::path::Path;

pub fn cmd_extract(
    file: &Path,
    format: Option<ArchiveFormat>,
    options: &ExtractOptions,
) -> CmdResult {
    let archive = Archive::open(file, format)?;
    for diagnostic in &archive.diagnostics {
        warn!("{}", diagnostic);
    }

    let summary = archive.extract(options)?;
    println!(
        "Extraction complete: {} entries extracted to {}",
        summary.total(),
        options.output_dir.display()
    );
    if summary.skipped > 0 {
        println!("Skipped {} entries with empty sanitized paths", summary.skipped);
    }
    Ok(())
}
