//! Prefix injection: put arbitrary bytes in front of an archive while keeping
//! it readable by offset-driven parsers.

use crate::detect::ArchiveFormat;
use crate::tar::BLOCK_SIZE;
use crate::zip;
use alchemist_core::error::{AlchemistError, Result};
use log::debug;

/// Offset of the local-header offset field within a central directory header.
const CDH_LOCAL_OFFSET_FIELD: u64 = 42;
/// Offset of the central-directory offset field within the EOCD record.
const EOCD_CD_OFFSET_FIELD: u64 = 16;

/// Return `prefix` followed by `archive`, with format-specific fixups.
pub fn prepend(archive: &[u8], format: ArchiveFormat, prefix: &[u8]) -> Result<Vec<u8>> {
    match format {
        ArchiveFormat::Zip => prepend_zip(archive, prefix),
        ArchiveFormat::Tar => Ok(prepend_tar(archive, prefix)),
        other => Err(AlchemistError::unsupported(format!(
            "polyglot on {} archives, the prefix would corrupt the compressed stream",
            other
        ))),
    }
}

fn shifted(value: u32, by: u32, what: &str) -> Result<u32> {
    value
        .checked_add(by)
        .ok_or_else(|| AlchemistError::unsupported(format!("{} overflows 32 bits", what)))
}

fn patch_u32(buf: &mut [u8], at: u64, value: u32) -> Result<()> {
    let start = usize::try_from(at)
        .map_err(|_| AlchemistError::invalid_header("offset out of range"))?;
    let slot = buf
        .get_mut(start..start + 4)
        .ok_or_else(|| AlchemistError::unexpected_eof(4))?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

fn prepend_zip(archive: &[u8], prefix: &[u8]) -> Result<Vec<u8>> {
    let layout = zip::read_layout(archive)?;
    let shift = u32::try_from(prefix.len())
        .map_err(|_| AlchemistError::unsupported("prefix larger than 4 GiB"))?;

    let mut out = Vec::with_capacity(prefix.len() + archive.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(archive);
    let base = prefix.len() as u64;

    for record in &layout.records {
        let value = shifted(
            record.central.local_header_offset,
            shift,
            "local header offset",
        )?;
        patch_u32(&mut out, base + record.central.offset + CDH_LOCAL_OFFSET_FIELD, value)?;
    }
    let cd_offset = shifted(layout.eocd.cd_offset, shift, "central directory offset")?;
    patch_u32(&mut out, base + layout.eocd.offset + EOCD_CD_OFFSET_FIELD, cd_offset)?;

    debug!(
        "Shifted {} central directory offsets by {}",
        layout.records.len(),
        shift
    );
    Ok(out)
}

fn prepend_tar(archive: &[u8], prefix: &[u8]) -> Vec<u8> {
    let padded = prefix.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    let mut out = Vec::with_capacity(padded + archive.len());
    out.extend_from_slice(prefix);
    out.resize(padded, 0);
    out.extend_from_slice(archive);
    out
}
