//! Stream compression for the compressed TAR variants and ZIP member payloads.
//!
//! Every call fully materializes its output. Compressed TAR archives are
//! always decompressed as a whole, rewritten, and recompressed as a whole.

use alchemist_core::error::{AlchemistError, Result};
use std::io::{Read, Write};

/// xz preset used when writing `.tar.xz`.
const XZ_PRESET: u32 = 6;

/// ZIP compression method: stored.
pub const ZIP_METHOD_STORED: u16 = 0;
/// ZIP compression method: deflate.
pub const ZIP_METHOD_DEFLATE: u16 = 8;
/// ZIP compression method: bzip2.
pub const ZIP_METHOD_BZIP2: u16 = 12;

/// Stream compression around a TAR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// gzip (RFC 1952).
    Gzip,
    /// xz container with LZMA2.
    Xz,
    /// bzip2.
    Bzip2,
}

/// Decompress a whole stream.
pub fn decompress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match compression {
        Compression::Gzip => {
            flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
        }
        Compression::Xz => {
            xz2::read::XzDecoder::new(data).read_to_end(&mut out)?;
        }
        Compression::Bzip2 => {
            bzip2::read::BzDecoder::new(data).read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

/// Compress a whole stream.
pub fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    let out = match compression {
        Compression::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?
        }
        Compression::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), XZ_PRESET);
            encoder.write_all(data)?;
            encoder.finish()?
        }
        Compression::Bzip2 => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?
        }
    };
    Ok(out)
}

/// Decode a ZIP member payload stored with `method`.
pub fn decode_zip_payload(method: u16, data: &[u8]) -> Result<Vec<u8>> {
    match method {
        ZIP_METHOD_STORED => Ok(data.to_vec()),
        ZIP_METHOD_DEFLATE => {
            let mut out = Vec::new();
            flate2::read::DeflateDecoder::new(data).read_to_end(&mut out)?;
            Ok(out)
        }
        ZIP_METHOD_BZIP2 => decompress(Compression::Bzip2, data),
        other => Err(AlchemistError::unsupported(format!(
            "ZIP compression method {}",
            other
        ))),
    }
}
