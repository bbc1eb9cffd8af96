//! # Archive Alchemist: archive engines
//!
//! Parsing, rewriting and extraction of ZIP and TAR-family archives with
//! byte-level control over the fields conventional libraries normalize.
//!
//! - [`detect`]: format resolution (override, magic bytes, structure, extension)
//! - [`zip`]: local/central header codec with header reconciliation
//! - [`tar`]: USTAR codec with PAX and GNU long names
//! - [`compress`]: gzip/xz/bzip2 stream wrappers for the compressed TAR variants
//! - [`archive`]: the in-memory [`Archive`] and its load/save cycle
//! - [`mutate`]: add, replace, append, modify and remove
//! - [`polyglot`]: prefix injection with offset fixups
//! - [`extract`]: safe and vulnerable extraction
//!
//! ## Example
//!
//! ```rust
//! use alchemist_archive::archive::Archive;
//! use alchemist_archive::detect::ArchiveFormat;
//! use alchemist_archive::mutate::{Attributes, Payload};
//!
//! let mut archive = Archive::new(ArchiveFormat::Zip);
//! archive
//!     .add("config.txt", Payload::Symlink("/etc/passwd".into()), &Attributes::default())
//!     .unwrap();
//! archive
//!     .add("config.txt", Payload::Content(b"x".to_vec()), &Attributes::default())
//!     .unwrap();
//!
//! let bytes = archive.to_bytes().unwrap();
//! let reparsed = Archive::parse(ArchiveFormat::Zip, &bytes).unwrap();
//! assert_eq!(reparsed.entries.len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod compress;
pub mod content_dir;
pub mod detect;
pub mod extract;
pub mod mutate;
pub mod polyglot;
pub mod tar;
pub mod time;
pub mod zip;

// Re-exports
pub use archive::{Archive, Diagnostic};
pub use detect::ArchiveFormat;
pub use extract::{ExtractOptions, ExtractSummary};
pub use mutate::{Attributes, Modification, Payload};
pub use tar::TarHeader;
pub use zip::{CentralDirHeader, EndOfCentralDir, LocalFileHeader};
