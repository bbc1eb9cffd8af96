//! # Archive Alchemist Core
//!
//! Format-independent building blocks shared by the archive codecs and the CLI.
//!
//! - [`entry`]: the archive member model (path, kind, mode, ownership, format extras)
//! - [`mode`]: Unix mode constants and `ls -l` style permission strings
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: Commands                                            │
//! │     archive-alchemist CLI, listings, JSON output        │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Engines                                             │
//! │     Mutation, Polyglot, Extraction (safe / vulnerable)  │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Codecs                                              │
//! │     ZIP (LFH/CDH/EOCD), TAR (USTAR/PAX/GNU), gz/xz/bz2  │
//! ├─────────────────────────────────────────────────────────┤
//! │ L0: Model (this crate)                                  │
//! │     Entry, EntryKind, modes, errors                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use alchemist_core::entry::Entry;
//! use alchemist_core::mode::format_mode;
//!
//! let entry = Entry::file("../../evil.sh", b"#!/bin/sh\n".to_vec()).with_mode(0o4755);
//! assert_eq!(entry.sanitized_name(), "evil.sh");
//! assert_eq!(format_mode(entry.type_char(), entry.mode), "-rwsr-xr-x");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod entry;
pub mod error;
pub mod mode;

// Re-exports for convenience
pub use entry::{Entry, EntryKind, FormatExtras, TarExtras, ZipExtras};
pub use error::{AlchemistError, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::entry::{Entry, EntryKind, FormatExtras, TarExtras, ZipExtras};
    pub use crate::error::{AlchemistError, Result};
    pub use crate::mode::{format_mode, format_octal};
}
