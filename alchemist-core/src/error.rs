//! Error types for Archive Alchemist operations.
//!
//! Usage errors, missing entries, I/O failures and malformed archive structure
//! all surface through [`AlchemistError`]. Checksum and header disagreements are
//! not errors; codecs report them as diagnostics next to the parsed entries.

use std::io;
use thiserror::Error;

/// The main error type for Archive Alchemist operations.
#[derive(Debug, Error)]
pub enum AlchemistError {
    /// I/O error from the underlying file or stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid combination or absence of command-line options.
    #[error("{message}")]
    Usage {
        /// Human-readable explanation.
        message: String,
    },

    /// No archive member matched the requested path.
    #[error("{path} not found in the archive")]
    EntryNotFound {
        /// The requested member path.
        path: String,
    },

    /// Selective extraction matched nothing.
    #[error("Path '{path}' not found in the archive")]
    PathNotFound {
        /// The requested path filter.
        path: String,
    },

    /// A `--content-file` source does not exist.
    #[error("Content file not found: {path}")]
    ContentFileNotFound {
        /// The local file path given on the command line.
        path: String,
    },

    /// The archive file itself does not exist.
    #[error("Archive {path} does not exist")]
    ArchiveMissing {
        /// The archive path.
        path: String,
    },

    /// Invalid magic number in an archive structure.
    #[error("Invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Unexpected end of file.
    #[error("Unexpected end of file: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// A structure or value the codecs deliberately do not handle.
    #[error("Unsupported: {message}")]
    Unsupported {
        /// What was attempted.
        message: String,
    },

    /// An operation that needs a regular file hit something else.
    #[error("{path} is not a regular file")]
    NotAFile {
        /// The member path.
        path: String,
    },

    /// `read` was pointed at a directory member.
    #[error("could not read {path}, it is a directory")]
    IsDirectory {
        /// The member path.
        path: String,
    },
}

/// Result type alias for Archive Alchemist operations.
pub type Result<T> = std::result::Result<T, AlchemistError>;

impl AlchemistError {
    /// Create a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(path: impl Into<String>) -> Self {
        Self::EntryNotFound { path: path.into() }
    }

    /// Create a path filter not found error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    /// Create a missing content file error.
    pub fn content_file_not_found(path: impl Into<String>) -> Self {
        Self::ContentFileNotFound { path: path.into() }
    }

    /// Create a missing archive error.
    pub fn archive_missing(path: impl Into<String>) -> Self {
        Self::ArchiveMissing { path: path.into() }
    }

    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a not-a-regular-file error.
    pub fn not_a_file(path: impl Into<String>) -> Self {
        Self::NotAFile { path: path.into() }
    }

    /// Create an is-a-directory error.
    pub fn is_directory(path: impl Into<String>) -> Self {
        Self::IsDirectory { path: path.into() }
    }

    /// True for errors caused by malformed archive bytes.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. } | Self::InvalidHeader { .. } | Self::UnexpectedEof { .. }
        )
    }
}
