use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};

use thiserror::Error;

/// Maximum number of characters of an untrusted name kept in an error.
const MAX_DISPLAY_CHARS: usize = 256;

/// Shortens an untrusted name for logs and errors, keeping the start and end.
pub(crate) fn display_name(name: &str) -> String {
    let char_count = name.chars().count();
    if char_count <= MAX_DISPLAY_CHARS {
        return name.to_string();
    }

    let keep = (MAX_DISPLAY_CHARS - 3) / 2;
    let start: String = name.chars().take(keep).collect();
    let end: String = name.chars().skip(char_count - keep).collect();

    format!("{start}...{end}")
}

/// Input was rejected because it matches an attack pattern.
///
/// Always fatal to the current operation and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// The path escapes, or tries to escape, its base directory.
    #[error("Path traversal detected: '{0}'")]
    PathTraversal(String),

    /// The name is empty or contains a forbidden character.
    #[error("Invalid characters in name: '{0}'")]
    InvalidCharacters(String),

    /// The name is a reserved device name.
    #[error("Reserved device name: '{0}'")]
    ReservedName(String),

    /// `length, limit`
    #[error("Name is too long: {0} > {1}")]
    TooLong(usize, usize),

    /// The archive member is a symbolic or hard link.
    #[error("Links are not allowed: '{0}'")]
    SymbolicLink(String),

    /// The archive member is a character, block or fifo special file.
    #[error("Device files are not allowed: '{0}'")]
    DeviceFile(String),
}

impl SecurityError {
    pub(crate) fn path_traversal(name: &str) -> Self {
        Self::PathTraversal(display_name(name))
    }

    pub(crate) fn invalid_characters(name: &str) -> Self {
        Self::InvalidCharacters(display_name(name))
    }
}

/// Resolving a path either proved it unsafe or could not be completed.
#[derive(Debug, Error)]
pub enum PathError {
    /// The path is unsafe.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// The filesystem could not resolve the path.
    #[error("Failed to resolve '{path}': {source}")]
    Resolve {
        /// The path being resolved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

/// An operational file error that does not imply anything adversarial.
#[derive(Debug, Error)]
pub enum FileOperationError {
    /// `limit, received`
    #[error("Size limit exceeded: {1} > {0} bytes")]
    SizeExceeded(u64, u64),

    #[error("File not found: {0:?}")]
    #[allow(missing_docs)]
    NotFound(PathBuf),

    #[error("Permission denied: {0:?}")]
    #[allow(missing_docs)]
    PermissionDenied(PathBuf),

    /// The file name does not carry a supported archive extension.
    #[error("Unsupported archive file name '{0}', expected .tar, .tar.gz or .tgz")]
    UnsupportedFormat(String),
}

impl FileOperationError {
    /// Classifies an I/O error on `path`, if it is one of the known kinds.
    pub fn from_io(error: &io::Error, path: PathBuf) -> Option<Self> {
        match error.kind() {
            ErrorKind::NotFound => Some(Self::NotFound(path)),
            ErrorKind::PermissionDenied => Some(Self::PermissionDenied(path)),
            _ => None,
        }
    }
}

/// The process grew past its memory budget during an operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Memory grew by {growth} bytes, limit is {limit} bytes")]
pub struct MemoryError {
    /// Growth since the operation started.
    pub growth: u64,
    /// The allowed growth.
    pub limit: u64,
}
