//! # archive-guard
//! Builds backup archives of large directory trees and restores archives from
//! untrusted sources without letting a hostile member touch the filesystem.
//!

#![warn(missing_docs)]

mod budget;
mod builder;
mod error;
mod extractor;
mod member;
mod monitor;
mod path;
#[cfg(feature = "test")]
pub mod test;
mod upload;

pub use budget::{ProgressPolicy, TransferBudget};
pub use builder::{BuildError, BuildReport, BuilderOptions, ChunkedArchiveBuilder};
pub use builder::{StreamedBytes, stream_chunks, tar_padding};
pub use error::{FileOperationError, MemoryError, PathError, SecurityError};
pub use extractor::{ExtractError, SecureArchiveExtractor, is_gzip_file, open_archive};
pub use member::{ArchiveMember, MemberKind, validate_member};
pub use monitor::{MemorySampler, ProcessMemory, ResourceMonitor};
pub use path::{
    DEFAULT_MAX_NAME_LENGTH, ResolvedPath, SafeName, create_safe_server_directory,
    validate_safe_name, validate_safe_path,
};
pub use upload::{
    BoundedUploadReader, ReaderUpload, StagedUpload, UploadError, UploadLimits, UploadSource,
    check_archive_format, receive_upload,
};
