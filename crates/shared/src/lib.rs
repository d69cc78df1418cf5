//! # Shared
//! The shared components between the archive engine and the backup service.
//!

#![warn(missing_docs)]

mod backup_type;
mod failure;
mod logger;
mod record;
mod response;
#[cfg(feature = "test")]
pub mod test;

pub use backup_type::{BackupStatus, BackupType};
pub use failure::Failure;
pub use logger::{LoggerError, init_logger};
pub use record::{
    ArchiveFormat, BackupDraft, BackupId, BackupRecord, RecordTransitionError, ServerId,
    archive_file_name,
};
pub use response::Response;
