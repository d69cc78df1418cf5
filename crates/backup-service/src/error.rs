use std::io;

use archive_guard::{
    BuildError, ExtractError, FileOperationError, MemoryError, SecurityError, UploadError,
};
use shared::{BackupId, BackupStatus, RecordTransitionError, Response, ServerId};
use thiserror::Error;

use crate::{DirectoryError, RepositoryError, WorkerError};

/// The outcome of a failed orchestrator operation.
///
/// [`BackupError::is_security`] separates rejected input from operational failures.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Rejected for safety reasons: {0}")]
    Security(#[from] SecurityError),

    #[error(transparent)]
    FileOperation(#[from] FileOperationError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Not a valid archive: {0}")]
    InvalidArchive(String),

    #[error("Server '{0}' does not exist")]
    ServerNotFound(ServerId),

    #[error("Backup {0} does not exist")]
    BackupNotFound(BackupId),

    #[error("Backup {0} is {1} and cannot be restored")]
    NotRestorable(BackupId, BackupStatus),

    #[error("Server '{0}' is running")]
    ServerRunning(ServerId),

    #[error("Server '{0}' already has an operation in progress")]
    OperationInProgress(ServerId),

    #[error("Failed to build archive: {0}")]
    Build(#[from] BuildError),

    #[error("Failed to extract archive: {0}")]
    Extract(#[source] ExtractError),

    #[error("Failed to look up server: {0}")]
    Directory(#[source] DirectoryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Record(#[from] RecordTransitionError),

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),
}

impl BackupError {
    /// If the input was rejected for safety reasons, never retry these.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }

    /// The transport response for this error.
    pub fn response(&self) -> Response {
        match self {
            Self::Security(_) => Response::Rejected,

            Self::FileOperation(error) => match error {
                FileOperationError::SizeExceeded(..) => Response::TooLarge,
                FileOperationError::NotFound(_) => Response::NotFound,
                FileOperationError::PermissionDenied(_) => Response::Forbidden,
                FileOperationError::UnsupportedFormat(_) => Response::BadData,
            },

            Self::InvalidArchive(_) => Response::BadData,
            Self::Memory(_) => Response::ResourceExhausted,
            Self::ServerNotFound(_) | Self::BackupNotFound(_) => Response::NotFound,

            Self::NotRestorable(..) | Self::ServerRunning(_) | Self::OperationInProgress(_) => {
                Response::Conflict
            }

            Self::Build(_)
            | Self::Extract(_)
            | Self::Directory(_)
            | Self::Repository(_)
            | Self::Worker(_)
            | Self::Record(_)
            | Self::Io(..) => Response::Error,
        }
    }
}

impl From<ExtractError> for BackupError {
    fn from(error: ExtractError) -> Self {
        match error {
            ExtractError::Security(error) => Self::Security(error),
            ExtractError::Memory(error) => Self::Memory(error),
            ExtractError::ReadArchive(error) => Self::InvalidArchive(error.to_string()),
            error => Self::Extract(error),
        }
    }
}

impl From<UploadError> for BackupError {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::FileOperation(error) => Self::FileOperation(error),
            UploadError::InvalidFormat(reason) => Self::InvalidArchive(reason),
            UploadError::Extract(error) => Self::from(error),
            UploadError::Memory(error) => Self::Memory(error),
            UploadError::Io(error, context) => Self::Io(error, context),
        }
    }
}

impl From<DirectoryError> for BackupError {
    fn from(error: DirectoryError) -> Self {
        match error {
            DirectoryError::Security(error) => Self::Security(error),
            DirectoryError::NotFound(server_id) => Self::ServerNotFound(server_id),
            error => Self::Directory(error),
        }
    }
}
