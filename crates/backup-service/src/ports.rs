//! Collaborators the orchestrator depends on but does not own.
//!

use std::path::PathBuf;

use archive_guard::{PathError, SecurityError};
use shared::{BackupDraft, BackupId, BackupRecord, ServerId};
use thiserror::Error;

/// A server's directory as reported by a [`DirectoryProvider`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerDirectory {
    /// The server's root directory.
    pub root: PathBuf,

    /// If the server is running and its directory must not be replaced.
    pub running: bool,
}

/// Knows where each server lives and whether it is running.
pub trait DirectoryProvider: Send + Sync {
    /// Look up a server.
    fn server_directory(&self, server_id: &ServerId) -> Result<ServerDirectory, DirectoryError>;
}

/// Stores backup records.
///
/// Called once per record transition.
pub trait BackupRepository: Send + Sync {
    /// Persist a new record, assigning its identifier.
    fn insert(&self, draft: BackupDraft) -> Result<BackupRecord, RepositoryError>;

    /// Replace an existing record.
    fn update(&self, record: &BackupRecord) -> Result<(), RepositoryError>;

    /// Get a record.
    fn get(&self, id: BackupId) -> Result<Option<BackupRecord>, RepositoryError>;

    /// Delete a record.
    fn delete(&self, id: BackupId) -> Result<(), RepositoryError>;

    /// Every record of a server, in no particular order.
    fn list_for_server(&self, server_id: &ServerId) -> Result<Vec<BackupRecord>, RepositoryError>;
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("Server '{0}' does not exist")]
    NotFound(ServerId),

    #[error("Failed to resolve server directory '{path}': {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<PathError> for DirectoryError {
    fn from(error: PathError) -> Self {
        match error {
            PathError::Security(error) => Self::Security(error),
            PathError::Resolve { path, source } => Self::Resolve { path, source },
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Backup {0} does not exist")]
    NotFound(BackupId),

    #[error("Backup repository failed: {0}")]
    Backend(#[source] Box<dyn core::error::Error + Send + Sync>),
}
