use core::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BackupStatus, BackupType};

/// Identifier of a backup, assigned by the persistence layer.
#[derive(Hash, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BackupId(pub u64);

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a game server.
#[derive(Hash, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl ServerId {
    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an archive file is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// A gzip compressed tar archive, as written by backups.
    #[default]
    TarGz,

    /// An uncompressed tar archive.
    Tar,
}

impl ArchiveFormat {
    /// The file extension, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Tar => "tar",
        }
    }
}

/// The name of the archive file for a backup.
///
/// `backup_<server>_<backup>_<YYYYMMDD_HHMMSS>.<tar.gz|tar>`
pub fn archive_file_name(
    server_id: &ServerId,
    backup_id: BackupId,
    created_at: DateTime<Utc>,
    format: ArchiveFormat,
) -> String {
    format!(
        "backup_{server_id}_{backup_id}_{}.{}",
        created_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// A backup that has not been assigned an identifier yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupDraft {
    /// The server this backup belongs to.
    pub server_id: ServerId,

    /// Display name.
    pub name: String,

    /// Optional free text description.
    pub description: Option<String>,

    /// How the backup came to exist.
    pub backup_type: BackupType,

    /// The initial status.
    pub status: BackupStatus,

    /// Archive size, zero while the archive is being written.
    pub file_size_bytes: u64,

    /// The directory the archive file lives in.
    pub backup_directory: PathBuf,

    /// How the archive file is encoded.
    pub format: ArchiveFormat,

    /// When the backup was started.
    pub created_at: DateTime<Utc>,
}

/// A persisted backup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRecord {
    /// Identifier.
    pub id: BackupId,

    /// The server this backup belongs to.
    pub server_id: ServerId,

    /// Display name.
    pub name: String,

    /// Optional free text description.
    pub description: Option<String>,

    /// Absolute path to the archive file.
    pub file_path: PathBuf,

    /// Archive size in bytes.
    pub file_size_bytes: u64,

    /// How the backup came to exist.
    pub backup_type: BackupType,

    /// Lifecycle status.
    status: BackupStatus,

    /// When the backup was started.
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    /// Creates a record from a draft once the persistence layer has assigned an id.
    pub fn from_draft(id: BackupId, draft: BackupDraft) -> Self {
        let file_path = draft.backup_directory.join(archive_file_name(
            &draft.server_id,
            id,
            draft.created_at,
            draft.format,
        ));

        Self {
            id,
            server_id: draft.server_id,
            name: draft.name,
            description: draft.description,
            file_path,
            file_size_bytes: draft.file_size_bytes,
            backup_type: draft.backup_type,
            status: draft.status,
            created_at: draft.created_at,
        }
    }

    /// The lifecycle status.
    pub fn status(&self) -> BackupStatus {
        self.status
    }

    /// Transition `Creating -> Completed`.
    pub fn complete(&mut self, file_size_bytes: u64) -> Result<(), RecordTransitionError> {
        self.transition(BackupStatus::Completed)?;
        self.file_size_bytes = file_size_bytes;
        Ok(())
    }

    /// Transition `Creating -> Failed`.
    pub fn fail(&mut self) -> Result<(), RecordTransitionError> {
        self.transition(BackupStatus::Failed)
    }

    fn transition(&mut self, next: BackupStatus) -> Result<(), RecordTransitionError> {
        if self.status.is_final() {
            return Err(RecordTransitionError {
                id: self.id,
                current: self.status,
                requested: next,
            });
        }

        self.status = next;
        Ok(())
    }
}

/// A record was asked to leave a final status.
#[derive(Debug, Error)]
#[error("Backup {id} is already {current}, cannot become {requested}")]
pub struct RecordTransitionError {
    /// The record.
    pub id: BackupId,
    /// The status it is in.
    pub current: BackupStatus,
    /// The status that was requested.
    pub requested: BackupStatus,
}
