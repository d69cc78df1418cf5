//! Backup records stored in a JSON file
//!

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use shared::{BackupDraft, BackupId, BackupRecord, ServerId};
use thiserror::Error;
use tracing::debug;

use crate::{BackupRepository, RepositoryError};

/// The contents of the repository file.
#[derive(Debug, Default, Deserialize, Serialize)]
struct RepositoryState {
    /// The identifier the next record receives.
    next_id: u64,

    /// Every record.
    records: Vec<BackupRecord>,
}

/// A [`BackupRepository`] writing every change to a JSON file.
#[derive(Debug)]
pub struct JsonBackupRepository {
    path: PathBuf,
    state: Mutex<RepositoryState>,
}

impl JsonBackupRepository {
    /// Tries to load the repository from a json file, creating it if it does not exist.
    pub fn load_or_create_file(path: impl Into<PathBuf>) -> Result<Self, LoadRepositoryError> {
        let path = path.into();

        if !path.exists() {
            let repository = Self {
                path,
                state: Mutex::new(RepositoryState {
                    next_id: 1,
                    records: Vec::new(),
                }),
            };
            repository.save(&repository.lock())?;
            return Ok(repository);
        }

        let contents = fs::read_to_string(&path).map_err(LoadRepositoryError::ReadFile)?;
        let state: RepositoryState = serde_json::from_str(&contents)?;
        debug!("Loaded {} backup records from {path:?}", state.records.len());

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// The file the repository is stored in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Save the current state.
    fn save(&self, state: &RepositoryState) -> Result<(), SaveRepositoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(SaveRepositoryError::WriteFile)?;
            }
        }

        let contents = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, contents).map_err(SaveRepositoryError::WriteFile)?;
        Ok(())
    }
}

impl BackupRepository for JsonBackupRepository {
    fn insert(&self, draft: BackupDraft) -> Result<BackupRecord, RepositoryError> {
        let mut state = self.lock();

        let id = BackupId(state.next_id);
        let record = BackupRecord::from_draft(id, draft);

        state.next_id += 1;
        state.records.push(record.clone());
        self.save(&state)?;

        Ok(record)
    }

    fn update(&self, record: &BackupRecord) -> Result<(), RepositoryError> {
        let mut state = self.lock();

        let existing = state
            .records
            .iter_mut()
            .find(|existing| existing.id == record.id)
            .ok_or(RepositoryError::NotFound(record.id))?;
        *existing = record.clone();

        self.save(&state)?;
        Ok(())
    }

    fn get(&self, id: BackupId) -> Result<Option<BackupRecord>, RepositoryError> {
        let state = self.lock();
        Ok(state.records.iter().find(|record| record.id == id).cloned())
    }

    fn delete(&self, id: BackupId) -> Result<(), RepositoryError> {
        let mut state = self.lock();

        let count = state.records.len();
        state.records.retain(|record| record.id != id);
        if state.records.len() == count {
            return Err(RepositoryError::NotFound(id));
        }

        self.save(&state)?;
        Ok(())
    }

    fn list_for_server(&self, server_id: &ServerId) -> Result<Vec<BackupRecord>, RepositoryError> {
        let state = self.lock();

        Ok(state
            .records
            .iter()
            .filter(|record| &record.server_id == server_id)
            .cloned()
            .collect())
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoadRepositoryError {
    #[error("Failed to deserialize backup records: {0}")]
    Deserialize(#[from] serde_json::error::Error),

    #[error("Failed to read backup records: {0}")]
    ReadFile(#[source] io::Error),

    #[error("Failed to create new backup records file: {0}")]
    CreateFile(#[from] SaveRepositoryError),
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SaveRepositoryError {
    #[error("Failed to serialize backup records: {0}")]
    Serialize(#[from] serde_json::error::Error),

    #[error("Failed to write backup records file: {0}")]
    WriteFile(#[source] io::Error),
}

impl From<SaveRepositoryError> for RepositoryError {
    fn from(error: SaveRepositoryError) -> Self {
        Self::Backend(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shared::{ArchiveFormat, BackupStatus, BackupType};

    use super::*;

    fn draft(server: &str) -> BackupDraft {
        BackupDraft {
            server_id: ServerId::from(server),
            name: "nightly".to_string(),
            description: None,
            backup_type: BackupType::Manual,
            status: BackupStatus::Creating,
            file_size_bytes: 0,
            backup_directory: PathBuf::from("/srv/backups"),
            format: ArchiveFormat::TarGz,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn records_survive_reload() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("backups.json");

        let repository = JsonBackupRepository::load_or_create_file(&path).unwrap();
        let mut first = repository.insert(draft("survival")).unwrap();
        let second = repository.insert(draft("creative")).unwrap();
        assert_eq!(first.id, BackupId(1));
        assert_eq!(second.id, BackupId(2));

        first.complete(10).unwrap();
        repository.update(&first).unwrap();
        drop(repository);

        let repository = JsonBackupRepository::load_or_create_file(&path).unwrap();
        assert_eq!(repository.get(BackupId(1)).unwrap(), Some(first));
        assert_eq!(
            repository
                .list_for_server(&ServerId::from("creative"))
                .unwrap(),
            vec![second]
        );

        // Identifiers are never reused.
        repository.delete(BackupId(2)).unwrap();
        let third = repository.insert(draft("creative")).unwrap();
        assert_eq!(third.id, BackupId(3));
    }

    #[test]
    fn missing_records() {
        let directory = tempfile::tempdir().unwrap();
        let repository =
            JsonBackupRepository::load_or_create_file(directory.path().join("backups.json"))
                .unwrap();

        assert_eq!(repository.get(BackupId(9)).unwrap(), None);
        assert!(matches!(
            repository.delete(BackupId(9)),
            Err(RepositoryError::NotFound(BackupId(9)))
        ));
    }
}
