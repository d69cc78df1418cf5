//! Composes the archive engine with the service's collaborators.
//!

use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use archive_guard::{ResourceMonitor, SecureArchiveExtractor, validate_safe_name};
use shared::{BackupId, BackupRecord, ServerId};
use tracing::{info, warn};

use crate::{BackupError, BackupRepository, Config, Context, DirectoryProvider, WorkerPool};

mod create;
mod restore;
mod upload;

pub use restore::RestoreReport;

/// Server ids with an operation in progress.
#[derive(Clone, Debug, Default)]
pub struct BusyServers {
    servers: Arc<Mutex<HashSet<ServerId>>>,
}

impl BusyServers {
    /// Mark `server_id` busy until the returned guard is dropped.
    ///
    /// `None` if it already is.
    pub fn claim(&self, server_id: &ServerId) -> Option<BusyGuard> {
        let mut servers = self.servers.lock().unwrap_or_else(PoisonError::into_inner);

        if !servers.insert(server_id.clone()) {
            return None;
        }

        Some(BusyGuard {
            servers: Arc::clone(&self.servers),
            server_id: server_id.clone(),
        })
    }

    /// If `server_id` has an operation in progress.
    pub fn is_busy(&self, server_id: &ServerId) -> bool {
        self.servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(server_id)
    }
}

/// Releases a server when dropped.
#[derive(Debug)]
pub struct BusyGuard {
    servers: Arc<Mutex<HashSet<ServerId>>>,
    server_id: ServerId,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.server_id);
    }
}

/// Creates, restores, uploads and deletes backups.
///
/// Archive work runs on the worker pool, the calling task only awaits it.
pub struct BackupOrchestrator {
    config: Arc<Config>,
    directories: Arc<dyn DirectoryProvider>,
    repository: Arc<dyn BackupRepository>,
    workers: WorkerPool,
    busy: BusyServers,
}

impl BackupOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: Config,
        directories: Arc<dyn DirectoryProvider>,
        repository: Arc<dyn BackupRepository>,
    ) -> Self {
        let workers = WorkerPool::new(config.workers.maximum_workers);

        Self {
            config: Arc::new(config),
            directories,
            repository,
            workers,
            busy: BusyServers::default(),
        }
    }

    /// The orchestrator's config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The servers with an operation in progress.
    pub fn busy_servers(&self) -> &BusyServers {
        &self.busy
    }

    /// Every backup of a server, newest first.
    pub fn list(&self, server_id: &ServerId) -> Result<Vec<BackupRecord>, BackupError> {
        let mut records = self.repository.list_for_server(server_id)?;

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(records)
    }

    /// Delete a backup's archive and then its record.
    pub fn delete(&self, backup_id: BackupId) -> Result<BackupRecord, BackupError> {
        let mut context = Context {
            backup: Some(backup_id),
            current_context: "Delete",
            ..Context::default()
        };

        let record = self
            .repository
            .get(backup_id)?
            .ok_or(BackupError::BackupNotFound(backup_id))?;
        context.server = Some(record.server_id.clone());

        let _guard = self.claim(&context, &record.server_id)?;

        if let Err(error) = fs::remove_file(&record.file_path) {
            if error.kind() == ErrorKind::NotFound {
                warn!("{context}Archive {:?} was already gone", record.file_path);
            } else {
                return Err(BackupError::Io(error, "remove archive"));
            }
        }

        self.repository.delete(backup_id)?;
        info!("{context}Deleted");

        Ok(record)
    }

    /// Validate a server id from a caller, it ends up in archive names.
    fn check_server_id(&self, server_id: &ServerId) -> Result<(), BackupError> {
        validate_safe_name(server_id.as_str(), self.config.limits.maximum_name_length)?;
        Ok(())
    }

    /// Claim a server for the duration of an operation.
    fn claim(&self, context: &Context, server_id: &ServerId) -> Result<BusyGuard, BackupError> {
        self.busy.claim(server_id).ok_or_else(|| {
            warn!("{context}Another operation is in progress");
            BackupError::OperationInProgress(server_id.clone())
        })
    }

    /// An extractor watching memory from now on.
    fn extractor(&self) -> SecureArchiveExtractor {
        SecureArchiveExtractor::new()
            .with_progress_policy(self.config.archive.progress_policy())
            .with_monitor(ResourceMonitor::start(
                self.config.limits.maximum_memory_bytes,
            ))
    }

    /// Where archives are written, created if missing.
    fn backup_directory(&self) -> Result<PathBuf, BackupError> {
        let directory = &self.config.backup_directory;
        fs::create_dir_all(directory).map_err(|e| BackupError::Io(e, "create backup directory"))?;
        fs::canonicalize(directory).map_err(|e| BackupError::Io(e, "resolve backup directory"))
    }
}
