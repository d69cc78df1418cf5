use std::{fs, io, path::PathBuf};

use archive_guard::{FileOperationError, TransferBudget};
use chrono::Utc;
use shared::{BackupId, BackupStatus, ServerId};
use tracing::{error, info, warn};

use crate::{BackupError, BackupOrchestrator, Context, cleanup_restore_points, restore_point_path};

/// The result of a restore.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreReport {
    /// The restored backup.
    pub backup_id: BackupId,

    /// The server restored into.
    pub server_id: ServerId,

    /// Members written.
    pub budget: TransferBudget,

    /// Where the previous server directory was moved, if there was one.
    pub restore_point: Option<PathBuf>,
}

impl BackupOrchestrator {
    /// Replace a stopped server's directory with the contents of a backup.
    ///
    /// The archive is validated before the server directory is touched. The current
    /// directory is then moved aside as a restore point and the archive extracted in
    /// its place. A failed extraction keeps both for inspection.
    pub async fn restore<P>(
        &self,
        backup_id: BackupId,
        target_server_id: &ServerId,
        mut progress: P,
    ) -> Result<RestoreReport, BackupError>
    where
        P: FnMut(&TransferBudget) + Send + 'static,
    {
        let mut context = Context {
            server: Some(target_server_id.clone()),
            backup: Some(backup_id),
            current_context: "Restore",
        };

        self.check_server_id(target_server_id)?;

        let record = self
            .repository
            .get(backup_id)?
            .ok_or(BackupError::BackupNotFound(backup_id))?;
        if record.status() != BackupStatus::Completed {
            warn!("{context}Backup is {}", record.status());
            return Err(BackupError::NotRestorable(backup_id, record.status()));
        }

        let _guard = self.claim(&context, target_server_id)?;

        let directory = self.directories.server_directory(target_server_id)?;
        if directory.running {
            warn!("{context}Server is running");
            return Err(BackupError::ServerRunning(target_server_id.clone()));
        }

        if !record.file_path.is_file() {
            error!("{context}Archive {:?} is missing", record.file_path);
            return Err(FileOperationError::NotFound(record.file_path).into());
        }

        let extractor = self.extractor();

        // Validate archive
        context.current_context = "Validate Archive";
        let totals = {
            let extractor = extractor.clone();
            let archive = record.file_path.clone();

            self.workers
                .run(move || extractor.validate_archive_safety(&archive))
                .await??
        };
        info!(
            "{context}{} members, {} bytes",
            totals.total_files, totals.total_bytes
        );

        // Move the server aside
        context.current_context = "Restore Point";
        let restore_point = if directory.root.exists() {
            let path = restore_point_path(&directory.root, Utc::now()).ok_or_else(|| {
                BackupError::Io(
                    io::Error::other("server directory has no name"),
                    "name restore point",
                )
            })?;

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| BackupError::Io(e, "create restore point directory"))?;
            }
            fs::rename(&directory.root, &path)
                .map_err(|e| BackupError::Io(e, "move server directory aside"))?;
            info!("{context}Moved server directory to {path:?}");

            Some(path)
        } else {
            None
        };

        // Extract
        context.current_context = "Extract";
        let result = {
            let archive = record.file_path.clone();
            let target = directory.root.clone();
            let job_context = context.clone();

            self.workers
                .run(move || {
                    extractor.safe_extract(&archive, &target, |budget| {
                        info!(
                            "{job_context}{}% ({} of {} members)",
                            budget.percent_complete(),
                            budget.files_processed,
                            budget.total_files
                        );
                        progress(budget);
                    })
                })
                .await?
        };

        let budget = match result {
            Ok(budget) => budget,
            Err(error) => {
                error!("{context}Failed, restore point kept at {restore_point:?}: {error}");
                return Err(error.into());
            }
        };
        info!("{context}Restored {} members", budget.files_processed);

        // Cleanup
        {
            let mut cleanup_context = context.clone();
            let root = directory.root.clone();
            let maximum = self.config.retention.maximum_restore_points;

            if let Err(error) = self
                .workers
                .run(move || cleanup_restore_points(&mut cleanup_context, &root, maximum))
                .await
            {
                error!("{context}Could not clean up restore points: {error}");
            }
        }

        Ok(RestoreReport {
            backup_id,
            server_id: target_server_id.clone(),
            budget,
            restore_point,
        })
    }
}
