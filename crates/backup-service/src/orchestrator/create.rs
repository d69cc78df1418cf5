use std::fs;

use archive_guard::{ChunkedArchiveBuilder, TransferBudget};
use chrono::Utc;
use shared::{ArchiveFormat, BackupDraft, BackupRecord, BackupStatus, BackupType, ServerId};
use tracing::{error, info, warn};

use crate::{BackupError, BackupOrchestrator, Context};

impl BackupOrchestrator {
    /// Archive a server's directory into a new backup.
    ///
    /// The record is stored as creating once the server directory is known, then
    /// updated exactly once when the archive is written or fails.
    pub async fn create<P>(
        &self,
        server_id: &ServerId,
        name: &str,
        description: Option<String>,
        backup_type: BackupType,
        mut progress: P,
    ) -> Result<BackupRecord, BackupError>
    where
        P: FnMut(&TransferBudget) + Send + 'static,
    {
        let mut context = Context::for_server(server_id, "Create");

        self.check_server_id(server_id)?;
        let _guard = self.claim(&context, server_id)?;

        let directory = self.directories.server_directory(server_id)?;
        let backup_directory = self.backup_directory()?;

        let draft = BackupDraft {
            server_id: server_id.clone(),
            name: name.to_string(),
            description,
            backup_type,
            status: BackupStatus::Creating,
            file_size_bytes: 0,
            backup_directory,
            format: ArchiveFormat::TarGz,
            created_at: Utc::now(),
        };
        let mut record = self.repository.insert(draft)?;
        context.backup = Some(record.id);
        info!("{context}Archiving {:?}", directory.root);

        // Build archive
        context.current_context = "Build Archive";
        let result = {
            let builder = ChunkedArchiveBuilder::new(self.config.archive.builder_options());
            let source = directory.root.clone();
            let archive_path = record.file_path.clone();
            let job_context = context.clone();

            self.workers
                .run(move || {
                    builder.create_archive(&source, &archive_path, |budget| {
                        info!(
                            "{job_context}{}% ({} of {} files)",
                            budget.percent_complete(),
                            budget.files_processed,
                            budget.total_files
                        );
                        progress(budget);
                    })
                })
                .await
        };

        // Record result
        context.current_context = "Record Result";
        let result = match result {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(error)) => Err(BackupError::from(error)),
            Err(error) => {
                // The job never finished, so it never cleaned up after itself.
                if let Err(e) = fs::remove_file(&record.file_path) {
                    warn!("{context}Could not remove partial archive: {e}");
                }
                Err(BackupError::from(error))
            }
        };

        match result {
            Ok(report) => {
                record.complete(report.archive_bytes)?;
                self.repository.update(&record)?;

                info!(
                    "{context}Completed, {} files ({} skipped), {} bytes",
                    report.budget.files_processed,
                    report.skipped.len(),
                    report.archive_bytes
                );
                Ok(record)
            }

            Err(error) => {
                error!("{context}Failed: {error}");

                record.fail()?;
                if let Err(e) = self.repository.update(&record) {
                    error!("{context}Could not record failure: {e}");
                }
                Err(error)
            }
        }
    }
}
