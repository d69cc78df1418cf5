use archive_guard::{ResourceMonitor, TransferBudget, UploadSource, receive_upload};
use chrono::Utc;
use shared::{ArchiveFormat, BackupDraft, BackupRecord, BackupStatus, BackupType, ServerId};
use tracing::{error, info, warn};

use crate::{BackupError, BackupOrchestrator, Context};

/// Uploads are staged in this directory inside the backup directory.
const STAGING_DIRECTORY: &str = ".staging";

impl BackupOrchestrator {
    /// Store an uploaded archive as a backup of a server.
    ///
    /// The record is only stored after the upload passed the size, format and
    /// member checks.
    pub async fn upload<S, P>(
        &self,
        server_id: &ServerId,
        source: S,
        name: &str,
        description: Option<String>,
        progress: P,
    ) -> Result<BackupRecord, BackupError>
    where
        S: UploadSource + Send + 'static,
        P: FnMut(&TransferBudget) + Send + 'static,
    {
        let mut context = Context::for_server(server_id, "Upload");

        self.check_server_id(server_id)?;
        let _guard = self.claim(&context, server_id)?;

        self.directories.server_directory(server_id)?;
        let backup_directory = self.backup_directory()?;

        // Receive and validate
        context.current_context = "Receive";
        let staged = {
            let staging = backup_directory.join(STAGING_DIRECTORY);
            let limits = self.config.limits.upload_limits();
            let extractor = self.extractor();
            let monitor = ResourceMonitor::start(self.config.limits.maximum_memory_bytes);

            self.workers
                .run(move || {
                    receive_upload(
                        source,
                        limits,
                        &staging,
                        &extractor,
                        Some(&monitor),
                        progress,
                    )
                })
                .await?
        };

        let staged = match staged {
            Ok(staged) => staged,
            Err(error) => {
                warn!("{context}Rejected: {error}");
                return Err(error.into());
            }
        };

        // Persist
        context.current_context = "Persist";
        let draft = BackupDraft {
            server_id: server_id.clone(),
            name: name.to_string(),
            description,
            backup_type: BackupType::Manual,
            status: BackupStatus::Completed,
            file_size_bytes: staged.bytes,
            backup_directory,
            format: if staged.compressed {
                ArchiveFormat::TarGz
            } else {
                ArchiveFormat::Tar
            },
            created_at: Utc::now(),
        };
        let record = self.repository.insert(draft)?;
        context.backup = Some(record.id);

        if let Err(error) = staged.persist(&record.file_path) {
            error!("{context}Could not store upload: {error}");

            if let Err(e) = self.repository.delete(record.id) {
                error!("{context}Could not remove record: {e}");
            }
            return Err(error.into());
        }

        info!(
            "{context}Stored {} bytes at {:?}",
            record.file_size_bytes, record.file_path
        );

        Ok(record)
    }
}
