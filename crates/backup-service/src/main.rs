//! # backup-service
//! Command line front end for creating, restoring and uploading server backups.
//!

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use archive_guard::ReaderUpload;
use backup_service::{
    BackupError, BackupOrchestrator, Config, FsDirectoryProvider, JsonBackupRepository,
};
use shared::{BackupId, BackupRecord, BackupType, Failure, ServerId, init_logger};
use tracing::{Level, error, info};

const USAGE: &str = "\
Usage:
    backup-service init
    backup-service create <server> <name>
    backup-service restore <backup id> <server>
    backup-service upload <server> <archive file>
    backup-service list <server>
    backup-service delete <backup id>";

fn print_record(record: &BackupRecord) {
    println!(
        "{}\t{}\t{}\t{}\t{} bytes\t{}",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.status(),
        record.backup_type,
        record.file_size_bytes,
        record.name
    );
}

fn parse_backup_id(value: &str) -> Option<BackupId> {
    value.parse().ok().map(BackupId)
}

async fn run(orchestrator: &BackupOrchestrator, args: &[String]) -> Result<(), BackupError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["create", server, name] => {
            let record = orchestrator
                .create(
                    &ServerId::from(*server),
                    name,
                    None,
                    BackupType::Manual,
                    |_| {},
                )
                .await?;
            print_record(&record);
        }

        ["restore", backup_id, server] => {
            let Some(backup_id) = parse_backup_id(backup_id) else {
                error!("Invalid backup id '{backup_id}'");
                return Ok(());
            };

            let report = orchestrator
                .restore(backup_id, &ServerId::from(*server), |_| {})
                .await?;
            info!(
                "Restored {} members into '{}', previous directory at {:?}",
                report.budget.files_processed, report.server_id, report.restore_point
            );
        }

        ["upload", server, file_path] => {
            let path = Path::new(file_path);
            let file = File::open(path).map_err(|e| BackupError::Io(e, "open upload"))?;
            let size = file
                .metadata()
                .map_err(|e| BackupError::Io(e, "read upload metadata"))?
                .len();
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .or_log_and_panic("Upload path has no file name");

            let upload = ReaderUpload::new(file_name.clone(), Some(size), file);
            let record = orchestrator
                .upload(&ServerId::from(*server), upload, &file_name, None, |_| {})
                .await?;
            print_record(&record);
        }

        ["list", server] => {
            for record in orchestrator.list(&ServerId::from(*server))? {
                print_record(&record);
            }
        }

        ["delete", backup_id] => {
            let Some(backup_id) = parse_backup_id(backup_id) else {
                error!("Invalid backup id '{backup_id}'");
                return Ok(());
            };

            let record = orchestrator.delete(backup_id)?;
            print_record(&record);
        }

        _ => println!("{USAGE}"),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let _logger = init_logger(Path::new("./logs"), Level::INFO)
        .or_log_and_panic("Could not initialize logger");

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Initialize config if args include 'init'.
    if args.first().is_some_and(|arg| arg == "init") {
        let config = Config::default();
        let contents =
            toml::to_string_pretty(&config).or_log_and_panic("Could not serialize config file");
        fs::write("config.toml", contents).or_log_and_panic("Could not create config file");
        return;
    }

    // Load config
    let config =
        Config::load_toml(PathBuf::from("./config.toml")).or_log_and_panic("Could not load config");

    // Load repository
    let repository = JsonBackupRepository::load_or_create_file(&config.repository_file)
        .or_log_and_panic("Could not load or create backup records");
    let directories = FsDirectoryProvider::new(&config.servers_directory);

    let orchestrator =
        BackupOrchestrator::new(config, Arc::new(directories), Arc::new(repository));

    if let Err(error) = run(&orchestrator, &args).await {
        error!(
            "{} ({}): {error}",
            if error.is_security() {
                "Rejected"
            } else {
                "Failed"
            },
            error.response().status_code()
        );
    }
}
