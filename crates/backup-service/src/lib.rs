//! # backup-service
//! Creates, restores and receives server backups on top of `archive-guard`.
//!

#![warn(missing_docs)]

mod cleanup;
mod config;
mod context;
mod directories;
mod error;
mod orchestrator;
mod ports;
mod store;
mod worker;

pub use cleanup::{
    RESTORE_POINT_DIRECTORY, cleanup_restore_points, restore_point_directory, restore_point_path,
};
pub use config::{ArchiveConfig, Config, Limits, LoadConfigError, RetentionConfig, WorkerConfig};
pub use context::Context;
pub use directories::{FsDirectoryProvider, RUNNING_MARKER};
pub use error::BackupError;
pub use orchestrator::{BackupOrchestrator, BusyGuard, BusyServers, RestoreReport};
pub use ports::{
    BackupRepository, DirectoryError, DirectoryProvider, RepositoryError, ServerDirectory,
};
pub use store::{JsonBackupRepository, LoadRepositoryError, SaveRepositoryError};
pub use worker::{WorkerError, WorkerPool};
