use std::{fs, path::PathBuf};

use archive_guard::{BuilderOptions, DEFAULT_MAX_NAME_LENGTH, ProgressPolicy, UploadLimits};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The service's limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Limits {
    /// The maximum upload size in bytes.
    pub maximum_upload_bytes: u64,

    /// Bytes read from an upload at a time.
    pub upload_chunk_bytes: usize,

    /// The maximum memory an upload or restore may grow the process by.
    pub maximum_memory_bytes: u64,

    /// The maximum length of a server name.
    pub maximum_name_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            maximum_upload_bytes: 500 * 1024 * 1024, // 500 MiB
            upload_chunk_bytes: 8 * 1024,            // 8 KiB
            maximum_memory_bytes: 256 * 1024 * 1024, // 256 MiB
            maximum_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}

impl Limits {
    /// The limits for uploads.
    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            maximum_bytes: self.maximum_upload_bytes,
            chunk_bytes: self.upload_chunk_bytes,
        }
    }
}

/// Archive creation and extraction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Files larger than this are streamed in chunks.
    pub chunk_threshold_bytes: u64,

    /// The chunk size for streamed files.
    pub chunk_bytes: usize,

    /// Report progress every this many files.
    pub progress_file_interval: u64,

    /// Report progress after any entry larger than this.
    pub progress_large_entry_bytes: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: 100 * 1024 * 1024, // 100 MiB
            chunk_bytes: 64 * 1024,                   // 64 KiB
            progress_file_interval: 100,
            progress_large_entry_bytes: 50 * 1024 * 1024, // 50 MiB
        }
    }
}

impl ArchiveConfig {
    /// When to report progress.
    pub fn progress_policy(&self) -> ProgressPolicy {
        ProgressPolicy {
            file_interval: self.progress_file_interval,
            large_entry_bytes: self.progress_large_entry_bytes,
        }
    }

    /// The options for building archives.
    pub fn builder_options(&self) -> BuilderOptions {
        BuilderOptions {
            chunk_threshold_bytes: self.chunk_threshold_bytes,
            chunk_bytes: self.chunk_bytes,
            progress: self.progress_policy(),
            ..BuilderOptions::default()
        }
    }
}

/// The worker pool's config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// The maximum number of archive operations running at once.
    pub maximum_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { maximum_workers: 4 }
    }
}

/// How many restore points to keep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// The maximum number of restore points kept per server.
    pub maximum_restore_points: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            maximum_restore_points: 3,
        }
    }
}

/// The service's config
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Where backup archives are stored.
    pub backup_directory: PathBuf,

    /// The directory holding one directory per server.
    pub servers_directory: PathBuf,

    /// The JSON file backup records are stored in.
    pub repository_file: PathBuf,

    /// The service's limits.
    pub limits: Limits,

    /// Archive settings.
    pub archive: ArchiveConfig,

    /// Worker pool settings.
    pub workers: WorkerConfig,

    /// Restore point retention.
    pub retention: RetentionConfig,
}

impl Config {
    /// Tries to load a config from a toml file.
    pub fn load_toml(file_path: PathBuf) -> Result<Self, LoadConfigError> {
        if !file_path.exists() {
            return Err(LoadConfigError::NoFile);
        }

        let contents = fs::read_to_string(file_path).map_err(LoadConfigError::Read)?;
        let config = toml::from_str(&contents)?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_directory: PathBuf::from("./backups"),
            servers_directory: PathBuf::from("./servers"),
            repository_file: PathBuf::from("./backups.json"),
            limits: Limits::default(),
            archive: ArchiveConfig::default(),
            workers: WorkerConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("The file does not exist.")]
    NoFile,

    #[error("Failed to read the file:\n{0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to deserialize the file:\n{0}")]
    Deserialize(#[from] toml::de::Error),
}
