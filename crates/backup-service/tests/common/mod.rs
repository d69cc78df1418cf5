//! # common
//!

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use backup_service::{
    BackupOrchestrator, BackupRepository, Config, DirectoryProvider, FsDirectoryProvider,
    JsonBackupRepository,
};
use tempfile::TempDir;

/// An orchestrator working in its own temporary directory.
pub struct TestService {
    pub directory: TempDir,
    pub config: Config,
    pub repository: Arc<JsonBackupRepository>,
    pub orchestrator: Arc<BackupOrchestrator>,
}

impl TestService {
    /// The directory of server `name`.
    pub fn server(&self, name: &str) -> PathBuf {
        self.config.servers_directory.join(name)
    }

    /// The entry names of the servers directory, sorted.
    pub fn servers_directory_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.config.servers_directory)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn test_config(root: &Path) -> Config {
    Config {
        backup_directory: root.join("backups"),
        servers_directory: root.join("servers"),
        repository_file: root.join("backups.json"),
        ..Config::default()
    }
}

pub fn test_service() -> TestService {
    let directory = tempfile::tempdir().unwrap();
    let config = test_config(directory.path());
    let directories = Arc::new(FsDirectoryProvider::new(&config.servers_directory));

    test_service_with(directory, config, directories)
}

pub fn test_service_with(
    directory: TempDir,
    config: Config,
    directories: Arc<dyn DirectoryProvider>,
) -> TestService {
    fs::create_dir_all(&config.servers_directory).unwrap();

    let repository =
        Arc::new(JsonBackupRepository::load_or_create_file(&config.repository_file).unwrap());
    let port: Arc<dyn BackupRepository> = Arc::<JsonBackupRepository>::clone(&repository);
    let orchestrator = Arc::new(BackupOrchestrator::new(config.clone(), directories, port));

    TestService {
        directory,
        config,
        repository,
        orchestrator,
    }
}

/// Write `files` below `root`, creating parent directories.
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (name, contents) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
}

/// A small server directory.
pub fn write_server(root: &Path) {
    write_tree(
        root,
        &[
            ("server.properties", b"motd=hello"),
            ("world/level.dat", &[1u8; 2048]),
            ("world/region/r.0.0.mca", &[2u8; 9000]),
        ],
    );
}

/// Every regular file below `root`, keyed by its `/` separated relative path.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(directory) = pending.pop() {
        for entry in fs::read_dir(&directory).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }

            let relative = path
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(relative, fs::read(&path).unwrap());
        }
    }

    files
}
