use std::{
    fs,
    path::{Path, PathBuf},
};

use archive_guard::create_safe_server_directory;
use shared::ServerId;
use tracing::debug;

use crate::{DirectoryError, DirectoryProvider, ServerDirectory};

/// The file whose presence in a server's directory marks the server as running.
pub const RUNNING_MARKER: &str = ".running";

/// Servers are the directories of one base directory.
#[derive(Clone, Debug)]
pub struct FsDirectoryProvider {
    servers_directory: PathBuf,
}

impl FsDirectoryProvider {
    /// Servers live in `servers_directory`.
    pub fn new(servers_directory: impl Into<PathBuf>) -> Self {
        Self {
            servers_directory: servers_directory.into(),
        }
    }

    /// The directory servers live in.
    pub fn servers_directory(&self) -> &Path {
        &self.servers_directory
    }
}

impl DirectoryProvider for FsDirectoryProvider {
    fn server_directory(&self, server_id: &ServerId) -> Result<ServerDirectory, DirectoryError> {
        let root = create_safe_server_directory(server_id.as_str(), &self.servers_directory)?;

        match fs::metadata(root.as_path()) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(DirectoryError::NotFound(server_id.clone())),
            Err(error) => {
                debug!("Server directory {root:?} is unavailable: {error}");
                return Err(DirectoryError::NotFound(server_id.clone()));
            }
        }

        let running = root.as_path().join(RUNNING_MARKER).exists();

        Ok(ServerDirectory {
            root: root.into_path_buf(),
            running,
        })
    }
}
