use core::fmt;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
};

use flate2::bufread::GzDecoder;
use tar::{Archive, Entry};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    ArchiveMember, MemberKind, MemoryError, PathError, ProgressPolicy, ResolvedPath,
    ResourceMonitor, SecurityError, TransferBudget, error::display_name, validate_member,
    validate_safe_path,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether the file at `path` starts with the gzip magic bytes.
pub fn is_gzip_file(path: &Path) -> io::Result<bool> {
    let mut reader = BufReader::new(File::open(path)?);
    Ok(reader.fill_buf()?.starts_with(&GZIP_MAGIC))
}

/// Open a tar archive, transparently decompressing it when it is gzipped.
pub fn open_archive(archive_path: &Path) -> io::Result<Archive<Box<dyn Read>>> {
    let file = File::open(archive_path)?;
    let mut reader = BufReader::new(file);

    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    let reader: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    Ok(Archive::new(reader))
}

/// The stage of an extraction, for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExtractState {
    Idle,
    Scanning,
    Extracting,
    Completed,
    Aborted,
}

impl fmt::Display for ExtractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::Extracting => "Extracting",
            Self::Completed => "Completed",
            Self::Aborted => "Aborted",
        };
        write!(f, "[{state}] ")
    }
}

/// Failure writing a single member.
enum WriteError {
    /// Skip the member and continue.
    Io(io::Error),
    /// Abort the extraction.
    Memory(MemoryError),
}

/// Validates and extracts archives from untrusted sources.
///
/// A security violation on any member aborts the whole operation. Ordinary I/O
/// failures while writing one member skip that member.
#[derive(Debug, Clone)]
pub struct SecureArchiveExtractor {
    chunk_bytes: usize,
    progress: ProgressPolicy,
    monitor: Option<ResourceMonitor>,
}

impl Default for SecureArchiveExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureArchiveExtractor {
    /// An extractor writing members in 64 KiB chunks.
    pub fn new() -> Self {
        Self {
            chunk_bytes: 64 * 1024,
            progress: ProgressPolicy::default(),
            monitor: None,
        }
    }

    /// Poll `monitor` between members and chunks.
    pub fn with_monitor(mut self, monitor: ResourceMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Use `progress` to decide when to report progress.
    pub fn with_progress_policy(mut self, progress: ProgressPolicy) -> Self {
        self.progress = progress;
        self
    }

    /// Validate every member of an archive before anything is extracted from it.
    ///
    /// Members are resolved against an empty scratch directory. Returns the member
    /// count and total declared size.
    pub fn validate_archive_safety(
        &self,
        archive_path: &Path,
    ) -> Result<TransferBudget, ExtractError> {
        let scratch = tempfile::tempdir().map_err(|e| ExtractError::Io(e, "create scratch"))?;
        let target = validate_safe_path(Path::new(""), scratch.path())?;

        self.scan(archive_path, &target)
    }

    /// Validate every member of an archive against the directory it will be
    /// extracted into.
    pub fn validate_archive_against(
        &self,
        archive_path: &Path,
        target: &ResolvedPath,
    ) -> Result<TransferBudget, ExtractError> {
        self.scan(archive_path, target)
    }

    /// Extract an archive into `target_dir`, creating it if needed.
    ///
    /// The whole archive is scanned first, then every member is validated again as it
    /// is written.
    pub fn safe_extract<P: FnMut(&TransferBudget)>(
        &self,
        archive_path: &Path,
        target_dir: &Path,
        mut progress: P,
    ) -> Result<TransferBudget, ExtractError> {
        let mut state = ExtractState::Idle;
        info!("{state}Extracting {archive_path:?} into {target_dir:?}");

        fs::create_dir_all(target_dir).map_err(|e| ExtractError::Io(e, "create target"))?;
        let target = validate_safe_path(Path::new(""), target_dir)?;

        state = ExtractState::Scanning;
        info!("{state}Validating every member");
        let totals = self.scan(archive_path, &target).inspect_err(|e| {
            error!("{}{e}", ExtractState::Aborted);
        })?;

        state = ExtractState::Extracting;
        info!(
            "{state}{} members, {} bytes",
            totals.total_files, totals.total_bytes
        );

        let budget = self
            .extract_members(archive_path, &target, totals, &mut progress)
            .inspect_err(|e| {
                error!("{}{e}", ExtractState::Aborted);
            })?;

        state = ExtractState::Completed;
        info!(
            "{state}Wrote {} of {} members",
            budget.files_processed, budget.total_files
        );

        Ok(budget)
    }

    fn check_memory(&self) -> Result<(), MemoryError> {
        match &self.monitor {
            Some(monitor) => monitor.check_memory_usage().map(|_| ()),
            None => Ok(()),
        }
    }

    fn scan(
        &self,
        archive_path: &Path,
        target: &ResolvedPath,
    ) -> Result<TransferBudget, ExtractError> {
        let mut archive = open_archive(archive_path).map_err(ExtractError::OpenArchive)?;
        let mut totals = TransferBudget::default();

        for entry in archive.entries().map_err(ExtractError::ReadArchive)? {
            self.check_memory()?;

            let entry = entry.map_err(ExtractError::ReadArchive)?;
            let member = ArchiveMember::from_entry(&entry).map_err(ExtractError::ReadArchive)?;

            validate_member(&member, target)?;

            totals.total_files += 1;
            totals.total_bytes = totals.total_bytes.saturating_add(member.declared_size);
        }

        Ok(totals)
    }

    fn extract_members<P: FnMut(&TransferBudget)>(
        &self,
        archive_path: &Path,
        target: &ResolvedPath,
        totals: TransferBudget,
        progress: &mut P,
    ) -> Result<TransferBudget, ExtractError> {
        let mut archive = open_archive(archive_path).map_err(ExtractError::OpenArchive)?;
        let mut budget = TransferBudget::with_totals(totals.total_files, totals.total_bytes);

        for entry in archive.entries().map_err(ExtractError::ReadArchive)? {
            self.check_memory()?;

            let mut entry = entry.map_err(ExtractError::ReadArchive)?;
            let member = ArchiveMember::from_entry(&entry).map_err(ExtractError::ReadArchive)?;

            // The archive may have changed since the scan, never trust it.
            let destination = validate_member(&member, target)?;

            match member.kind {
                MemberKind::Directory => {
                    if let Err(error) = fs::create_dir_all(destination.as_path()) {
                        warn!(
                            "Skipping directory '{}': {error}",
                            display_name(&member.name)
                        );
                    }
                }

                MemberKind::File => match self.write_file(&mut entry, &destination) {
                    Ok(_) => {}
                    Err(WriteError::Memory(error)) => return Err(ExtractError::Memory(error)),
                    Err(WriteError::Io(error)) => {
                        warn!("Skipping file '{}': {error}", display_name(&member.name));

                        if let Err(error) = fs::remove_file(destination.as_path()) {
                            if error.kind() != io::ErrorKind::NotFound {
                                warn!("Could not remove partial file {destination:?}: {error}");
                            }
                        }
                    }
                },

                // Links and devices were rejected by `validate_member`.
                MemberKind::Symlink | MemberKind::Device | MemberKind::Other => {
                    warn!(
                        "Skipping unsupported member '{}' ({:?})",
                        display_name(&member.name),
                        member.kind
                    );
                }
            }

            budget.record_file(member.declared_size);
            if self.progress.should_report(&budget, member.declared_size) {
                progress(&budget);
            }
        }

        Ok(budget)
    }

    fn write_file<R: Read>(
        &self,
        entry: &mut Entry<'_, R>,
        destination: &ResolvedPath,
    ) -> Result<u64, WriteError> {
        if let Some(parent) = destination.as_path().parent() {
            fs::create_dir_all(parent).map_err(WriteError::Io)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(destination.as_path())
            .map_err(WriteError::Io)?;

        let mut buffer = vec![0u8; self.chunk_bytes];
        let mut written: u64 = 0;

        loop {
            self.check_memory().map_err(WriteError::Memory)?;

            let bytes_read = match entry.read(&mut buffer) {
                Ok(0) => break,
                Ok(bytes_read) => bytes_read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(WriteError::Io(error)),
            };

            let chunk = buffer.get(..bytes_read).unwrap_or_default();
            file.write_all(chunk).map_err(WriteError::Io)?;
            written += u64::try_from(bytes_read).unwrap_or(u64::MAX);
        }

        file.flush().map_err(WriteError::Io)?;
        Ok(written)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Archive rejected: {0}")]
    Security(#[from] SecurityError),

    #[error("Failed to resolve '{path}': {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open archive: {0}")]
    OpenArchive(#[source] io::Error),

    #[error("Failed to read archive: {0}")]
    ReadArchive(#[source] io::Error),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),
}

impl ExtractError {
    /// The security violation, if this error is one.
    pub fn security(&self) -> Option<&SecurityError> {
        match self {
            Self::Security(error) => Some(error),
            _ => None,
        }
    }
}

impl From<PathError> for ExtractError {
    fn from(error: PathError) -> Self {
        match error {
            PathError::Security(error) => Self::Security(error),
            PathError::Resolve { path, source } => Self::Resolve { path, source },
        }
    }
}
