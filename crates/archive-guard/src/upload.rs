use std::{
    fs,
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    ExtractError, FileOperationError, MemoryError, ResourceMonitor, SecureArchiveExtractor,
    SecurityError, TransferBudget, is_gzip_file, open_archive,
};

const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".tar"];

/// An inbound file being uploaded.
pub trait UploadSource {
    /// The client supplied file name.
    fn file_name(&self) -> &str;

    /// The client supplied size, if any. Never trusted on its own.
    fn declared_size(&self) -> Option<u64>;

    /// Read the next bytes of the body, `0` at the end.
    fn read_chunk(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
}

/// An upload backed by any reader.
#[derive(Debug)]
pub struct ReaderUpload<R> {
    file_name: String,
    declared_size: Option<u64>,
    reader: R,
}

impl<R: Read> ReaderUpload<R> {
    /// Create an upload.
    pub fn new(file_name: impl Into<String>, declared_size: Option<u64>, reader: R) -> Self {
        Self {
            file_name: file_name.into(),
            declared_size,
            reader,
        }
    }
}

impl<R: Read> UploadSource for ReaderUpload<R> {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    fn read_chunk(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buffer)
    }
}

/// Limits applied to uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadLimits {
    /// Hard ceiling on the body size.
    pub maximum_bytes: u64,

    /// Bytes read per chunk.
    pub chunk_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            maximum_bytes: 500 * 1024 * 1024, // 500 MiB
            chunk_bytes: 8 * 1024,            // 8 KiB
        }
    }
}

/// Reads an upload in chunks and fails the moment it grows past the ceiling.
///
/// Yields each chunk once, the sequence ends after the body or the first error.
#[derive(Debug)]
pub struct BoundedUploadReader<S> {
    source: S,
    limits: UploadLimits,
    buffer: Vec<u8>,
    bytes_read: u64,
    finished: bool,
}

impl<S: UploadSource> BoundedUploadReader<S> {
    /// Wrap an upload, rejecting it before any body byte is read if its name or
    /// declared size already disqualify it.
    pub fn new(source: S, limits: UploadLimits) -> Result<Self, FileOperationError> {
        let file_name = source.file_name().to_ascii_lowercase();
        if !ARCHIVE_EXTENSIONS
            .iter()
            .any(|extension| file_name.ends_with(extension))
        {
            warn!("Rejecting upload '{}': unsupported file name", source.file_name());
            return Err(FileOperationError::UnsupportedFormat(
                source.file_name().to_string(),
            ));
        }

        if let Some(declared_size) = source.declared_size() {
            if declared_size > limits.maximum_bytes {
                warn!(
                    "Rejecting upload '{}': declared {declared_size} > {} bytes",
                    source.file_name(),
                    limits.maximum_bytes
                );
                return Err(FileOperationError::SizeExceeded(
                    limits.maximum_bytes,
                    declared_size,
                ));
            }
        }

        Ok(Self {
            source,
            limits,
            buffer: vec![0u8; limits.chunk_bytes.max(1)],
            bytes_read: 0,
            finished: false,
        })
    }

    /// Bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The upload's file name.
    pub fn file_name(&self) -> &str {
        self.source.file_name()
    }

    /// Write the whole body to `writer`, polling `monitor` and reporting progress
    /// once per chunk.
    pub fn ingest_to<W: Write, P: FnMut(&TransferBudget)>(
        mut self,
        writer: &mut W,
        monitor: Option<&ResourceMonitor>,
        mut progress: P,
    ) -> Result<u64, UploadError> {
        let mut budget = TransferBudget::with_totals(1, self.source.declared_size().unwrap_or(0));

        while let Some(chunk) = self.next() {
            let chunk = chunk?;

            if let Some(monitor) = monitor {
                monitor.check_memory_usage()?;
            }

            writer
                .write_all(&chunk)
                .map_err(|e| UploadError::Io(e, "write upload"))?;

            budget.bytes_processed = self.bytes_read;
            progress(&budget);
        }

        budget.record_file(0);
        progress(&budget);

        Ok(self.bytes_read)
    }
}

impl<S: UploadSource> Iterator for BoundedUploadReader<S> {
    type Item = Result<Vec<u8>, UploadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let bytes_read = loop {
            match self.source.read_chunk(&mut self.buffer) {
                Ok(bytes_read) => break bytes_read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    self.finished = true;
                    return Some(Err(UploadError::Io(error, "read upload")));
                }
            }
        };

        if bytes_read == 0 {
            self.finished = true;
            return None;
        }

        self.bytes_read = self
            .bytes_read
            .saturating_add(u64::try_from(bytes_read).unwrap_or(u64::MAX));

        if self.bytes_read > self.limits.maximum_bytes {
            self.finished = true;
            warn!(
                "Aborting upload '{}': {} > {} bytes",
                self.source.file_name(),
                self.bytes_read,
                self.limits.maximum_bytes
            );
            return Some(Err(UploadError::FileOperation(
                FileOperationError::SizeExceeded(self.limits.maximum_bytes, self.bytes_read),
            )));
        }

        let chunk = self.buffer.get(..bytes_read).unwrap_or_default();
        Some(Ok(chunk.to_vec()))
    }
}

/// Check that a file is a readable archive, by listing every entry.
pub fn check_archive_format(archive_path: &Path) -> Result<u64, UploadError> {
    let length = fs::metadata(archive_path)
        .map_err(|e| UploadError::Io(e, "read upload metadata"))?
        .len();
    if length == 0 {
        return Err(UploadError::InvalidFormat("the file is empty".to_string()));
    }

    let mut archive =
        open_archive(archive_path).map_err(|e| UploadError::InvalidFormat(e.to_string()))?;
    let entries = archive
        .entries()
        .map_err(|e| UploadError::InvalidFormat(e.to_string()))?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| UploadError::InvalidFormat(e.to_string()))?;
        entry
            .header()
            .size()
            .map_err(|e| UploadError::InvalidFormat(e.to_string()))?;
        count += 1;
    }

    Ok(count)
}

/// An upload that passed every check and waits in a temporary file.
///
/// Dropping it deletes the file.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,

    /// Bytes received.
    pub bytes: u64,

    /// Member count and total declared size.
    pub members: TransferBudget,

    /// Whether the body is gzip compressed, whatever its name claims.
    pub compressed: bool,
}

impl StagedUpload {
    /// Where the upload currently is.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Move the upload to its final location.
    pub fn persist(self, destination: &Path) -> Result<(), UploadError> {
        self.file
            .persist(destination)
            .map_err(|e| UploadError::Io(e.error, "persist upload"))?;
        Ok(())
    }
}

/// Receive an upload into `staging_directory` and run every check on it.
///
/// The temporary file is removed on every failure.
pub fn receive_upload<S: UploadSource, P: FnMut(&TransferBudget)>(
    source: S,
    limits: UploadLimits,
    staging_directory: &Path,
    extractor: &SecureArchiveExtractor,
    monitor: Option<&ResourceMonitor>,
    progress: P,
) -> Result<StagedUpload, UploadError> {
    let reader = BoundedUploadReader::new(source, limits)?;
    let file_name = reader.file_name().to_string();

    fs::create_dir_all(staging_directory)
        .map_err(|e| UploadError::Io(e, "create staging directory"))?;
    let mut file = NamedTempFile::new_in(staging_directory)
        .map_err(|e| UploadError::Io(e, "create staging file"))?;

    let bytes = {
        let mut writer = BufWriter::new(file.as_file_mut());
        let bytes = reader.ingest_to(&mut writer, monitor, progress)?;
        writer
            .flush()
            .map_err(|e| UploadError::Io(e, "flush upload"))?;
        bytes
    };
    info!("Received upload '{file_name}', {bytes} bytes");

    check_archive_format(file.path())?;
    let members = extractor.validate_archive_safety(file.path())?;
    let compressed =
        is_gzip_file(file.path()).map_err(|e| UploadError::Io(e, "read upload format"))?;

    info!(
        "Upload '{file_name}' passed validation, {} members",
        members.total_files
    );

    Ok(StagedUpload {
        file,
        bytes,
        members,
        compressed,
    })
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    FileOperation(#[from] FileOperationError),

    #[error("Upload is not a valid archive: {0}")]
    InvalidFormat(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),
}

impl UploadError {
    /// The security violation, if this error is one.
    pub fn security(&self) -> Option<&SecurityError> {
        match self {
            Self::Extract(error) => error.security(),
            _ => None,
        }
    }
}
