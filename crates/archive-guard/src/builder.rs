use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};
use tar::{Builder, EntryType, Header, HeaderMode};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{ProgressPolicy, TransferBudget};

const BLOCK_SIZE: u64 = 512;

/// Zero bytes needed to round a tar entry of `size` bytes up to the next block.
pub fn tar_padding(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

/// The outcome of streaming a reader into a writer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamedBytes {
    /// Total bytes written.
    pub bytes: u64,
    /// Number of chunks written.
    pub chunks: u64,
}

/// Copy `reader` into `writer` through a single buffer of `chunk_bytes`.
pub fn stream_chunks<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    chunk_bytes: usize,
) -> io::Result<StreamedBytes> {
    let mut buffer = vec![0u8; chunk_bytes.max(1)];
    let mut streamed = StreamedBytes::default();

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(bytes_read) => bytes_read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };

        writer.write_all(buffer.get(..bytes_read).unwrap_or_default())?;

        streamed.bytes += u64::try_from(bytes_read).unwrap_or(u64::MAX);
        streamed.chunks += 1;
    }

    Ok(streamed)
}

/// Options for building archives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Files larger than this are streamed in chunks.
    pub chunk_threshold_bytes: u64,

    /// The chunk size for streamed files.
    pub chunk_bytes: usize,

    /// When to report progress.
    pub progress: ProgressPolicy,

    /// Gzip compression level, `0..=9`.
    pub compression_level: u32,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: 100 * 1024 * 1024, // 100 MiB
            chunk_bytes: 64 * 1024,                   // 64 KiB
            progress: ProgressPolicy::default(),
            compression_level: 6,
        }
    }
}

/// The result of building an archive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Final counters.
    pub budget: TransferBudget,

    /// Files that could not be read and were left out.
    pub skipped: Vec<PathBuf>,

    /// Size of the written archive.
    pub archive_bytes: u64,
}

/// Writes gzipped tar archives of directory trees with bounded memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChunkedArchiveBuilder {
    options: BuilderOptions,
}

impl ChunkedArchiveBuilder {
    /// Create a builder.
    pub fn new(options: BuilderOptions) -> Self {
        Self { options }
    }

    /// The builder's options.
    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Archive `source_dir` into a new gzipped tar at `archive_path`.
    ///
    /// Files that cannot be read are logged and skipped. Failing to write the
    /// archive itself aborts and removes the partial archive.
    pub fn create_archive<P: FnMut(&TransferBudget)>(
        &self,
        source_dir: &Path,
        archive_path: &Path,
        mut progress: P,
    ) -> Result<BuildReport, BuildError> {
        if !fs::metadata(source_dir)
            .map_err(|e| BuildError::Io(e, "read source metadata"))?
            .is_dir()
        {
            return Err(BuildError::NotDirectory(source_dir.to_path_buf()));
        }

        let totals = count_tree(source_dir);
        info!(
            "Archiving {} files, {} bytes from {source_dir:?}",
            totals.total_files, totals.total_bytes
        );

        let result = self.write_archive(source_dir, archive_path, totals, &mut progress);

        if result.is_err() {
            if let Err(error) = fs::remove_file(archive_path) {
                if error.kind() != io::ErrorKind::NotFound {
                    warn!("Could not remove partial archive {archive_path:?}: {error}");
                }
            }
        }

        result
    }

    fn write_archive<P: FnMut(&TransferBudget)>(
        &self,
        source_dir: &Path,
        archive_path: &Path,
        totals: TransferBudget,
        progress: &mut P,
    ) -> Result<BuildReport, BuildError> {
        let file = File::create(archive_path).map_err(|e| BuildError::Io(e, "create archive"))?;
        let encoder = GzEncoder::new(
            BufWriter::new(file),
            Compression::new(self.options.compression_level),
        );
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);

        let mut budget = TransferBudget::with_totals(totals.total_files, totals.total_bytes);
        let mut skipped = Vec::new();

        for entry in WalkDir::new(source_dir)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("Skipping unreadable entry: {error}");
                    if let Some(path) = error.path() {
                        skipped.push(path.to_path_buf());
                    }
                    continue;
                }
            };

            let path = entry.path();
            let Ok(name) = path.strip_prefix(source_dir) else {
                continue;
            };
            let file_type = entry.file_type();

            if file_type.is_dir() {
                builder
                    .append_dir(name, path)
                    .map_err(|e| BuildError::Io(e, "write directory entry"))?;
                continue;
            }

            if !file_type.is_file() {
                warn!("Skipping {path:?}, only regular files and directories are archived");
                continue;
            }

            // Failing to open a source file only skips it.
            let mut file = match File::open(path) {
                Ok(file) => file,
                Err(error) => {
                    warn!("Skipping {path:?}: {error}");
                    skipped.push(path.to_path_buf());
                    budget.record_file(0);
                    continue;
                }
            };
            let size = match file.metadata() {
                Ok(metadata) => metadata.len(),
                Err(error) => {
                    warn!("Skipping {path:?}: {error}");
                    skipped.push(path.to_path_buf());
                    budget.record_file(0);
                    continue;
                }
            };

            if size <= self.options.chunk_threshold_bytes {
                builder
                    .append_file(name, &mut file)
                    .map_err(|e| BuildError::Io(e, "write file entry"))?;
            } else {
                self.append_large_file(&mut builder, name, file)?;
            }

            budget.record_file(size);
            if self.options.progress.should_report(&budget, size) {
                progress(&budget);
            }
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| BuildError::Io(e, "finish archive"))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| BuildError::Io(e, "finish compression"))?;
        writer
            .flush()
            .map_err(|e| BuildError::Io(e, "flush archive"))?;
        drop(writer);

        let archive_bytes = fs::metadata(archive_path)
            .map_err(|e| BuildError::Io(e, "read archive metadata"))?
            .len();

        info!(
            "Archived {} files ({} skipped) into {archive_path:?}, {archive_bytes} bytes",
            budget.files_processed,
            skipped.len()
        );

        Ok(BuildReport {
            budget,
            skipped,
            archive_bytes,
        })
    }

    /// Write the header, stream the body in fixed chunks, then pad to the block size.
    fn append_large_file<W: Write>(
        &self,
        builder: &mut Builder<W>,
        name: &Path,
        file: File,
    ) -> Result<(), BuildError> {
        let metadata = file
            .metadata()
            .map_err(|e| BuildError::Io(e, "read file metadata"))?;
        let size = metadata.len();

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
        header.set_entry_type(EntryType::Regular);
        header.set_size(size);

        let sink = builder.get_mut();

        // Names that do not fit the header go in a GNU long name record first.
        if header.set_path(name).is_err() {
            let name_bytes = entry_name_bytes(name);
            write_long_name(sink, &name_bytes)
                .map_err(|e| BuildError::Io(e, "write long name"))?;

            let field = &mut header.as_old_mut().name;
            field.fill(0);
            for (slot, byte) in field.iter_mut().zip(&name_bytes) {
                *slot = *byte;
            }
        }
        header.set_cksum();

        sink.write_all(header.as_bytes())
            .map_err(|e| BuildError::Io(e, "write header"))?;

        let streamed = stream_chunks(&mut file.take(size), sink, self.options.chunk_bytes)
            .map_err(|e| BuildError::Io(e, "stream file"))?;

        // The header promised `size` bytes, a file that shrank is padded with zeros.
        if streamed.bytes < size {
            warn!(
                "{name:?} shrank while archiving, {} of {size} bytes read",
                streamed.bytes
            );
            io::copy(&mut io::repeat(0).take(size - streamed.bytes), sink)
                .map_err(|e| BuildError::Io(e, "pad shrunk file"))?;
        }

        io::copy(&mut io::repeat(0).take(tar_padding(size)), sink)
            .map_err(|e| BuildError::Io(e, "pad entry"))?;

        debug!(
            "Streamed {name:?} in {} chunks of {} bytes",
            streamed.chunks, self.options.chunk_bytes
        );

        Ok(())
    }
}

/// The `/` separated bytes of a relative entry name.
fn entry_name_bytes(name: &Path) -> Vec<u8> {
    let mut bytes = Vec::new();

    for component in name.components() {
        if !bytes.is_empty() {
            bytes.push(b'/');
        }
        bytes.extend_from_slice(component.as_os_str().as_encoded_bytes());
    }

    bytes
}

/// Write a `././@LongLink` record carrying `name` for the header that follows.
fn write_long_name<W: Write>(sink: &mut W, name: &[u8]) -> io::Result<()> {
    const LONG_LINK: &[u8] = b"././@LongLink";

    // NUL terminated.
    let size = u64::try_from(name.len())
        .unwrap_or(u64::MAX)
        .saturating_add(1);

    let mut header = Header::new_gnu();
    for (slot, byte) in header.as_old_mut().name.iter_mut().zip(LONG_LINK) {
        *slot = *byte;
    }
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(size);
    header.set_entry_type(EntryType::GNULongName);
    header.set_cksum();

    sink.write_all(header.as_bytes())?;
    sink.write_all(name)?;
    sink.write_all(&[0])?;
    io::copy(&mut io::repeat(0).take(tar_padding(size)), sink)?;

    Ok(())
}

/// Count the regular files and their bytes below `source_dir`.
fn count_tree(source_dir: &Path) -> TransferBudget {
    let mut totals = TransferBudget::default();

    for entry in WalkDir::new(source_dir).follow_links(false).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                debug!("Not counting unreadable entry: {error}");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                totals.total_files += 1;
                totals.total_bytes = totals.total_bytes.saturating_add(metadata.len());
            }
            Err(error) => debug!("Not counting {:?}: {error}", entry.path()),
        }
    }

    totals
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Source is not a directory: {0:?}")]
    NotDirectory(PathBuf),

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),
}
