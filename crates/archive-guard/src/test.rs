//! # test
//! Builders for hand crafted, possibly hostile, archives.
//!

use std::{fs, io, path::Path};

use flate2::{Compression, write::GzEncoder};
use tar::{Builder, EntryType, Header};

/// One raw archive entry.
#[derive(Clone, Debug)]
struct FixtureEntry {
    name: Vec<u8>,
    entry_type: EntryType,
    link_name: Vec<u8>,
    data: Vec<u8>,
}

/// Builds tar archives with names written byte for byte into the header.
///
/// The `tar` builder refuses traversal and absolute names, this one does not.
#[derive(Clone, Debug, Default)]
pub struct TarFixture {
    entries: Vec<FixtureEntry>,
}

impl TarFixture {
    /// An empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &str, entry_type: EntryType, link_name: &str, data: &[u8]) -> Self {
        self.entries.push(FixtureEntry {
            name: name.as_bytes().to_vec(),
            entry_type,
            link_name: link_name.as_bytes().to_vec(),
            data: data.to_vec(),
        });
        self
    }

    /// Add a regular file.
    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.push(name, EntryType::Regular, "", data)
    }

    /// Add a directory.
    pub fn directory(self, name: &str) -> Self {
        self.push(name, EntryType::Directory, "", &[])
    }

    /// Add a symbolic link.
    pub fn symlink(self, name: &str, target: &str) -> Self {
        self.push(name, EntryType::Symlink, target, &[])
    }

    /// Add a hard link.
    pub fn hard_link(self, name: &str, target: &str) -> Self {
        self.push(name, EntryType::Link, target, &[])
    }

    /// Add a character device.
    pub fn char_device(self, name: &str) -> Self {
        self.push(name, EntryType::Char, "", &[])
    }

    /// Add a named pipe.
    pub fn fifo(self, name: &str) -> Self {
        self.push(name, EntryType::Fifo, "", &[])
    }

    /// The uncompressed archive.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());

        for entry in &self.entries {
            let mut header = Header::new_gnu();
            header.set_entry_type(entry.entry_type);
            header.set_mode(if entry.entry_type == EntryType::Directory {
                0o755
            } else {
                0o644
            });
            header.set_size(u64::try_from(entry.data.len()).unwrap());
            header.set_mtime(0);

            {
                let old = header.as_old_mut();
                assert!(entry.name.len() < old.name.len(), "fixture name too long");
                assert!(entry.link_name.len() < old.linkname.len());

                for (slot, byte) in old.name.iter_mut().zip(&entry.name) {
                    *slot = *byte;
                }
                for (slot, byte) in old.linkname.iter_mut().zip(&entry.link_name) {
                    *slot = *byte;
                }
            }

            header.set_cksum();
            builder.append(&header, entry.data.as_slice()).unwrap();
        }

        builder.into_inner().unwrap()
    }

    /// Write the archive uncompressed to `path`.
    pub fn write_tar(self, path: &Path) -> io::Result<()> {
        fs::write(path, self.into_bytes())
    }

    /// Write the archive gzipped to `path`.
    pub fn write_tar_gz(self, path: &Path) -> io::Result<()> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        io::Write::write_all(&mut encoder, &self.into_bytes())?;
        fs::write(path, encoder.finish()?)
    }
}
