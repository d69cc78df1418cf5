use std::{io::Read, path::Path};

use tar::{Entry, EntryType};
use tracing::error;

use crate::{PathError, ResolvedPath, SecurityError, error::display_name, validate_safe_path};

/// The kind of an archive member, as far as extraction cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic or hard link.
    Symlink,
    /// Character, block or fifo special file.
    Device,
    /// Anything else, such as extension headers.
    Other,
}

impl From<EntryType> for MemberKind {
    fn from(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => Self::File,
            EntryType::Directory => Self::Directory,
            EntryType::Symlink | EntryType::Link => Self::Symlink,
            EntryType::Char | EntryType::Block | EntryType::Fifo => Self::Device,
            _ => Self::Other,
        }
    }
}

/// One entry of an archive being validated or extracted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveMember {
    /// The name exactly as stored in the archive.
    pub name: String,

    /// The kind of member.
    pub kind: MemberKind,

    /// Where a link member points.
    pub link_target: Option<String>,

    /// The size declared by the member header.
    pub declared_size: u64,
}

impl ArchiveMember {
    /// Read the member description from a tar entry header.
    pub fn from_entry<R: Read>(entry: &Entry<'_, R>) -> std::io::Result<Self> {
        let header = entry.header();

        Ok(Self {
            name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
            kind: MemberKind::from(header.entry_type()),
            link_target: entry
                .link_name_bytes()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            declared_size: header.size()?,
        })
    }
}

fn reject(member: &ArchiveMember, error: SecurityError) -> PathError {
    error!(
        "Rejected archive member '{}' ({:?}): {error}",
        display_name(&member.name),
        member.kind
    );
    PathError::Security(error)
}

fn is_absolute_name(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }

    // Drive letter, `C:` or `C:\`
    let mut chars = name.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

fn has_parent_segment(name: &str) -> bool {
    name.split(['/', '\\']).any(|segment| segment == "..")
}

/// Check one archive member against the directory it would be extracted into.
///
/// Returns where the member would be written. Has no side effects.
pub fn validate_member(
    member: &ArchiveMember,
    target: &ResolvedPath,
) -> Result<ResolvedPath, PathError> {
    let name = member.name.as_str();

    if name.is_empty() || name.contains('\0') {
        return Err(reject(member, SecurityError::invalid_characters(name)));
    }

    if is_absolute_name(name) {
        return Err(reject(member, SecurityError::path_traversal(name)));
    }

    if has_parent_segment(name) {
        return Err(reject(member, SecurityError::path_traversal(name)));
    }

    match member.kind {
        MemberKind::Symlink => {
            return Err(reject(
                member,
                SecurityError::SymbolicLink(display_name(name)),
            ));
        }
        MemberKind::Device => {
            return Err(reject(member, SecurityError::DeviceFile(display_name(name))));
        }
        MemberKind::File | MemberKind::Directory | MemberKind::Other => {}
    }

    // Second, independent gate against anything the string checks missed.
    validate_safe_path(Path::new(name), target.as_path())
}
