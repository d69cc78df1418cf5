use core::fmt;
use std::{
    ffi::OsString,
    fs, io,
    path::{Component, Path, PathBuf},
};

use tracing::error;

use crate::{PathError, SecurityError, error::display_name};

/// The default maximum length of a [`SafeName`].
pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;

const FORBIDDEN_CHARACTERS: &[char] = &[
    '/', '\\', ':', '*', '?', '"', '<', '>', '|', ';', '\'', ' ', '@', '#', '$', '%', '&', '(',
    ')', '[', ']', '{', '}',
];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// An identifier free of traversal sequences, separators and reserved device names.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SafeName(String);

impl SafeName {
    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the name into its string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SafeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<Path> for SafeName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for SafeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An absolute, canonical path proven to be inside its base directory.
///
/// The only path representation that may reach a filesystem call with externally
/// influenced input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    base: PathBuf,
}

impl ResolvedPath {
    /// The resolved path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// The canonical base directory the path was proven against.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The path relative to its base, empty if the path is the base.
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.base).unwrap_or(Path::new(""))
    }

    /// Consume into the resolved path.
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

fn reject(error: SecurityError) -> SecurityError {
    error!("Rejected unsafe name: {error}");
    error
}

/// Validate an identifier such as a server name or a directory segment.
///
/// Surrounding whitespace is trimmed, the trimmed name is returned unchanged.
pub fn validate_safe_name(name: &str, max_length: usize) -> Result<SafeName, SecurityError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(reject(SecurityError::invalid_characters(name)));
    }

    if name
        .chars()
        .any(|c| FORBIDDEN_CHARACTERS.contains(&c) || c.is_control())
    {
        return Err(reject(SecurityError::invalid_characters(name)));
    }

    // Separators are already forbidden, so any `.` or `..` segment is the whole name.
    if name.chars().all(|c| c == '.') || name.starts_with("..") || name.ends_with("..") {
        return Err(reject(SecurityError::path_traversal(name)));
    }

    if is_reserved_name(name) {
        return Err(reject(SecurityError::ReservedName(name.to_string())));
    }

    let length = name.chars().count();
    if length > max_length {
        return Err(reject(SecurityError::TooLong(length, max_length)));
    }

    Ok(SafeName(name.to_string()))
}

fn is_reserved_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);

    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name) || reserved.eq_ignore_ascii_case(stem))
}

/// Resolve `candidate` and prove it is `base_dir` or a descendant of it.
///
/// Relative candidates are taken relative to `base_dir`. Neither path has to exist,
/// existing ancestors are canonicalized so symlinked directories are followed to
/// where they really point.
pub fn validate_safe_path(candidate: &Path, base_dir: &Path) -> Result<ResolvedPath, PathError> {
    let base = canonicalize_lenient(base_dir).map_err(|source| PathError::Resolve {
        path: base_dir.to_path_buf(),
        source,
    })?;

    let joined = base.join(candidate);
    let path = canonicalize_lenient(&joined).map_err(|source| PathError::Resolve {
        path: joined.clone(),
        source,
    })?;

    if !path.starts_with(&base) {
        let error = SecurityError::path_traversal(&candidate.to_string_lossy());
        error!(
            "Rejected path outside of {base:?}: {error} resolved to '{}'",
            display_name(&path.to_string_lossy())
        );
        return Err(PathError::Security(error));
    }

    Ok(ResolvedPath { path, base })
}

/// Validate a server name and resolve its directory under `base_dir`.
///
/// The directory must be strictly inside `base_dir`, never `base_dir` itself. Does
/// not create the directory.
pub fn create_safe_server_directory(
    name: &str,
    base_dir: &Path,
) -> Result<ResolvedPath, PathError> {
    let safe_name = validate_safe_name(name, DEFAULT_MAX_NAME_LENGTH)?;
    let resolved = validate_safe_path(Path::new(safe_name.as_str()), base_dir)?;

    if resolved.relative().as_os_str().is_empty() {
        let error = SecurityError::path_traversal(name);
        error!("Rejected server directory resolving to its base {base_dir:?}: {error}");
        return Err(PathError::Security(error));
    }

    Ok(resolved)
}

/// Canonicalize a path that may not exist.
///
/// Walks the path one component at a time. While components exist they are
/// canonicalized by the filesystem, which resolves symlinks. Once a component is
/// missing the rest is resolved lexically.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    let mut missing: Vec<OsString> = Vec::new();

    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                resolved.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if missing.pop().is_none() {
                    resolved.pop();
                }
            }
            Component::Normal(name) => {
                if !missing.is_empty() {
                    missing.push(name.to_os_string());
                    continue;
                }

                let next = resolved.join(name);
                match fs::symlink_metadata(&next) {
                    Ok(_) => resolved = fs::canonicalize(&next)?,
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {
                        missing.push(name.to_os_string());
                    }
                    Err(error) => return Err(error),
                }
            }
        }
    }

    resolved.extend(missing);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_matches_canonicalize_for_existing_paths() {
        let directory = tempfile::tempdir().unwrap();
        fs::create_dir(directory.path().join("a")).unwrap();

        let expected = fs::canonicalize(directory.path().join("a")).unwrap();
        let resolved = canonicalize_lenient(&directory.path().join("a/./")).unwrap();

        assert_eq!(resolved, expected);
    }

    #[test]
    fn lenient_resolves_missing_tail() {
        let directory = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(directory.path()).unwrap();

        let resolved =
            canonicalize_lenient(&directory.path().join("missing/deeper/../file.txt")).unwrap();

        assert_eq!(resolved, base.join("missing/file.txt"));
    }

    #[test]
    fn lenient_pops_into_existing_parent() {
        let directory = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(directory.path()).unwrap();
        fs::create_dir(directory.path().join("a")).unwrap();

        let resolved = canonicalize_lenient(&directory.path().join("a/../../escape")).unwrap();

        assert_eq!(resolved, base.parent().unwrap().join("escape"));
    }

    #[test]
    fn reserved_stems() {
        assert!(is_reserved_name("con"));
        assert!(is_reserved_name("Lpt9"));
        assert!(is_reserved_name("nul.txt"));
        assert!(!is_reserved_name("console"));
        assert!(!is_reserved_name("com10"));
    }
}
