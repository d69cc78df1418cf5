//! # common
//!

use std::{collections::BTreeMap, fs, path::Path};

use walkdir::WalkDir;

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

/// Every regular file below `root`, keyed by its `/` separated relative path.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(Result::unwrap)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            (relative, fs::read(entry.path()).unwrap())
        })
        .collect()
}

/// If `directory` has no entries at all.
pub fn is_empty_directory(directory: &Path) -> bool {
    fs::read_dir(directory).unwrap().next().is_none()
}
