use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{error, info, warn};

use crate::Context;

/// The directory next to the servers that holds every server's restore points.
///
/// `@` is never part of a server id, so no server can resolve to it.
pub const RESTORE_POINT_DIRECTORY: &str = "@restore-points";

const RESTORE_POINT_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LENGTH: usize = 15;

/// The directory holding the restore points of the server at `server_root`.
///
/// `<servers>/@restore-points/<server>`
pub fn restore_point_directory(server_root: &Path) -> Option<PathBuf> {
    let server_name = server_root.file_name()?;
    let servers_directory = server_root.parent()?;

    Some(
        servers_directory
            .join(RESTORE_POINT_DIRECTORY)
            .join(server_name),
    )
}

/// A free path to move `server_root` to before a restore.
///
/// `<YYYYMMDD_HHMMSS>` inside the server's restore point directory, with a counter
/// appended when a restore point from the same second exists.
pub fn restore_point_path(server_root: &Path, now: DateTime<Utc>) -> Option<PathBuf> {
    let directory = restore_point_directory(server_root)?;
    let timestamp = now.format(RESTORE_POINT_FORMAT).to_string();

    let mut candidate = directory.join(&timestamp);
    let mut counter: u32 = 0;
    while candidate.exists() {
        counter += 1;
        candidate = directory.join(format!("{timestamp}_{counter}"));
    }

    Some(candidate)
}

/// The age of a restore point from its name, `YYYYMMDD_HHMMSS` optionally followed
/// by `_<counter>`.
fn parse_restore_point(name: &str) -> Option<(NaiveDateTime, u32)> {
    let timestamp = name.get(..TIMESTAMP_LENGTH)?;
    let rest = name.get(TIMESTAMP_LENGTH..)?;

    if !timestamp.chars().all(|c| c.is_ascii_digit() || c == '_') {
        return None;
    }
    let timestamp = NaiveDateTime::parse_from_str(timestamp, RESTORE_POINT_FORMAT).ok()?;

    let counter = if rest.is_empty() {
        0
    } else {
        let digits = rest.strip_prefix('_')?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()?
    };

    Some((timestamp, counter))
}

/// Remove the oldest restore points of a server over the limit.
pub fn cleanup_restore_points(context: &mut Context, server_root: &Path, maximum: usize) {
    context.current_context = "Cleanup";

    let Some(directory_path) = restore_point_directory(server_root) else {
        warn!("{context}Server directory has no name: {server_root:?}");
        return;
    };

    let directory = match fs::read_dir(&directory_path) {
        Ok(directory) => directory,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                error!("{context}Could not read restore points {directory_path:?}: {error}");
            }
            return;
        }
    };

    // Every restore point of this server that can be accessed.
    let mut restore_points: Vec<((NaiveDateTime, u32), String, PathBuf)> = directory
        .filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("{context}Could not read entry: {error}");
                    return None;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(age) = parse_restore_point(&name) else {
                warn!("{context}Ignoring unexpected entry '{name}' in {directory_path:?}");
                return None;
            };

            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => Some((age, name, entry.path())),
                Ok(_) => None,
                Err(error) => {
                    warn!("{context}Could not get entry '{name}' type: {error}");
                    None
                }
            }
        })
        .collect();

    // Oldest first.
    restore_points.sort_by(|a, b| a.0.cmp(&b.0));

    if restore_points.len() <= maximum {
        return;
    }

    let excess = restore_points.len() - maximum;
    for (_, name, path) in restore_points.iter().take(excess) {
        match fs::remove_dir_all(path) {
            Ok(()) => info!("{context}Removed restore point {name}"),
            Err(e) => error!("{context}Could not remove restore point {path:?}: {e}"),
        }
    }
}
