use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// How a backup came to exist.
#[derive(Hash, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// Requested by a user, or uploaded from outside.
    Manual,

    /// Created by a schedule.
    Scheduled,
}

impl BackupType {
    /// The lowercase name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

impl FromStr for BackupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            _ => Err(format!("invalid backup type '{s}'")),
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle status of a backup.
///
/// A backup starts as `Creating` and moves to `Completed` or `Failed` exactly once.
#[derive(Hash, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    /// The archive is being written.
    Creating,

    /// The archive was written and can be restored.
    Completed,

    /// The archive could not be written.
    Failed,
}

impl BackupStatus {
    /// The lowercase name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// If the status can no longer change.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Creating)
    }
}

impl FromStr for BackupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid backup status '{s}'")),
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
