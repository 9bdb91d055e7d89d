//! Backup state tracking for incremental backups

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Incremental,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Incremental => "incremental",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(BackupType::Full),
            "incremental" => Ok(BackupType::Incremental),
            other => Err(format!("unknown backup type: {}", other)),
        }
    }
}

/// Last successful backup of one account
///
/// Only written after a run succeeds, so a failed or partial run never
/// advances `last_backup_time` and a retried incremental run cannot skip
/// messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupState {
    /// Start time of the last successful run
    pub last_backup_time: DateTime<Utc>,
    pub last_backup_type: BackupType,
    /// Messages written by that run
    pub message_count: usize,
}

impl BackupState {
    /// State recorded for a run that started at `started_at`
    pub fn completed(backup_type: BackupType, started_at: DateTime<Utc>, message_count: usize) -> Self {
        Self {
            last_backup_time: started_at,
            last_backup_type: backup_type,
            message_count,
        }
    }
}
