//! Persistent per-account backup state
//!
//! One JSON file maps account id to [`BackupState`]. It is read once when
//! a run starts and replaced as a whole when a run succeeds.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{BackupError, Result};
use crate::models::BackupState;

/// Backup state file
#[derive(Debug)]
pub struct BackupStateStore {
    path: PathBuf,
    entries: BTreeMap<String, BackupState>,
}

impl BackupStateStore {
    /// Load the state file at `path`
    ///
    /// A missing file is an empty store. An unparseable file is logged and
    /// also treated as empty, so incremental runs degrade to full ones
    /// instead of skipping messages.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "Ignoring unreadable backup state {}: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(BackupError::io(&path, e)),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, account_id: &str) -> Option<&BackupState> {
        self.entries.get(account_id)
    }

    /// Record the state for an account (in memory until [`save`](Self::save))
    pub fn set(&mut self, account_id: impl Into<String>, state: BackupState) {
        self.entries.insert(account_id.into(), state);
    }

    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Replace the file with the current entries
    ///
    /// Writes to a temporary file and renames it over the old one, so a
    /// crash leaves either the previous or the new state.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| BackupError::Format(format!("cannot encode backup state: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|e| BackupError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| BackupError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupType;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    fn state(ts: &str, count: usize) -> BackupState {
        BackupState::completed(BackupType::Full, ts.parse::<DateTime<Utc>>().unwrap(), count)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = BackupStateStore::load(dir.path().join("none.json")).unwrap();
        assert!(store.get("me").is_none());
        assert_eq!(store.accounts().count(), 0);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/backup_state.json");

        let mut store = BackupStateStore::load(&path).unwrap();
        store.set("alice@example.com", state("2024-03-01T12:00:00Z", 5));
        store.set("bob@example.com", state("2024-03-02T08:00:00Z", 7));
        store.save().unwrap();

        let reloaded = BackupStateStore::load(&path).unwrap();
        assert_eq!(reloaded.get("alice@example.com"), Some(&state("2024-03-01T12:00:00Z", 5)));
        assert_eq!(reloaded.accounts().collect::<Vec<_>>(), vec!["alice@example.com", "bob@example.com"]);

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["bob@example.com"]["last_backup_type"], "full");
        assert_eq!(json["bob@example.com"]["last_backup_time"], "2024-03-02T08:00:00Z");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup_state.json");
        fs::write(&path, r#"{"old@example.com": {"last_backup_time": "2020-01-01T00:00:00Z", "last_backup_type": "full", "message_count": 1}}"#).unwrap();

        let mut store = BackupStateStore::load(&path).unwrap();
        assert!(store.get("old@example.com").is_some());
        store.set("new@example.com", state("2024-01-01T00:00:00Z", 2));
        store.save().unwrap();

        let reloaded = BackupStateStore::load(&path).unwrap();
        assert_eq!(reloaded.accounts().count(), 2);
    }

    #[test]
    fn test_corrupt_file_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup_state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = BackupStateStore::load(&path).unwrap();
        assert!(store.get("me").is_none());
    }
}
