//! Pruning of old backup archives

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

/// How many backup archives to keep
///
/// A zero value disables the corresponding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Archives modified more than this many days ago are removed
    pub keep_days: u32,
    /// The newest archives that survive the count rule
    pub keep_count: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_days: 30,
            keep_count: 10,
        }
    }
}

/// Outcome of a prune pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    /// Archives removed (or that would be removed on a dry run), oldest first
    pub removed: Vec<PathBuf>,
    pub bytes_freed: u64,
    /// Archives left in place
    pub kept: usize,
    pub dry_run: bool,
}

struct Archive {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// Remove backup archives in `folder` that fall outside `policy`
///
/// Only `*.mbox` files directly inside `folder` are considered. A file is
/// removed when it is older than `keep_days` or not among the newest
/// `keep_count`. With `dry_run` nothing is deleted.
pub fn prune_backups(folder: &Path, policy: &RetentionPolicy, dry_run: bool) -> Result<PruneReport> {
    let mut report = PruneReport {
        dry_run,
        ..PruneReport::default()
    };
    if !folder.exists() {
        return Ok(report);
    }

    let mut archives = list_archives(folder)?;
    archives.sort_by_key(|a| a.modified);

    let cutoff = (policy.keep_days > 0)
        .then(|| SystemTime::now().checked_sub(Duration::from_secs(u64::from(policy.keep_days) * 86_400)))
        .flatten();
    let over_count = if policy.keep_count > 0 {
        archives.len().saturating_sub(policy.keep_count)
    } else {
        0
    };

    for (index, archive) in archives.into_iter().enumerate() {
        let expired = cutoff.is_some_and(|cutoff| archive.modified < cutoff);
        if !expired && index >= over_count {
            report.kept += 1;
            continue;
        }

        if dry_run {
            info!("Would remove backup {} ({} bytes)", archive.path.display(), archive.size);
        } else {
            fs::remove_file(&archive.path)
                .with_context(|| format!("Failed to remove backup {}", archive.path.display()))?;
            info!("Removed backup {} ({} bytes)", archive.path.display(), archive.size);
        }
        report.bytes_freed += archive.size;
        report.removed.push(archive.path);
    }

    info!(
        "Retention pass on {}: {} removed, {} kept, {} bytes freed{}",
        folder.display(),
        report.removed.len(),
        report.kept,
        report.bytes_freed,
        if dry_run { " (dry run)" } else { "" }
    );
    Ok(report)
}

fn list_archives(folder: &Path) -> Result<Vec<Archive>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("Failed to read backup folder {}", folder.display()))?;

    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read backup folder {}", folder.display()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("mbox") {
            continue;
        }
        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .with_context(|| format!("No modification time for {}", path.display()))?;
        archives.push(Archive {
            path,
            modified,
            size: metadata.len(),
        });
    }
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn archive(dir: &Path, name: &str, age_days: u64, size: usize) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![b'x'; size]).unwrap();
        let modified = SystemTime::now() - Duration::from_secs(age_days * 86_400 + 60);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
        path
    }

    #[test]
    fn test_missing_folder_is_empty_report() {
        let dir = TempDir::new().unwrap();
        let report = prune_backups(&dir.path().join("nope"), &RetentionPolicy::default(), false).unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.kept, 0);
    }

    #[test]
    fn test_removes_expired_archives() {
        let dir = TempDir::new().unwrap();
        let old = archive(dir.path(), "gmail_backup_full_old.mbox", 40, 10);
        let recent = archive(dir.path(), "gmail_backup_full_new.mbox", 1, 20);

        let policy = RetentionPolicy { keep_days: 30, keep_count: 0 };
        let report = prune_backups(dir.path(), &policy, false).unwrap();

        assert_eq!(report.removed, vec![old.clone()]);
        assert_eq!(report.bytes_freed, 10);
        assert_eq!(report.kept, 1);
        assert!(!old.exists());
        assert!(recent.exists());
    }

    #[test]
    fn test_keeps_newest_by_count() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| archive(dir.path(), &format!("b{}.mbox", i), 5 - i as u64, 1))
            .collect();

        let policy = RetentionPolicy { keep_days: 0, keep_count: 2 };
        let report = prune_backups(dir.path(), &policy, false).unwrap();

        assert_eq!(report.removed, paths[..3].to_vec());
        assert_eq!(report.kept, 2);
        assert!(paths[3].exists() && paths[4].exists());
    }

    #[test]
    fn test_dry_run_deletes_nothing() {
        let dir = TempDir::new().unwrap();
        let old = archive(dir.path(), "old.mbox", 90, 7);

        let report = prune_backups(dir.path(), &RetentionPolicy::default(), true).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.removed, vec![old.clone()]);
        assert_eq!(report.bytes_freed, 7);
        assert!(old.exists());
    }

    #[test]
    fn test_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("backup_state.json");
        fs::write(&state, "{}").unwrap();
        archive(dir.path(), "notes.txt", 90, 3);

        let report = prune_backups(dir.path(), &RetentionPolicy::default(), false).unwrap();
        assert!(report.removed.is_empty());
        assert!(state.exists());
    }
}
