//! Configuration loading for backup runs
//!
//! Settings are read (in order of priority) from:
//! 1. Environment variables (`MAILVAULT_*`)
//! 2. JSON file (~/.config/mailvault/mailvault.json)
//! 3. Built-in defaults

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::RetentionPolicy;
use crate::models::BackupType;
use crate::pacing::{RateGovernor, RetryPolicy};

/// Settings filename in the mailvault config directory
pub const CONFIG_FILE: &str = "mailvault.json";

const MAX_RETRY_MULTIPLIER: f64 = 10.0;
const MAX_RETRY_BASE_DELAY_MS: u64 = 60_000;
const MAX_RETRY_ATTEMPTS: u32 = 10;

const ENV_BACKUP_FOLDER: &str = "MAILVAULT_BACKUP_FOLDER";
const ENV_EXPORT_FOLDER: &str = "MAILVAULT_EXPORT_FOLDER";
const ENV_MAX_MESSAGES: &str = "MAILVAULT_MAX_MESSAGES";
const ENV_QUOTA_PER_SECOND: &str = "MAILVAULT_QUOTA_PER_SECOND";

/// Settings for backup and export runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Where backup archives and the state file are written
    pub backup_folder: PathBuf,
    /// Where exports are written when no explicit path is given
    pub export_folder: PathBuf,
    /// State file override (default: `<backup_folder>/backup_state.json`)
    pub state_file: Option<PathBuf>,
    /// Message cap for full backups when the caller passes none
    pub max_messages_full: usize,
    /// Message cap for incremental backups when the caller passes none
    pub max_messages_incremental: usize,
    /// Identifiers retrieved per batch
    pub batch_size: usize,
    /// Sustained quota units per second
    pub quota_per_second: f64,
    /// Quota units available at once
    pub burst: f64,
    pub retry_base_delay_ms: u64,
    pub retry_multiplier: f64,
    /// Attempts per call including the first one
    pub retry_max_attempts: u32,
    /// Backups older than this many days are pruned
    pub retention_keep_days: u32,
    /// Newest backups always kept
    pub retention_keep_count: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        let data_dir = config::data_dir().unwrap_or_else(|| PathBuf::from(".mailvault"));
        Self {
            backup_folder: data_dir.join("backups").join("gmail"),
            export_folder: data_dir.join("exports").join("gmail"),
            state_file: None,
            max_messages_full: 10_000,
            max_messages_incremental: 1_000,
            batch_size: 100,
            quota_per_second: 250.0,
            burst: 250.0,
            retry_base_delay_ms: 500,
            retry_multiplier: 2.0,
            retry_max_attempts: 3,
            retention_keep_days: 30,
            retention_keep_count: 10,
        }
    }
}

impl BackupConfig {
    /// Load settings from the config file (if present) and the environment
    pub fn load() -> Result<Self> {
        let mut cfg = if config::config_exists(CONFIG_FILE) {
            config::load_json::<Self>(CONFIG_FILE)?
        } else {
            Self::default()
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load settings from a specific JSON file, without env overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg: Self = config::load_json_file(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse settings from a JSON string; missing keys take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("Failed to parse backup config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults with backups and exports under `root`
    pub fn with_folder(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            backup_folder: root.join("backups"),
            export_folder: root.join("exports"),
            ..Self::default()
        }
    }

    /// Override settings from environment variables looked up by `var`
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(folder) = var(ENV_BACKUP_FOLDER) {
            self.backup_folder = PathBuf::from(folder);
        }
        if let Some(folder) = var(ENV_EXPORT_FOLDER) {
            self.export_folder = PathBuf::from(folder);
        }
        if let Some(max) = var(ENV_MAX_MESSAGES) {
            let max: usize = max
                .trim()
                .parse()
                .with_context(|| format!("{} must be a non-negative integer", ENV_MAX_MESSAGES))?;
            self.max_messages_full = max;
            self.max_messages_incremental = max;
        }
        if let Some(quota) = var(ENV_QUOTA_PER_SECOND) {
            self.quota_per_second = quota
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number", ENV_QUOTA_PER_SECOND))?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.quota_per_second > 0.0, "quota_per_second must be positive");
        ensure!(self.burst > 0.0, "burst must be positive");
        ensure!(
            (1.0..=MAX_RETRY_MULTIPLIER).contains(&self.retry_multiplier),
            "retry_multiplier must be between 1.0 and {}",
            MAX_RETRY_MULTIPLIER
        );
        ensure!(
            self.retry_base_delay_ms <= MAX_RETRY_BASE_DELAY_MS,
            "retry_base_delay_ms must be at most {}",
            MAX_RETRY_BASE_DELAY_MS
        );
        ensure!(
            (1..=MAX_RETRY_ATTEMPTS).contains(&self.retry_max_attempts),
            "retry_max_attempts must be between 1 and {}",
            MAX_RETRY_ATTEMPTS
        );
        Ok(())
    }

    /// Path of the backup state file
    pub fn state_file_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.backup_folder.join("backup_state.json"))
    }

    /// Default message cap for a backup type
    pub fn max_messages(&self, backup_type: BackupType) -> usize {
        match backup_type {
            BackupType::Full => self.max_messages_full,
            BackupType::Incremental => self.max_messages_incremental,
        }
    }

    pub fn governor(&self) -> RateGovernor {
        RateGovernor::new(self.quota_per_second, self.burst)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: self.retry_multiplier,
            max_attempts: self.retry_max_attempts,
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            keep_days: self.retention_keep_days,
            keep_count: self.retention_keep_count,
        }
    }
}
