//! Backup orchestration
//!
//! - Backup and export runs over the paced mail API client
//! - Persistent per-account state for incremental runs
//! - Incremental search filter construction
//! - Retention pruning of old archives

mod orchestrator;
mod query;
mod retention;
mod state;

pub use orchestrator::{BackupResult, BackupService, ExportResult};
pub use query::build_query;
pub use retention::{PruneReport, RetentionPolicy, prune_backups};
pub use state::BackupStateStore;
