//! Backup and export runs
//!
//! A run moves through Listing, Retrieving, Writing and Finalizing and ends
//! Succeeded or Failed. Identifiers are listed lazily and retrieved in
//! fixed-size batches; every retrieved message is written to the sink
//! before the next batch is requested, so memory stays bounded by one
//! batch. Only this module decides whether a run fails; per-message
//! problems are counted and the run continues.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::query::build_query;
use super::retention::{PruneReport, prune_backups};
use super::state::BackupStateStore;
use crate::archive::{MboxWriter, MessageSink};
use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use crate::export::{ExportFormat, open_sink};
use crate::gmail::{AccountSession, CredentialProvider, GmailClient, MessageFormat, Transport};
use crate::models::{BackupState, BackupType, MessageId};
use crate::pacing::CancelToken;

/// Outcome of a backup run
///
/// `success` and `messages_failed` are independent: a successful run may
/// still have skipped messages.
#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub success: bool,
    pub backup_type: BackupType,
    /// Archive written by the run; None when the run failed before opening it
    pub backup_path: Option<PathBuf>,
    pub messages_processed: usize,
    pub messages_failed: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub error: Option<String>,
}

/// Outcome of an export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub success: bool,
    pub format: ExportFormat,
    /// File (or directory, for eml) written by the run
    pub export_path: Option<PathBuf>,
    pub messages_processed: usize,
    pub messages_failed: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Listing,
    Retrieving,
    Writing,
    Finalizing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Listing => "listing",
            Phase::Retrieving => "retrieving",
            Phase::Writing => "writing",
            Phase::Finalizing => "finalizing",
        })
    }
}

/// Messages written and skipped so far
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    processed: usize,
    failed: usize,
}

/// What a run produced before it ended, successfully or not
#[derive(Debug, Default)]
struct RunProgress {
    path: Option<PathBuf>,
    tally: Tally,
}

/// Runs backups and exports for the accounts of one credential provider
pub struct BackupService {
    config: BackupConfig,
    client: GmailClient,
    credentials: Arc<dyn CredentialProvider>,
    cancel: CancelToken,
    stop: CancelToken,
}

impl BackupService {
    pub fn new(config: BackupConfig, client: GmailClient, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            config,
            client,
            credentials,
            cancel: CancelToken::new(),
            stop: CancelToken::new(),
        }
    }

    /// Build the client (governor and retry policy included) from `config`
    pub fn from_config(
        config: BackupConfig,
        transport: Box<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let client = GmailClient::new(transport, Arc::new(config.governor()), config.retry_policy());
        Self::new(config, client, credentials)
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Token that aborts the current and all later runs of this service
    ///
    /// Cancelling interrupts quota and backoff waits; messages already
    /// retrieved are still written and the sink is closed.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Token that stops runs at the next batch boundary
    ///
    /// Unlike [`cancel_token`](Self::cancel_token) it interrupts no waits:
    /// the in-flight batch is retrieved and written in full, then the run
    /// ends as cancelled without advancing backup state.
    pub fn stop_token(&self) -> CancelToken {
        self.stop.clone()
    }

    /// Back up `account_id` into a new archive in the backup folder
    ///
    /// Incremental runs restrict the listing to messages after the last
    /// successful backup and behave like full runs when there is none.
    /// `cap` defaults to the configured maximum for `backup_type`. The
    /// stored state advances only when the run succeeds.
    pub fn run_backup(
        &self,
        account_id: &str,
        backup_type: BackupType,
        filter: Option<&str>,
        cap: Option<usize>,
    ) -> BackupResult {
        let start_time = Utc::now();
        info!("Starting {} backup for {}", backup_type, account_id);

        let mut progress = RunProgress::default();
        let outcome = self.backup(account_id, backup_type, filter, cap, start_time, &mut progress);

        let result = BackupResult {
            success: outcome.is_ok(),
            backup_type,
            backup_path: progress.path,
            messages_processed: progress.tally.processed,
            messages_failed: progress.tally.failed,
            start_time,
            end_time: Utc::now(),
            error: outcome.err().map(|e| e.to_string()),
        };
        log_finish("Backup", account_id, result.success, progress.tally, result.error.as_deref());
        result
    }

    /// Export `account_id` to a generated path in the export folder
    pub fn run_export(
        &self,
        account_id: &str,
        format: ExportFormat,
        filter: Option<&str>,
        cap: Option<usize>,
    ) -> ExportResult {
        let stem = format!("gmail_export_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let file_name = match format.extension() {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        };
        let path = self.config.export_folder.join(file_name);
        self.run_export_to(account_id, format, &path, filter, cap)
    }

    /// Export `account_id` to `path`
    ///
    /// Exports never read or write backup state. `cap` defaults to the
    /// configured maximum for full backups.
    pub fn run_export_to(
        &self,
        account_id: &str,
        format: ExportFormat,
        path: &Path,
        filter: Option<&str>,
        cap: Option<usize>,
    ) -> ExportResult {
        let start_time = Utc::now();
        info!("Starting {} export for {} to {}", format, account_id, path.display());

        let mut progress = RunProgress::default();
        let outcome = self.export(account_id, format, path, filter, cap, &mut progress);

        let result = ExportResult {
            success: outcome.is_ok(),
            format,
            export_path: progress.path,
            messages_processed: progress.tally.processed,
            messages_failed: progress.tally.failed,
            start_time,
            end_time: Utc::now(),
            error: outcome.err().map(|e| e.to_string()),
        };
        log_finish("Export", account_id, result.success, progress.tally, result.error.as_deref());
        result
    }

    /// Apply the configured retention policy to the backup folder
    pub fn prune_backups(&self, dry_run: bool) -> anyhow::Result<PruneReport> {
        prune_backups(&self.config.backup_folder, &self.config.retention_policy(), dry_run)
    }

    fn backup(
        &self,
        account_id: &str,
        backup_type: BackupType,
        filter: Option<&str>,
        cap: Option<usize>,
        start_time: DateTime<Utc>,
        progress: &mut RunProgress,
    ) -> Result<()> {
        let session = self.open_session(account_id)?;
        let mut store = BackupStateStore::load(self.config.state_file_path())?;

        let since = match backup_type {
            BackupType::Full => None,
            BackupType::Incremental => {
                let since = store.get(account_id).map(|state| state.last_backup_time);
                if since.is_none() {
                    info!("No previous backup for {}, incremental run covers everything", account_id);
                }
                since
            }
        };
        let query = build_query(filter, since);
        let cap = cap.unwrap_or_else(|| self.config.max_messages(backup_type));

        let path = self.config.backup_folder.join(format!(
            "gmail_backup_{}_{}.mbox",
            backup_type,
            start_time.format("%Y%m%d_%H%M%S")
        ));
        let sink: Box<dyn MessageSink> = Box::new(MboxWriter::open(&path)?);
        progress.path = Some(path);

        self.stream_into(&session, query.as_deref(), cap, sink, &mut progress.tally)?;

        store.set(
            account_id,
            BackupState::completed(backup_type, start_time, progress.tally.processed),
        );
        store.save()?;
        debug!("Backup state for {} saved to {}", account_id, store.path().display());
        Ok(())
    }

    fn export(
        &self,
        account_id: &str,
        format: ExportFormat,
        path: &Path,
        filter: Option<&str>,
        cap: Option<usize>,
        progress: &mut RunProgress,
    ) -> Result<()> {
        let session = self.open_session(account_id)?;
        let query = build_query(filter, None);
        let cap = cap.unwrap_or_else(|| self.config.max_messages(BackupType::Full));

        let sink = open_sink(format, path)?;
        progress.path = Some(path.to_path_buf());

        self.stream_into(&session, query.as_deref(), cap, sink, &mut progress.tally)
    }

    /// Check the account's credentials and open a session for one run
    fn open_session(&self, account_id: &str) -> Result<AccountSession> {
        if self.cancel.is_cancelled() || self.stop.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        let token = self
            .credentials
            .bearer_token(account_id)
            .map_err(|e| BackupError::Auth(format!("no usable token for {}: {:#}", account_id, e)))?;
        if self.credentials.is_expired(&token) {
            return Err(BackupError::Auth(format!("access token for {} has expired", account_id)));
        }
        if !token.has_read_scope() {
            return Err(BackupError::Auth(format!(
                "access token for {} lacks a mail read scope",
                account_id
            )));
        }

        Ok(AccountSession::new(account_id, token.access_token, self.cancel.clone()))
    }

    /// List, retrieve and write messages, then close the sink
    ///
    /// The sink is closed even when the run fails, so whatever was written
    /// stays readable.
    fn stream_into(
        &self,
        session: &AccountSession,
        query: Option<&str>,
        cap: usize,
        mut sink: Box<dyn MessageSink>,
        tally: &mut Tally,
    ) -> Result<()> {
        let streamed = self.stream_batches(session, query, cap, sink.as_mut(), tally);

        debug!("{}: {}", session.account_id, Phase::Finalizing);
        let closed = sink.finish();
        streamed?;
        closed
    }

    fn stream_batches(
        &self,
        session: &AccountSession,
        query: Option<&str>,
        cap: usize,
        sink: &mut dyn MessageSink,
        tally: &mut Tally,
    ) -> Result<()> {
        let batch_size = self.config.batch_size.max(1);
        debug!(
            "{}: {} (query: {}, cap: {})",
            session.account_id,
            Phase::Listing,
            query.unwrap_or("<none>"),
            cap
        );

        let mut ids = self.client.list(session, query, Some(cap));
        let mut batch: Vec<MessageId> = Vec::with_capacity(batch_size);
        let mut batch_number = 0;

        loop {
            if self.stop.is_cancelled() {
                info!("{}: stop requested after {} batches", session.account_id, batch_number);
                return Err(BackupError::Cancelled);
            }
            batch.clear();
            for id in ids.by_ref().take(batch_size) {
                batch.push(id?);
            }
            if batch.is_empty() {
                return Ok(());
            }
            if self.cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }
            batch_number += 1;
            self.process_batch(session, batch_number, &batch, sink, tally)?;
        }
    }

    fn process_batch(
        &self,
        session: &AccountSession,
        batch_number: usize,
        ids: &[MessageId],
        sink: &mut dyn MessageSink,
        tally: &mut Tally,
    ) -> Result<()> {
        debug!(
            "{}: {} batch {} ({} ids)",
            session.account_id,
            Phase::Retrieving,
            batch_number,
            ids.len()
        );
        let outcome = self.client.batch_get(session, ids, MessageFormat::Raw);

        debug!(
            "{}: {} batch {} ({} messages)",
            session.account_id,
            Phase::Writing,
            batch_number,
            outcome.messages.len()
        );
        for message in &outcome.messages {
            match sink.append(message) {
                Ok(()) => tally.processed += 1,
                Err(e) if e.is_per_message() => {
                    warn!("Skipping message {}: {}", message.id.as_str(), e);
                    tally.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        tally.failed += outcome.failed.len();

        match outcome.interrupted {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn log_finish(kind: &str, account_id: &str, success: bool, tally: Tally, error: Option<&str>) {
    if success {
        info!(
            "{} for {} finished: {} messages processed, {} failed",
            kind, account_id, tally.processed, tally.failed
        );
    } else {
        warn!(
            "{} for {} failed after {} messages ({} failed): {}",
            kind,
            account_id,
            tally.processed,
            tally.failed,
            error.unwrap_or("unknown error")
        );
    }
}
