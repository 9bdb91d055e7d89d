//! Mailvault - Gmail backup and export
//!
//! This crate provides the synchronous backup pipeline:
//! - Domain models (Message, ParsedMessage, BackupState)
//! - Rate governor, retry combinator and cancellation for API pacing
//! - Gmail API client with credential provider interface
//! - MIME parsing and serialization
//! - mboxrd archive writer and reader
//! - Export codecs (mbox, JSON lines, CSV, one file per message)
//! - Backup orchestrator with incremental state and retention pruning
//!
//! The library never installs a logger; it logs through the `log` facade.

pub mod archive;
pub mod backup;
pub mod config;
pub mod error;
pub mod export;
pub mod gmail;
pub mod mime;
pub mod models;
pub mod pacing;

pub use archive::{MboxReader, MboxWriter, MessageSink, read_all};
pub use backup::{
    BackupResult, BackupService, BackupStateStore, ExportResult, PruneReport, RetentionPolicy,
    build_query, prune_backups,
};
pub use config::BackupConfig;
pub use error::{ApiError, BackupError, Result};
pub use export::{ExportFormat, open_sink};
pub use gmail::{
    AccountSession, BearerToken, CredentialProvider, GmailClient, MessageFormat,
    StaticTokenProvider, Transport, UreqTransport,
};
pub use models::{
    Attachment, AttachmentContent, BackupState, BackupType, EmailAddress, Headers, Label, LabelId,
    Message, MessageContent, MessageId, ParsedMessage, ThreadId,
};
pub use pacing::{Attempt, CancelToken, RateGovernor, RetryPolicy};
