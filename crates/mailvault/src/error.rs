//! Error types for the backup pipeline
//!
//! `ApiError` classifies every outbound call so the retry combinator and the
//! batch loop can decide between retrying, skipping and aborting.
//! `BackupError` is what reaches the orchestrator, which alone decides
//! whether a run fails.

use std::io;
use std::path::PathBuf;

/// Classified failure of a single mail API call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Rate limited by mail API (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("Mail API server error (HTTP {status})")]
    Server { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed (HTTP {status})")]
    Auth { status: u16 },

    #[error("Request rejected (HTTP {status}): {resource}")]
    Rejected { status: u16, resource: String },

    #[error("Invalid API response: {0}")]
    Decode(String),

    #[error("Cancelled")]
    Cancelled,
}

impl ApiError {
    /// Classify an HTTP status code returned for `resource`
    pub fn from_status(status: u16, resource: &str) -> Self {
        match status {
            401 | 403 => ApiError::Auth { status },
            404 => ApiError::NotFound(resource.to_string()),
            429 => ApiError::RateLimited { status },
            500..=599 => ApiError::Server { status },
            _ => ApiError::Rejected {
                status,
                resource: resource.to_string(),
            },
        }
    }

    /// Classify an error response using its status and JSON body
    ///
    /// The API answers quota exhaustion with 403 as well as 429; those 403s
    /// carry a `rateLimitExceeded` or `userRateLimitExceeded` reason and
    /// are retried like 429. Any other 403 is an authorization failure.
    pub fn from_response(status: u16, resource: &str, body: &str) -> Self {
        if status == 403 && is_rate_limit_body(body) {
            return ApiError::RateLimited { status };
        }
        ApiError::from_status(status, resource)
    }

    /// Whether the call may succeed if repeated after a delay
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Server { .. } | ApiError::Transport(_)
        )
    }

    /// Whether the condition must stop the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Auth { .. } | ApiError::Cancelled)
    }
}

const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

fn is_rate_limit_body(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    let error = &value["error"];
    let reason_matches = error["errors"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|e| e["reason"].as_str())
        .any(|reason| RATE_LIMIT_REASONS.contains(&reason));
    reason_matches || error["status"].as_str() == Some("RESOURCE_EXHAUSTED")
}

/// Error surfaced to the backup orchestrator
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed archive or message: {0}")]
    Format(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Mail API error: {0}")]
    Api(ApiError),

    #[error("Run cancelled")]
    Cancelled,
}

impl BackupError {
    /// Build an I/O error carrying the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error concerns a single message and the run may continue
    pub fn is_per_message(&self) -> bool {
        matches!(self, BackupError::Format(_) | BackupError::InvalidMessage(_))
    }
}

impl From<ApiError> for BackupError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Auth { status } => {
                BackupError::Auth(format!("mail API rejected credentials (HTTP {})", status))
            }
            ApiError::Cancelled => BackupError::Cancelled,
            other => BackupError::Api(other),
        }
    }
}

impl From<mailparse::MailParseError> for BackupError {
    fn from(e: mailparse::MailParseError) -> Self {
        BackupError::Format(e.to_string())
    }
}

/// Result alias used throughout the pipeline
pub type Result<T> = std::result::Result<T, BackupError>;
