//! Credential provider interface
//!
//! Acquiring and refreshing OAuth tokens happens outside this crate. The
//! backup pipeline only asks a provider for a bearer token before each run
//! and refuses to start with an expired or under-scoped one.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};

/// Refresh buffer: tokens expiring within this window count as expired
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Scopes that allow reading messages
const READ_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://mail.google.com/",
];

/// OAuth bearer token with its granted scopes
#[derive(Debug, Clone, PartialEq)]
pub struct BearerToken {
    pub access_token: String,
    pub scopes: Vec<String>,
    /// None when the provider does not report an expiry
    pub expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    pub fn new(access_token: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            access_token: access_token.into(),
            scopes,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether any granted scope allows reading mail
    pub fn has_read_scope(&self) -> bool {
        self.scopes.iter().any(|granted| {
            READ_SCOPES
                .iter()
                .any(|scope| scope.trim_end_matches('/') == granted.trim_end_matches('/'))
        })
    }

    /// Whether the token expires within the refresh buffer of `now`
    pub fn expires_within_buffer(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now + Duration::seconds(EXPIRY_BUFFER_SECS))
    }
}

/// Source of bearer tokens for accounts
pub trait CredentialProvider: Send + Sync {
    /// Current token for `account_id`
    fn bearer_token(&self, account_id: &str) -> Result<BearerToken>;

    /// Whether `token` must not be used any more
    fn is_expired(&self, token: &BearerToken) -> bool {
        token.expires_within_buffer(Utc::now())
    }
}

/// In-memory tokens handed over by the embedding application
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    tokens: RwLock<HashMap<String, BearerToken>>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider holding a single token for `account_id`
    pub fn single(account_id: impl Into<String>, token: BearerToken) -> Self {
        let provider = Self::new();
        provider.insert(account_id, token);
        provider
    }

    /// Store or replace the token for `account_id`
    pub fn insert(&self, account_id: impl Into<String>, token: BearerToken) {
        let mut tokens = self
            .tokens
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tokens.insert(account_id.into(), token);
    }
}

impl CredentialProvider for StaticTokenProvider {
    fn bearer_token(&self, account_id: &str) -> Result<BearerToken> {
        let tokens = self
            .tokens
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tokens
            .get(account_id)
            .cloned()
            .ok_or_else(|| anyhow!("No credentials for account {}", account_id))
    }
}
