//! Gmail API HTTP client
//!
//! Every call is paced through the shared [`RateGovernor`] with its quota
//! cost and wrapped in the [`RetryPolicy`]. Synchronous, like the rest of
//! the pipeline.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, bail};
use log::{info, warn};
use serde::de::DeserializeOwned;
use url::Url;

use super::api::{GmailMessage, ListLabelsResponse, ListMessagesResponse};
use super::normalize::normalize_message;
use super::transport::Transport;
use crate::error::ApiError;
use crate::models::{Label, LabelId, Message, MessageId};
use crate::pacing::{Attempt, CancelToken, RateGovernor, RetryPolicy};

/// Gmail API base URL
pub const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

/// Quota units charged per call
const LIST_COST: u32 = 5;
const GET_COST: u32 = 5;
const LABELS_COST: u32 = 1;

/// Largest page the list endpoint accepts
const MAX_PAGE_SIZE: usize = 500;

/// Representation requested from `messages.get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Parsed payload tree
    Full,
    /// Verbatim RFC 5322 bytes
    Raw,
    /// Headers only
    Metadata,
    /// Identifiers and labels only
    Minimal,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Full => "full",
            MessageFormat::Raw => "raw",
            MessageFormat::Metadata => "metadata",
            MessageFormat::Minimal => "minimal",
        }
    }
}

/// Account, credentials and cancellation for one run
#[derive(Debug, Clone)]
pub struct AccountSession {
    pub account_id: String,
    access_token: String,
    cancel: CancelToken,
}

impl AccountSession {
    pub fn new(account_id: impl Into<String>, access_token: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            account_id: account_id.into(),
            access_token: access_token.into(),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Result of retrieving one batch of identifiers
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Retrieved messages in request order
    pub messages: Vec<Message>,
    /// Identifiers skipped with the reason
    pub failed: Vec<(MessageId, ApiError)>,
    /// Fatal condition that stopped the batch early
    pub interrupted: Option<ApiError>,
}

/// Gmail API client
pub struct GmailClient {
    transport: Box<dyn Transport>,
    governor: Arc<RateGovernor>,
    retry: RetryPolicy,
    base_url: String,
}

impl GmailClient {
    /// Create a client against the public Gmail endpoint
    pub fn new(transport: Box<dyn Transport>, governor: Arc<RateGovernor>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            governor,
            retry,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: &str) -> anyhow::Result<Self> {
        let url = Url::parse(base_url).with_context(|| format!("Invalid API base URL {}", base_url))?;
        if url.cannot_be_a_base() {
            bail!("API base URL {} cannot carry a path", base_url);
        }
        self.base_url = url.as_str().trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Lazily list message IDs matching `query`, stopping after `limit`
    ///
    /// Pages are fetched on demand. Calling `list` again with the same
    /// arguments restarts from the first page.
    pub fn list<'a>(
        &'a self,
        session: &'a AccountSession,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> MessageList<'a> {
        MessageList {
            client: self,
            session,
            query: query.filter(|q| !q.trim().is_empty()).map(str::to_string),
            limit,
            page_token: None,
            buffer: VecDeque::new(),
            yielded: 0,
            done: false,
        }
    }

    /// Fetch one page of message references
    pub fn list_page(
        &self,
        session: &AccountSession,
        query: Option<&str>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse, ApiError> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut params = vec![("maxResults", page_size.as_str())];
        if let Some(q) = query {
            params.push(("q", q));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let url = self.endpoint(session, &["messages"], &params);
        self.fetch(session, &url, LIST_COST, "list messages")
    }

    /// Retrieve a single message
    pub fn get(&self, session: &AccountSession, id: &MessageId, format: MessageFormat) -> Result<Message, ApiError> {
        let url = self.endpoint(
            session,
            &["messages", id.as_str()],
            &[("format", format.as_str())],
        );
        let what = format!("get message {}", id.as_str());
        let wire: GmailMessage = self.fetch(session, &url, GET_COST, &what)?;
        normalize_message(wire)
    }

    /// Retrieve a batch of messages, skipping ones that cannot be fetched
    ///
    /// Not-found, rejected, undecodable and retry-exhausted ids are recorded
    /// in `failed`. Authentication failure or cancellation stops the batch;
    /// messages retrieved before that are still returned.
    pub fn batch_get(&self, session: &AccountSession, ids: &[MessageId], format: MessageFormat) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for id in ids {
            match self.get(session, id, format) {
                Ok(message) => outcome.messages.push(message),
                Err(e) if e.is_fatal() => {
                    outcome.interrupted = Some(e);
                    break;
                }
                Err(e @ ApiError::NotFound(_)) => {
                    info!("Skipping message {}: no longer exists", id.as_str());
                    outcome.failed.push((id.clone(), e));
                }
                Err(e) => {
                    warn!("Skipping message {}: {}", id.as_str(), e);
                    outcome.failed.push((id.clone(), e));
                }
            }
        }

        outcome
    }

    /// List all labels (folders) in the user's mailbox
    pub fn list_labels(&self, session: &AccountSession) -> Result<Vec<Label>, ApiError> {
        let url = self.endpoint(session, &["labels"], &[]);
        let response: ListLabelsResponse = self.fetch(session, &url, LABELS_COST, "list labels")?;

        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| Label {
                id: LabelId::new(l.id),
                name: l.name,
                is_system: l.label_type.as_deref() == Some("system"),
            })
            .collect())
    }

    /// Build `<base>/users/<account>/<segments...>?<params>`
    fn endpoint(&self, session: &AccountSession, segments: &[&str], params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}/users/{}",
            self.base_url,
            urlencoding::encode(&session.account_id)
        );
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }

        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    /// Paced, retried GET decoded as JSON
    fn fetch<T: DeserializeOwned>(
        &self,
        session: &AccountSession,
        url: &str,
        cost: u32,
        what: &str,
    ) -> Result<T, ApiError> {
        self.retry.run(&session.cancel, what, |_| {
            if !self.governor.acquire_cancellable(cost, &session.cancel) {
                return Attempt::Fatal(ApiError::Cancelled);
            }
            let result = self
                .transport
                .get(url, &session.access_token)
                .and_then(|body| {
                    serde_json::from_str(&body)
                        .map_err(|e| ApiError::Decode(format!("{}: {}", what, e)))
                });
            Attempt::from(result)
        })
    }
}

/// Lazy sequence of message IDs, fetching pages as it is consumed
///
/// Yields at most one error, after which it is exhausted.
pub struct MessageList<'a> {
    client: &'a GmailClient,
    session: &'a AccountSession,
    query: Option<String>,
    limit: Option<usize>,
    page_token: Option<String>,
    buffer: VecDeque<MessageId>,
    yielded: usize,
    done: bool,
}

impl MessageList<'_> {
    fn remaining(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_sub(self.yielded))
    }

    fn fetch_page(&mut self) -> Result<(), ApiError> {
        let page_size = self.remaining().unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let page = self.client.list_page(
            self.session,
            self.query.as_deref(),
            page_size,
            self.page_token.as_deref(),
        )?;

        let refs = page.messages.unwrap_or_default();
        if refs.is_empty() {
            self.done = true;
            return Ok(());
        }
        self.buffer
            .extend(refs.into_iter().map(|r| MessageId::new(r.id)));

        match page.next_page_token {
            Some(token) => self.page_token = Some(token),
            None => self.done = true,
        }
        Ok(())
    }
}

impl Iterator for MessageList<'_> {
    type Item = Result<MessageId, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining() == Some(0) {
            return None;
        }
        while self.buffer.is_empty() {
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.done = true;
                self.buffer.clear();
                return Some(Err(e));
            }
        }
        self.yielded += 1;
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::testing::{FakeMailbox, sample_raw};
    use crate::models::MessageContent;
    use std::time::Duration;

    fn client_for(mailbox: &Arc<FakeMailbox>) -> GmailClient {
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_attempts: 3,
        };
        GmailClient::new(
            Box::new(Arc::clone(mailbox)),
            Arc::new(RateGovernor::new(10_000.0, 10_000.0)),
            retry,
        )
        .with_base_url(FakeMailbox::BASE_URL)
        .unwrap()
    }

    fn session() -> AccountSession {
        AccountSession::new("me", "token", CancelToken::new())
    }

    fn ids(list: MessageList<'_>) -> Vec<String> {
        list.map(|r| r.unwrap().0).collect()
    }

    #[test]
    fn test_list_paginates_lazily_up_to_limit() {
        let mailbox = Arc::new(FakeMailbox::with_messages(1200));
        let client = client_for(&mailbox);
        let session = session();

        let listed = ids(client.list(&session, None, Some(700)));
        assert_eq!(listed.len(), 700);
        assert_eq!(listed[0], "m0000");
        assert_eq!(listed[699], "m0699");
        assert_eq!(mailbox.list_calls(), 2);

        let all = ids(client.list(&session, None, None));
        assert_eq!(all.len(), 1200);
    }

    #[test]
    fn test_list_passes_query() {
        let mailbox = Arc::new(FakeMailbox::with_messages(3));
        let client = client_for(&mailbox);
        let session = session();

        let _ = ids(client.list(&session, Some("from:boss after:2024/01/01"), None));
        assert_eq!(mailbox.queries(), vec!["from:boss after:2024/01/01".to_string()]);
    }

    #[test]
    fn test_get_raw_message() {
        let mailbox = Arc::new(FakeMailbox::with_messages(1));
        let client = client_for(&mailbox);

        let msg = client
            .get(&session(), &MessageId::new("m0000"), MessageFormat::Raw)
            .unwrap();
        assert_eq!(msg.raw_bytes(), Some(sample_raw(0).as_slice()));
        assert_eq!(msg.label_ids, vec!["INBOX"]);
    }

    #[test]
    fn test_get_full_message_is_parsed() {
        let mailbox = Arc::new(FakeMailbox::with_messages(1));
        let client = client_for(&mailbox);

        let msg = client
            .get(&session(), &MessageId::new("m0000"), MessageFormat::Full)
            .unwrap();
        assert!(matches!(msg.content(), MessageContent::Parsed(_)));
        assert_eq!(msg.header("Subject").as_deref(), Some("Message 0"));
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let mailbox = Arc::new(FakeMailbox::with_messages(1));
        mailbox.fail_next("m0000", &[503, 429]);
        let client = client_for(&mailbox);

        let msg = client.get(&session(), &MessageId::new("m0000"), MessageFormat::Raw);
        assert!(msg.is_ok());
        assert_eq!(mailbox.get_calls("m0000"), 3);
    }

    #[test]
    fn test_quota_403_is_retried_not_fatal() {
        let mailbox = Arc::new(FakeMailbox::with_messages(3));
        mailbox.fail_next_with(
            "m0001",
            403,
            r#"{"error":{"code":403,"errors":[{"domain":"usageLimits","reason":"userRateLimitExceeded"}]}}"#,
        );
        let client = client_for(&mailbox);

        let batch: Vec<_> = (0..3).map(|i| MessageId::new(format!("m{:04}", i))).collect();
        let outcome = client.batch_get(&session(), &batch, MessageFormat::Raw);

        assert_eq!(outcome.messages.len(), 3);
        assert!(outcome.failed.is_empty());
        assert!(outcome.interrupted.is_none());
        assert_eq!(mailbox.get_calls("m0001"), 2);
    }

    #[test]
    fn test_batch_get_skips_missing_and_exhausted() {
        let mailbox = Arc::new(FakeMailbox::with_messages(5));
        mailbox.remove("m0001");
        mailbox.fail_next("m0003", &[500, 500, 500]);
        let client = client_for(&mailbox);

        let batch: Vec<_> = (0..5).map(|i| MessageId::new(format!("m{:04}", i))).collect();
        let outcome = client.batch_get(&session(), &batch, MessageFormat::Raw);

        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.failed.len(), 2);
        assert!(matches!(outcome.failed[0].1, ApiError::NotFound(_)));
        assert_eq!(outcome.failed[1].1, ApiError::Server { status: 500 });
        assert!(outcome.interrupted.is_none());
    }

    #[test]
    fn test_batch_get_stops_on_auth_failure() {
        let mailbox = Arc::new(FakeMailbox::with_messages(4));
        mailbox.fail_next("m0002", &[401]);
        let client = client_for(&mailbox);

        let batch: Vec<_> = (0..4).map(|i| MessageId::new(format!("m{:04}", i))).collect();
        let outcome = client.batch_get(&session(), &batch, MessageFormat::Raw);

        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.interrupted, Some(ApiError::Auth { status: 401 }));
        assert_eq!(mailbox.get_calls("m0003"), 0);
    }

    #[test]
    fn test_cancelled_session_makes_no_calls() {
        let mailbox = Arc::new(FakeMailbox::with_messages(2));
        let client = client_for(&mailbox);
        let session = session();
        session.cancel_token().cancel();

        let result = client.get(&session, &MessageId::new("m0000"), MessageFormat::Raw);
        assert_eq!(result.unwrap_err(), ApiError::Cancelled);
        assert_eq!(mailbox.get_calls("m0000"), 0);
    }

    #[test]
    fn test_list_labels() {
        let mailbox = Arc::new(FakeMailbox::with_messages(0));
        let client = client_for(&mailbox);

        let labels = client.list_labels(&session()).unwrap();
        assert!(labels.iter().any(|l| l.id.as_str() == "INBOX" && l.is_system));
        assert!(labels.iter().any(|l| l.name == "Receipts" && !l.is_system));
    }

    #[test]
    fn test_endpoint_encodes_account_and_query() {
        let mailbox = Arc::new(FakeMailbox::with_messages(0));
        let client = client_for(&mailbox);
        let session = AccountSession::new("user@example.com", "t", CancelToken::new());

        let url = client.endpoint(&session, &["messages"], &[("q", "from:a b")]);
        assert_eq!(
            url,
            "https://fake.test/gmail/v1/users/user%40example.com/messages?q=from%3Aa%20b"
        );
    }

    #[test]
    fn test_default_base_url() {
        let mailbox = Arc::new(FakeMailbox::with_messages(0));
        let client = GmailClient::new(
            Box::new(mailbox),
            Arc::new(RateGovernor::new(1.0, 1.0)),
            RetryPolicy::default(),
        );
        let url = client.endpoint(&session(), &["labels"], &[]);
        assert_eq!(url, "https://gmail.googleapis.com/gmail/v1/users/me/labels");
        assert!(client.with_base_url("not a url").is_err());
    }
}
