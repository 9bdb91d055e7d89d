//! Message model representing a retrieved mail message
//!
//! A message carries either the verbatim wire bytes or a parsed form, never
//! neither. Consumers match on [`MessageContent`] so both cases are handled
//! explicitly.

use std::borrow::Cow;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::ParsedMessage;
use crate::error::{BackupError, Result};
use crate::mime;

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a thread (Gmail thread ID)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Parse an email address from a string like "John Doe <john@example.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        // Try to parse "Name <email>" format
        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim().trim_matches('"').trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        // Otherwise, treat the whole string as an email
        Self {
            name: None,
            email: s.to_string(),
        }
    }

    /// Parse a comma-separated address list
    ///
    /// Commas inside quoted display names or angle brackets do not split.
    pub fn parse_list(s: &str) -> Vec<Self> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut in_quotes = false;
        let mut in_angle = false;

        for (i, c) in s.char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => in_angle = true,
                '>' if !in_quotes => in_angle = false,
                ',' if !in_quotes && !in_angle => {
                    out.push(&s[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        out.push(&s[start..]);

        out.into_iter()
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Whether the address looks routable (has a local part and a domain)
    pub fn is_valid(&self) -> bool {
        match self.email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !self.email.contains(char::is_whitespace)
            }
            None => false,
        }
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Payload of a message: verbatim wire bytes or a parsed structure
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Exact RFC 5322 bytes as stored by the provider
    Raw(Vec<u8>),
    /// Decoded headers, bodies and attachments
    Parsed(ParsedMessage),
}

/// A single retrieved message
///
/// Constructed once per retrieval and not mutated afterwards; the builder
/// methods consume `self` and are meant for construction only.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Gmail message ID
    pub id: MessageId,
    /// ID of the thread this message belongs to
    pub thread_id: ThreadId,
    /// Gmail label IDs (e.g., "INBOX", "SENT", "UNREAD")
    pub label_ids: Vec<String>,
    /// Short plain-text preview supplied by the provider
    pub snippet: String,
    /// Provider's receive timestamp
    pub internal_date: Option<DateTime<Utc>>,
    content: MessageContent,
}

impl Message {
    /// Create a message from verbatim wire bytes
    ///
    /// Fails if the payload is empty: a message must carry content.
    pub fn raw(id: MessageId, thread_id: ThreadId, bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(BackupError::InvalidMessage(format!(
                "message {} has an empty raw payload",
                id.as_str()
            )));
        }
        Ok(Self::with_content(id, thread_id, MessageContent::Raw(bytes)))
    }

    /// Create a message from its parsed form
    pub fn parsed(id: MessageId, thread_id: ThreadId, parsed: ParsedMessage) -> Self {
        Self::with_content(id, thread_id, MessageContent::Parsed(parsed))
    }

    fn with_content(id: MessageId, thread_id: ThreadId, content: MessageContent) -> Self {
        Self {
            id,
            thread_id,
            label_ids: Vec::new(),
            snippet: String::new(),
            internal_date: None,
            content,
        }
    }

    pub fn with_labels(mut self, label_ids: Vec<String>) -> Self {
        self.label_ids = label_ids;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_internal_date(mut self, internal_date: DateTime<Utc>) -> Self {
        self.internal_date = Some(internal_date);
        self
    }

    /// Set the internal date from Gmail's milliseconds-since-epoch value
    pub fn with_internal_date_millis(self, millis: i64) -> Self {
        match Utc.timestamp_millis_opt(millis).single() {
            Some(date) if millis > 0 => self.with_internal_date(date),
            _ => self,
        }
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// The verbatim wire bytes, if this message carries them
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        match &self.content {
            MessageContent::Raw(bytes) => Some(bytes),
            MessageContent::Parsed(_) => None,
        }
    }

    /// First value of a header, decoded
    ///
    /// For raw messages only the header block is parsed.
    pub fn header(&self, name: &str) -> Option<String> {
        match &self.content {
            MessageContent::Raw(bytes) => mime::raw_header(bytes, name),
            MessageContent::Parsed(parsed) => parsed.headers.get(name).map(str::to_string),
        }
    }

    /// Sender address from the From header
    pub fn sender(&self) -> Option<EmailAddress> {
        self.header("From")
            .and_then(|from| EmailAddress::parse_list(&from).into_iter().next())
    }

    /// Best known timestamp: provider internal date, then the Date header
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        if let Some(date) = self.internal_date {
            return Some(date);
        }
        match &self.content {
            MessageContent::Parsed(parsed) => parsed.date,
            MessageContent::Raw(_) => self.header("Date").and_then(|d| mime::parse_date(&d)),
        }
    }

    /// Parsed view, decoding raw bytes when necessary
    pub fn to_parsed(&self) -> Result<Cow<'_, ParsedMessage>> {
        match &self.content {
            MessageContent::Raw(bytes) => Ok(Cow::Owned(mime::parse_raw(bytes)?)),
            MessageContent::Parsed(parsed) => Ok(Cow::Borrowed(parsed)),
        }
    }

    /// Wire-format bytes, serializing the parsed form when no raw payload exists
    pub fn wire_bytes(&self) -> Cow<'_, [u8]> {
        match &self.content {
            MessageContent::Raw(bytes) => Cow::Borrowed(bytes),
            MessageContent::Parsed(parsed) => Cow::Owned(mime::serialize(parsed)),
        }
    }
}
