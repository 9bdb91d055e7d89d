//! Gmail API integration
//!
//! This module provides:
//! - Credential provider interface consumed before each run
//! - HTTP transport abstraction with a ureq implementation
//! - Paced, retrying Gmail API client for listing and retrieval
//! - Response normalization to domain models

mod auth;
mod client;
mod normalize;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{BearerToken, CredentialProvider, StaticTokenProvider};
pub use client::{AccountSession, BatchOutcome, GmailClient, MessageFormat, MessageList};
pub use normalize::normalize_message;
pub use transport::{Transport, UreqTransport};

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
    }

    /// Message resource in any of the `format` variants
    ///
    /// `raw` is only present for `format=raw`; `payload` for `full` and
    /// `metadata`.
    #[derive(Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        /// Milliseconds since the epoch, as a decimal string
        pub internal_date: Option<String>,
        pub size_estimate: Option<u64>,
        /// Base64url-encoded RFC 5322 message
        pub raw: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Message body (may be base64 encoded)
    #[derive(Debug, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub size: Option<u64>,
        pub data: Option<String>,
        /// Set when the data must be fetched separately
        pub attachment_id: Option<String>,
    }

    /// Message part; the top-level payload is a part too
    #[derive(Debug, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Response from listing labels
    #[derive(Debug, Deserialize, Serialize)]
    pub struct ListLabelsResponse {
        pub labels: Option<Vec<GmailLabel>>,
    }

    /// Label resource
    #[derive(Debug, Deserialize, Serialize)]
    pub struct GmailLabel {
        pub id: String,
        pub name: String,
        /// "system" or "user"
        #[serde(rename = "type")]
        pub label_type: Option<String>,
    }
}
