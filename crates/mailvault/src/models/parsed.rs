//! Parsed message form: ordered headers, bodies and attachments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Headers regenerated by the serializer and ignored by content comparison
const STRUCTURAL_HEADERS: &[&str] = &[
    "mime-version",
    "content-type",
    "content-transfer-encoding",
    "content-disposition",
];

/// Email header (name-value pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Ordered header list
///
/// Lookups are case-insensitive; duplicates keep their original order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for `name` in original order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Headers that describe content rather than MIME structure
    pub fn content_headers(&self) -> impl Iterator<Item = &Header> {
        self.0.iter().filter(|h| !is_structural(&h.name))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.push(name, value);
        }
        headers
    }
}

/// Whether a header is one of the MIME structural headers
pub fn is_structural(name: &str) -> bool {
    STRUCTURAL_HEADERS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(name))
}

/// Attachment payload, or only its size when the provider omitted the data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentContent {
    Data(Vec<u8>),
    Omitted { size: u64 },
}

/// A file attached to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub content: AttachmentContent,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content: AttachmentContent::Data(data),
        }
    }

    /// Size in bytes of the (possibly omitted) payload
    pub fn size(&self) -> u64 {
        match &self.content {
            AttachmentContent::Data(data) => data.len() as u64,
            AttachmentContent::Omitted { size } => *size,
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        match &self.content {
            AttachmentContent::Data(data) => Some(data),
            AttachmentContent::Omitted { .. } => None,
        }
    }
}

/// Decoded message structure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    pub headers: Headers,
    /// Plain-text body
    pub text: Option<String>,
    /// HTML body
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Parsed Date header
    pub date: Option<DateTime<Utc>>,
}

impl ParsedMessage {
    pub fn from(&self) -> Option<&str> {
        self.headers.get("From")
    }

    pub fn to(&self) -> Option<&str> {
        self.headers.get("To")
    }

    pub fn subject(&self) -> Option<&str> {
        self.headers.get("Subject")
    }

    /// Semantic equality used for round-trip checks
    ///
    /// Compares content headers in order (names case-insensitively), bodies
    /// after line-ending normalization, and attachment names and types.
    /// Structural MIME headers, transfer encodings and folding are ignored.
    pub fn same_content(&self, other: &ParsedMessage) -> bool {
        let headers_match = self
            .headers
            .content_headers()
            .map(|h| (h.name.to_ascii_lowercase(), h.value.trim()))
            .eq(other
                .headers
                .content_headers()
                .map(|h| (h.name.to_ascii_lowercase(), h.value.trim())));

        let attachments_match = self.attachments.len() == other.attachments.len()
            && self
                .attachments
                .iter()
                .zip(&other.attachments)
                .all(|(a, b)| a.filename == b.filename && a.mime_type.eq_ignore_ascii_case(&b.mime_type));

        headers_match
            && normalize_body(self.text.as_deref()) == normalize_body(other.text.as_deref())
            && normalize_body(self.html.as_deref()) == normalize_body(other.html.as_deref())
            && attachments_match
    }
}

/// Normalize a body for comparison: LF line endings, no trailing newlines
fn normalize_body(body: Option<&str>) -> Option<String> {
    let body = body?.replace("\r\n", "\n");
    let trimmed = body.trim_end_matches('\n');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
