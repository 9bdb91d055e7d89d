//! In-memory Gmail API stand-in for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use base64::prelude::*;
use serde_json::json;
use url::Url;

use super::transport::Transport;
use crate::error::ApiError;
use crate::mime;

/// Wire bytes of the `i`-th synthetic message
pub(crate) fn sample_raw(i: usize) -> Vec<u8> {
    format!(
        "From: Sender {i} <sender{i}@example.com>\r\n\
         To: me@example.com\r\n\
         Subject: Message {i}\r\n\
         Date: Mon, 01 Jan 2024 12:{:02}:00 +0000\r\n\
         \r\n\
         Body of message {i}\r\n\
         From the desk of sender {i}\r\n",
        i % 60
    )
    .into_bytes()
}

struct FakeMessage {
    id: String,
    raw: Vec<u8>,
    /// Listed but answering 404 on retrieval
    deleted: bool,
}

#[derive(Default)]
struct State {
    messages: Vec<FakeMessage>,
    /// Error responses for upcoming calls, keyed by message id or "list"
    scripted: HashMap<String, VecDeque<(u16, String)>>,
    requests: Vec<Url>,
}

/// Mailbox served over the [`Transport`] trait
#[derive(Default)]
pub(crate) struct FakeMailbox {
    state: Mutex<State>,
}

impl FakeMailbox {
    pub const BASE_URL: &'static str = "https://fake.test/gmail/v1";

    /// Mailbox with ids `m0000`, `m0001`, ... holding [`sample_raw`] bodies
    pub fn with_messages(count: usize) -> Self {
        let mailbox = Self::default();
        for i in 0..count {
            mailbox.add(&format!("m{:04}", i), sample_raw(i));
        }
        mailbox
    }

    pub fn add(&self, id: &str, raw: Vec<u8>) {
        self.lock().messages.push(FakeMessage {
            id: id.to_string(),
            raw,
            deleted: false,
        });
    }

    /// Keep `id` in listings but make retrieval answer 404
    pub fn remove(&self, id: &str) {
        for message in self.lock().messages.iter_mut().filter(|m| m.id == id) {
            message.deleted = true;
        }
    }

    /// Answer the next calls for `key` (a message id, or "list") with `statuses`
    pub fn fail_next(&self, key: &str, statuses: &[u16]) {
        self.lock()
            .scripted
            .entry(key.to_string())
            .or_default()
            .extend(statuses.iter().map(|&status| (status, String::new())));
    }

    /// Answer the next call for `key` with `status` and a JSON error body
    pub fn fail_next_with(&self, key: &str, status: u16, body: &str) {
        self.lock()
            .scripted
            .entry(key.to_string())
            .or_default()
            .push_back((status, body.to_string()));
    }

    pub fn list_calls(&self) -> usize {
        self.requests_matching(|segments| segments == ["messages"])
    }

    pub fn get_calls(&self, id: &str) -> usize {
        self.requests_matching(|segments| segments == ["messages", id])
    }

    /// `q` parameters of every list call, in order
    pub fn queries(&self) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .filter_map(|url| query_param(url, "q"))
            .collect()
    }

    fn requests_matching(&self, pred: impl Fn(&[&str]) -> bool) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|url| pred(&resource_segments(url)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn list_page(state: &State, url: &Url) -> serde_json::Value {
        let offset: usize = query_param(url, "pageToken")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let page_size: usize = query_param(url, "maxResults")
            .and_then(|m| m.parse().ok())
            .unwrap_or(100);

        let page: Vec<_> = state
            .messages
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|m| json!({"id": m.id, "threadId": format!("t-{}", m.id)}))
            .collect();
        let next = offset + page.len();

        let mut body = json!({"messages": page, "resultSizeEstimate": state.messages.len()});
        if next < state.messages.len() {
            body["nextPageToken"] = json!(next.to_string());
        }
        body
    }

    fn get_message(state: &State, url: &Url, id: &str) -> Result<serde_json::Value, ApiError> {
        let message = state
            .messages
            .iter()
            .find(|m| m.id == id && !m.deleted)
            .ok_or_else(|| ApiError::from_status(404, url.as_str()))?;

        let parsed = mime::parse_raw(&message.raw).map_err(|e| ApiError::Decode(e.to_string()))?;
        let mut body = json!({
            "id": message.id,
            "threadId": format!("t-{}", message.id),
            "labelIds": ["INBOX"],
            "snippet": parsed.text.as_deref().unwrap_or_default().lines().next().unwrap_or_default(),
            "sizeEstimate": message.raw.len(),
        });
        if let Some(date) = parsed.date {
            body["internalDate"] = json!(date.timestamp_millis().to_string());
        }

        if query_param(url, "format").as_deref() == Some("raw") {
            body["raw"] = json!(BASE64_URL_SAFE.encode(&message.raw));
        } else {
            let headers: Vec<_> = parsed
                .headers
                .iter()
                .map(|h| json!({"name": h.name, "value": h.value}))
                .collect();
            body["payload"] = json!({
                "mimeType": "text/plain",
                "headers": headers,
                "body": {"data": BASE64_URL_SAFE.encode(parsed.text.unwrap_or_default())},
            });
        }
        Ok(body)
    }
}

impl Transport for FakeMailbox {
    fn get(&self, url: &str, _bearer: &str) -> Result<String, ApiError> {
        let parsed = Url::parse(url).map_err(|e| ApiError::Transport(e.to_string()))?;
        let mut state = self.lock();
        state.requests.push(parsed.clone());

        let segments = resource_segments(&parsed);
        let key = match segments.as_slice() {
            ["messages"] => "list",
            ["messages", id] => *id,
            _ => "other",
        };
        if let Some((status, body)) = state.scripted.get_mut(key).and_then(VecDeque::pop_front) {
            return Err(ApiError::from_response(status, url, &body));
        }

        let body = match segments.as_slice() {
            ["messages"] => Self::list_page(&state, &parsed),
            ["messages", id] => Self::get_message(&state, &parsed, id)?,
            ["labels"] => json!({"labels": [
                {"id": "INBOX", "name": "INBOX", "type": "system"},
                {"id": "SENT", "name": "SENT", "type": "system"},
                {"id": "Label_1", "name": "Receipts", "type": "user"},
            ]}),
            _ => return Err(ApiError::from_status(400, url)),
        };
        Ok(body.to_string())
    }
}

/// Path segments after `/users/<account>/`
fn resource_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.skip_while(|s| *s != "users").skip(2).collect())
        .unwrap_or_default()
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
