//! Gmail API response normalization
//!
//! Converts Gmail message resources to domain [`Message`]s: raw resources
//! keep their verbatim bytes, payload resources are walked into a
//! [`ParsedMessage`].

use base64::prelude::*;

use super::api::{GmailMessage, MessagePart};
use crate::error::ApiError;
use crate::mime::{decode_encoded_words, parse_date};
use crate::models::{
    Attachment, AttachmentContent, Headers, Message, MessageId, ParsedMessage, ThreadId,
};

/// Normalize a Gmail API message resource
pub fn normalize_message(gmail_msg: GmailMessage) -> Result<Message, ApiError> {
    let id = MessageId::new(gmail_msg.id);
    let thread_id = ThreadId::new(gmail_msg.thread_id);

    let message = match (gmail_msg.raw, gmail_msg.payload) {
        (Some(raw), _) => {
            let bytes = decode_base64_body(&raw)
                .ok_or_else(|| ApiError::Decode(format!("message {}: invalid raw encoding", id.as_str())))?;
            Message::raw(id, thread_id, bytes).map_err(|e| ApiError::Decode(e.to_string()))?
        }
        (None, Some(payload)) => Message::parsed(id, thread_id, parse_payload(&payload)?),
        (None, None) => Message::parsed(id, thread_id, ParsedMessage::default()),
    };

    let internal_date = gmail_msg
        .internal_date
        .as_deref()
        .and_then(|d| d.parse::<i64>().ok())
        .unwrap_or(0);

    Ok(message
        .with_labels(gmail_msg.label_ids.unwrap_or_default())
        .with_snippet(decode_html_entities(&gmail_msg.snippet))
        .with_internal_date_millis(internal_date))
}

/// Walk a `format=full` payload into headers, bodies and attachments
fn parse_payload(payload: &MessagePart) -> Result<ParsedMessage, ApiError> {
    let headers: Headers = payload
        .headers
        .iter()
        .flatten()
        .map(|h| (h.name.clone(), decode_encoded_words(&h.value)))
        .collect();
    let date = headers.get("Date").and_then(parse_date);

    let mut parsed = ParsedMessage {
        headers,
        date,
        ..ParsedMessage::default()
    };
    collect_parts(payload, &mut parsed)?;
    Ok(parsed)
}

/// Recursively collect leaf parts
fn collect_parts(part: &MessagePart, out: &mut ParsedMessage) -> Result<(), ApiError> {
    if let Some(parts) = part.parts.as_deref()
        && !parts.is_empty()
    {
        for sub in parts {
            collect_parts(sub, out)?;
        }
        return Ok(());
    }

    let mime_type = part
        .mime_type
        .as_deref()
        .unwrap_or("text/plain")
        .to_ascii_lowercase();
    if mime_type.starts_with("multipart/") {
        return Ok(());
    }

    let body = part.body.as_ref();
    let data = body.and_then(|b| b.data.as_deref());
    let filename = part.filename.as_deref().filter(|f| !f.is_empty());
    let is_attachment = filename.is_some()
        || body.is_some_and(|b| b.attachment_id.is_some())
        || !(mime_type.starts_with("text/plain") || mime_type.starts_with("text/html"));

    if is_attachment {
        let content = match data {
            Some(data) => AttachmentContent::Data(decode_part(data)?),
            None => AttachmentContent::Omitted {
                size: body.and_then(|b| b.size).unwrap_or(0),
            },
        };
        out.attachments.push(Attachment {
            filename: filename.map(decode_encoded_words).unwrap_or_default(),
            mime_type,
            content,
        });
        return Ok(());
    }

    let Some(data) = data else {
        return Ok(());
    };
    let text = String::from_utf8_lossy(&decode_part(data)?).into_owned();
    if mime_type.starts_with("text/html") {
        out.html.get_or_insert(text);
    } else {
        out.text.get_or_insert(text);
    }
    Ok(())
}

fn decode_part(data: &str) -> Result<Vec<u8>, ApiError> {
    decode_base64_body(data).ok_or_else(|| ApiError::Decode("invalid part body encoding".to_string()))
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
fn decode_base64_body(data: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders.iter().find_map(|decoder| decoder.decode(data).ok())
}

/// Decode HTML entities in snippet text
fn decode_html_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
