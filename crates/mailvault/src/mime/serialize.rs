//! Wire serialization of parsed messages

use std::hash::{DefaultHasher, Hash, Hasher};

use super::encoding::{
    CRLF, base64_lines, encode_header_value, is_7bit_safe, mime_param, to_crlf,
};
use crate::models::{Attachment, AttachmentContent, ParsedMessage};

/// MIME tree about to be written
enum Entity<'a> {
    Text {
        subtype: &'static str,
        body: &'a str,
    },
    Attachment(&'a Attachment),
    Multipart {
        subtype: &'static str,
        boundary: String,
        parts: Vec<Entity<'a>>,
    },
}

/// Serialize a parsed message into RFC 5322 bytes
///
/// Content headers keep their order; MIME structural headers are
/// regenerated to match the emitted body layout.
pub fn serialize(msg: &ParsedMessage) -> Vec<u8> {
    let mut out = String::new();

    for header in msg.headers.content_headers() {
        push_header(&mut out, &header.name, &encode_header_value(&header.name, &header.value));
    }
    if msg.headers.get("Date").is_none()
        && let Some(date) = msg.date
    {
        push_header(&mut out, "Date", &date.to_rfc2822());
    }
    push_header(&mut out, "MIME-Version", "1.0");

    let seed = boundary_seed(msg);
    write_entity(&mut out, &build_tree(msg, &seed));
    out.into_bytes()
}

fn build_tree<'a>(msg: &'a ParsedMessage, seed: &str) -> Entity<'a> {
    let body = match (msg.text.as_deref(), msg.html.as_deref()) {
        (Some(text), Some(html)) => Entity::Multipart {
            subtype: "alternative",
            boundary: format!("{}_alt", seed),
            parts: vec![
                Entity::Text {
                    subtype: "plain",
                    body: text,
                },
                Entity::Text {
                    subtype: "html",
                    body: html,
                },
            ],
        },
        (None, Some(html)) => Entity::Text {
            subtype: "html",
            body: html,
        },
        (Some(text), None) => Entity::Text {
            subtype: "plain",
            body: text,
        },
        (None, None) => Entity::Text {
            subtype: "plain",
            body: "",
        },
    };

    if msg.attachments.is_empty() {
        return body;
    }

    let mut parts = vec![body];
    parts.extend(msg.attachments.iter().map(Entity::Attachment));
    Entity::Multipart {
        subtype: "mixed",
        boundary: format!("{}_mix", seed),
        parts,
    }
}

/// Write an entity's MIME headers, the blank separator line and its body
fn write_entity(out: &mut String, entity: &Entity<'_>) {
    match entity {
        Entity::Text { subtype, body } => {
            let body = to_crlf(body);
            push_header(out, "Content-Type", &format!("text/{}; charset=utf-8", subtype));
            if is_7bit_safe(&body) {
                push_header(out, "Content-Transfer-Encoding", "7bit");
                out.push_str(CRLF);
                out.push_str(&body);
                if !body.is_empty() && !body.ends_with(CRLF) {
                    out.push_str(CRLF);
                }
            } else {
                push_header(out, "Content-Transfer-Encoding", "base64");
                out.push_str(CRLF);
                out.push_str(&base64_lines(body.as_bytes()));
            }
        }
        Entity::Attachment(attachment) => {
            let mime_type = if attachment.mime_type.is_empty() {
                "application/octet-stream"
            } else {
                attachment.mime_type.as_str()
            };
            let mut content_type = mime_type.to_string();
            let mut disposition = "attachment".to_string();
            if !attachment.filename.is_empty() {
                content_type.push_str("; ");
                content_type.push_str(&mime_param("name", &attachment.filename));
                disposition.push_str("; ");
                disposition.push_str(&mime_param("filename", &attachment.filename));
            }
            push_header(out, "Content-Type", &content_type);
            push_header(out, "Content-Disposition", &disposition);
            push_header(out, "Content-Transfer-Encoding", "base64");
            out.push_str(CRLF);
            // Attachments known only by size are written as empty parts
            if let AttachmentContent::Data(data) = &attachment.content {
                out.push_str(&base64_lines(data));
            }
        }
        Entity::Multipart {
            subtype,
            boundary,
            parts,
        } => {
            push_header(
                out,
                "Content-Type",
                &format!("multipart/{}; boundary=\"{}\"", subtype, boundary),
            );
            out.push_str(CRLF);
            for part in parts {
                out.push_str("--");
                out.push_str(boundary);
                out.push_str(CRLF);
                write_entity(out, part);
            }
            out.push_str("--");
            out.push_str(boundary);
            out.push_str("--");
            out.push_str(CRLF);
        }
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(CRLF);
}

/// Deterministic boundary prefix derived from the message content
///
/// Starts with `=_`, which cannot appear in 7bit text bodies and never
/// appears in base64 output.
fn boundary_seed(msg: &ParsedMessage) -> String {
    let mut hasher = DefaultHasher::new();
    for header in msg.headers.iter() {
        header.name.hash(&mut hasher);
        header.value.hash(&mut hasher);
    }
    msg.text.hash(&mut hasher);
    msg.html.hash(&mut hasher);
    msg.attachments.len().hash(&mut hasher);
    format!("=_mv{:016x}", hasher.finish())
}
