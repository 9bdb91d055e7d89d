//! Raw RFC 5322 message parsing
//!
//! Uses mailparse for header decoding (including RFC 2047 encoded words),
//! charsets and transfer encodings, then walks the MIME tree.

use chrono::{DateTime, TimeZone, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use crate::error::Result;
use crate::models::{Attachment, Headers, ParsedMessage};

/// Parse wire-format bytes into headers, bodies and attachments
pub fn parse_raw(bytes: &[u8]) -> Result<ParsedMessage> {
    let mail = mailparse::parse_mail(bytes)?;

    let headers: Headers = mail
        .headers
        .iter()
        .map(|h| (h.get_key(), h.get_value()))
        .collect();
    let date = headers.get("Date").and_then(parse_date);

    let mut parsed = ParsedMessage {
        headers,
        date,
        ..ParsedMessage::default()
    };
    collect_parts(&mail, &mut parsed)?;
    Ok(parsed)
}

/// Recursively walk the MIME tree collecting bodies and attachments
///
/// The first text/plain and text/html leaves without a filename are the
/// bodies; any other leaf with a filename, an attachment disposition or a
/// non-text type is an attachment.
fn collect_parts(part: &ParsedMail<'_>, out: &mut ParsedMessage) -> Result<()> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, out)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();
    let mime_type = part.ctype.mimetype.to_ascii_lowercase();
    let is_body_type = mime_type == "text/plain" || mime_type == "text/html";

    if matches!(disposition.disposition, DispositionType::Attachment)
        || filename.is_some()
        || !is_body_type
    {
        out.attachments.push(Attachment::new(
            filename.unwrap_or_default(),
            mime_type,
            part.get_body_raw()?,
        ));
        return Ok(());
    }

    if mime_type == "text/plain" && out.text.is_none() {
        out.text = Some(part.get_body()?);
    } else if mime_type == "text/html" && out.html.is_none() {
        out.html = Some(part.get_body()?);
    }
    Ok(())
}

/// First decoded value of `name` from the header block of `bytes`
///
/// Only the header section is parsed; the body is never decoded.
pub fn raw_header(bytes: &[u8], name: &str) -> Option<String> {
    let (headers, _) = mailparse::parse_headers(bytes).ok()?;
    headers.get_first_value(name)
}

/// Parse an RFC 2822 date
///
/// Strict RFC 2822 first, then mailparse's lenient parser for the sloppy
/// dates real mail carries. The lenient parser answers 0 for input it cannot
/// read, so the epoch is only accepted when the value names 1970.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    let timestamp = mailparse::dateparse(value).ok()?;
    if timestamp == 0 && !value.contains("1970") {
        return None;
    }
    Utc.timestamp_opt(timestamp, 0).single()
}

/// Decode RFC 2047 encoded words in a header value
///
/// Gmail's `full` format returns header values still carrying encoded
/// words; mailparse decodes them when given a complete header line.
pub fn decode_encoded_words(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }

    let mut line = b"X: ".to_vec();
    line.extend_from_slice(value.as_bytes());
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((header, _)) => header.get_value(),
        Err(_) => value.to_string(),
    }
}
