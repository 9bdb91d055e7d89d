//! Header and body encoding helpers for the wire serializer

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::models::EmailAddress;

pub(crate) const CRLF: &str = "\r\n";

/// Base64 output line length mandated by RFC 2045
const BASE64_LINE: usize = 76;

/// Longest UTF-8 chunk per encoded word, keeping each word under 75 chars
const WORD_CHUNK: usize = 45;

/// RFC 5322 hard line limit, excluding CRLF
const MAX_LINE: usize = 998;

const ADDRESS_HEADERS: &[&str] = &[
    "from",
    "to",
    "cc",
    "bcc",
    "reply-to",
    "sender",
    "resent-from",
    "resent-to",
    "resent-cc",
];

/// Characters that force a display name into a quoted string
const NAME_SPECIALS: &[char] = &[',', ';', ':', '<', '>', '@', '"', '(', ')', '[', ']', '\\'];

/// Encode a header value for the wire
///
/// ASCII values pass through untouched. Non-ASCII address headers encode
/// only the display names so the addresses stay machine-readable.
pub fn encode_header_value(name: &str, value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let is_address = ADDRESS_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name));
    if !is_address {
        return encode_words(value);
    }

    EmailAddress::parse_list(value)
        .iter()
        .map(encode_address)
        .collect::<Vec<_>>()
        .join(", ")
}

fn encode_address(addr: &EmailAddress) -> String {
    match addr.name.as_deref() {
        None => addr.email.clone(),
        Some(name) if !name.is_ascii() => format!("{} <{}>", encode_words(name), addr.email),
        Some(name) if name.contains(NAME_SPECIALS) => {
            format!("\"{}\" <{}>", name.replace('\\', "\\\\").replace('"', "\\\""), addr.email)
        }
        Some(_) => addr.display(),
    }
}

/// RFC 2047 B-encoding, split into folded words on char boundaries
pub fn encode_words(value: &str) -> String {
    let mut words = Vec::new();
    let mut chunk = String::new();

    for c in value.chars() {
        if chunk.len() + c.len_utf8() > WORD_CHUNK {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }

    words.join("\r\n ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk))
}

/// Base64 body wrapped at 76 columns, each line CRLF-terminated
pub fn base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);
    for line in encoded.as_bytes().chunks(BASE64_LINE) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str(CRLF);
    }
    out
}

/// Normalize line endings to CRLF
pub fn to_crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', CRLF)
}

/// Whether text can be sent as 7bit without re-encoding
///
/// Text containing `--=_` is base64-encoded so it can never collide with a
/// generated boundary delimiter.
pub fn is_7bit_safe(text: &str) -> bool {
    text.is_ascii()
        && !text.contains('\0')
        && !text.contains("--=_")
        && text.split(CRLF).all(|line| line.len() <= MAX_LINE && !line.contains('\r'))
}

/// Quote a MIME parameter value, or RFC 2231-encode it when non-ASCII
pub fn mime_param(key: &str, value: &str) -> String {
    if value.is_ascii() {
        format!("{}=\"{}\"", key, value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        format!("{}*=utf-8''{}", key, urlencoding::encode(value))
    }
}
