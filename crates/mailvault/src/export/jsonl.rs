//! Line-delimited JSON export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ensure_parent;
use crate::archive::MessageSink;
use crate::error::{BackupError, Result};
use crate::models::{Headers, Message};

#[derive(Serialize)]
struct Record<'a> {
    id: &'a str,
    thread_id: &'a str,
    label_ids: &'a [String],
    snippet: &'a str,
    date: Option<DateTime<Utc>>,
    from: Option<&'a str>,
    to: Option<&'a str>,
    subject: Option<&'a str>,
    headers: &'a Headers,
    body: Body<'a>,
    attachments: Vec<AttachmentMeta<'a>>,
}

#[derive(Serialize)]
struct Body<'a> {
    text: Option<&'a str>,
    html: Option<&'a str>,
}

#[derive(Serialize)]
struct AttachmentMeta<'a> {
    filename: &'a str,
    mime_type: &'a str,
    size: u64,
}

/// Writes one JSON object per message, newline-terminated
pub struct JsonlWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonlWriter {
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let file = File::create(path).map_err(|e| BackupError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }
}

impl MessageSink for JsonlWriter {
    fn append(&mut self, message: &Message) -> Result<()> {
        let parsed = message.to_parsed()?;
        let record = Record {
            id: message.id.as_str(),
            thread_id: message.thread_id.as_str(),
            label_ids: &message.label_ids,
            snippet: &message.snippet,
            date: message.timestamp(),
            from: parsed.from(),
            to: parsed.to(),
            subject: parsed.subject(),
            headers: &parsed.headers,
            body: Body {
                text: parsed.text.as_deref(),
                html: parsed.html.as_deref(),
            },
            attachments: parsed
                .attachments
                .iter()
                .map(|a| AttachmentMeta {
                    filename: &a.filename,
                    mime_type: &a.mime_type,
                    size: a.size(),
                })
                .collect(),
        };

        let mut line = serde_json::to_vec(&record)
            .map_err(|e| BackupError::Format(format!("message {}: {}", message.id.as_str(), e)))?;
        line.push(b'\n');
        self.out
            .write_all(&line)
            .map_err(|e| BackupError::io(&self.path, e))
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.out
            .flush()
            .and_then(|_| self.out.get_ref().sync_all())
            .map_err(|e| BackupError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, ThreadId};
    use tempfile::TempDir;

    #[test]
    fn test_one_object_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/export.jsonl");

        let mut sink: Box<dyn MessageSink> = Box::new(JsonlWriter::create(&path).unwrap());
        for i in 0..2 {
            let raw = format!(
                "From: s{i}@example.com\r\nTo: me@example.com\r\nSubject: Item {i}\r\n\
                 Content-Type: multipart/mixed; boundary=b\r\n\r\n\
                 --b\r\nContent-Type: text/plain\r\n\r\nbody {i}\r\n\
                 --b\r\nContent-Type: image/png; name=\"p.png\"\r\nContent-Transfer-Encoding: base64\r\n\r\niVBO\r\n--b--\r\n"
            );
            let msg = Message::raw(MessageId::new(format!("m{i}")), ThreadId::new("t"), raw.into_bytes())
                .unwrap()
                .with_labels(vec!["INBOX".into()]);
            sink.append(&msg).unwrap();
        }
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["id"], "m1");
        assert_eq!(lines[1]["subject"], "Item 1");
        assert_eq!(lines[1]["label_ids"][0], "INBOX");
        assert_eq!(lines[1]["body"]["text"].as_str().map(str::trim_end), Some("body 1"));
        assert_eq!(lines[1]["attachments"][0]["filename"], "p.png");
        assert_eq!(lines[1]["attachments"][0]["size"], 3);
        assert_eq!(lines[0]["headers"][0]["name"], "From");
    }
}
