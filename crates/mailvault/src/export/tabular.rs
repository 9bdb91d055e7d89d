//! CSV export with fixed columns

use std::fs::File;
use std::path::{Path, PathBuf};

use super::ensure_parent;
use crate::archive::MessageSink;
use crate::error::{BackupError, Result};
use crate::models::Message;

/// Header row of the CSV export
pub const CSV_COLUMNS: [&str; 8] = [
    "id",
    "from",
    "to",
    "subject",
    "date",
    "snippet",
    "labels",
    "has_attachment",
];

/// Writes one CSV row per message after a header row
pub struct CsvWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvWriter {
    /// Create the file and write the header row
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let file = File::create(path).map_err(|e| BackupError::io(path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(CSV_COLUMNS)
            .map_err(|e| csv_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }
}

impl MessageSink for CsvWriter {
    fn append(&mut self, message: &Message) -> Result<()> {
        let parsed = message.to_parsed()?;
        let date = message
            .timestamp()
            .map(|d| d.to_rfc3339())
            .unwrap_or_default();
        let has_attachment = if parsed.attachments.is_empty() {
            "false"
        } else {
            "true"
        };
        let labels = message.label_ids.join(";");

        self.writer
            .write_record([
                message.id.as_str(),
                parsed.from().unwrap_or_default(),
                parsed.to().unwrap_or_default(),
                parsed.subject().unwrap_or_default(),
                date.as_str(),
                message.snippet.as_str(),
                labels.as_str(),
                has_attachment,
            ])
            .map_err(|e| csv_error(&self.path, e))
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| BackupError::io(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| BackupError::io(&self.path, e))
    }
}

fn csv_error(path: &Path, e: csv::Error) -> BackupError {
    match e.into_kind() {
        csv::ErrorKind::Io(source) => BackupError::io(path, source),
        other => BackupError::Format(format!("CSV write to {} failed: {:?}", path.display(), other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, ThreadId};
    use tempfile::TempDir;

    #[test]
    fn test_rows_and_quoting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.csv");

        let mut sink: Box<dyn MessageSink> = Box::new(CsvWriter::create(&path).unwrap());
        let msg = Message::raw(
            MessageId::new("m1"),
            ThreadId::new("t1"),
            b"From: \"Doe, Jane\" <jane@example.com>\r\nTo: me@example.com\r\nSubject: Hello, \"world\"\r\nDate: Tue, 02 Jan 2024 10:30:00 +0000\r\n\r\nBody\r\n".to_vec(),
        )
        .unwrap()
        .with_labels(vec!["INBOX".into(), "IMPORTANT".into()])
        .with_snippet("Body");
        sink.append(&msg).unwrap();
        sink.finish().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, CSV_COLUMNS);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "m1");
        assert_eq!(&rows[0][1], "\"Doe, Jane\" <jane@example.com>");
        assert_eq!(&rows[0][3], "Hello, \"world\"");
        assert_eq!(&rows[0][4], "2024-01-02T10:30:00+00:00");
        assert_eq!(&rows[0][6], "INBOX;IMPORTANT");
        assert_eq!(&rows[0][7], "false");
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        Box::new(CsvWriter::create(&path).unwrap()).finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,from,to,subject,date,snippet,labels,has_attachment\n");
    }
}
