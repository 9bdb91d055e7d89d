//! Append-only mbox writer

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{MessageSink, is_from_line};
use crate::error::{BackupError, Result};
use crate::models::Message;

/// Sender used when a message has no usable From address
const UNKNOWN_SENDER: &str = "MAILER-DAEMON";

/// Scoped handle on an mbox file opened for appending
///
/// Each [`append`](Self::append) writes one complete entry and flushes it,
/// so an interrupted run leaves whole messages followed by at most one
/// truncated tail. [`close`](Self::close) consumes the writer.
#[derive(Debug)]
pub struct MboxWriter {
    path: PathBuf,
    file: File,
    count: usize,
}

impl MboxWriter {
    /// Open `path` for appending, creating it and its parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| BackupError::io(&path, e))?;

        // A previous run may have stopped mid-line
        if ends_mid_line(&mut file).map_err(|e| BackupError::io(&path, e))? {
            file.write_all(b"\n\n").map_err(|e| BackupError::io(&path, e))?;
        }

        Ok(Self {
            path,
            file,
            count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Messages appended through this handle
    pub fn count(&self) -> usize {
        self.count
    }

    /// Append one message
    ///
    /// Raw messages are written verbatim (apart from `From ` escaping);
    /// parsed ones are serialized first.
    pub fn append(&mut self, message: &Message) -> Result<()> {
        let sender = message
            .sender()
            .filter(|addr| addr.is_valid())
            .map(|addr| addr.email);
        let timestamp = message.timestamp().unwrap_or_else(Utc::now);
        let wire = message.wire_bytes();

        let mut entry = Vec::with_capacity(wire.len() + 128);
        entry.extend_from_slice(separator_line(sender.as_deref(), timestamp).as_bytes());
        escape_into(&mut entry, &wire);
        if !entry.ends_with(b"\n") {
            entry.push(b'\n');
        }
        entry.push(b'\n');

        self.file
            .write_all(&entry)
            .and_then(|_| self.file.flush())
            .map_err(|e| BackupError::io(&self.path, e))?;
        self.count += 1;
        Ok(())
    }

    /// Flush and sync the file, returning the number of messages appended
    pub fn close(mut self) -> Result<usize> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_all())
            .map_err(|e| BackupError::io(&self.path, e))?;
        Ok(self.count)
    }
}

impl MessageSink for MboxWriter {
    fn append(&mut self, message: &Message) -> Result<()> {
        MboxWriter::append(self, message)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.close().map(|_| ())
    }
}

/// `From <sender>  <asctime>` followed by a newline
pub(crate) fn separator_line(sender: Option<&str>, timestamp: DateTime<Utc>) -> String {
    format!(
        "From {}  {}\n",
        sender.unwrap_or(UNKNOWN_SENDER),
        timestamp.format("%a %b %e %H:%M:%S %Y")
    )
}

/// Copy `wire` into `out`, quoting every `^>*From ` line with one more `>`
fn escape_into(out: &mut Vec<u8>, wire: &[u8]) {
    for line in wire.split_inclusive(|&b| b == b'\n') {
        if is_from_line(line) {
            out.push(b'>');
        }
        out.extend_from_slice(line);
    }
}

fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
