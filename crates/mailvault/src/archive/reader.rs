//! Streaming mbox reader

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::is_from_line;
use crate::error::{BackupError, Result};

/// Open an mbox archive and iterate over its messages
///
/// Each item is the raw bytes of one message with `From ` escaping undone
/// and the trailing separator blank line removed.
pub fn read_all(path: impl AsRef<Path>) -> Result<MboxReader<BufReader<File>>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| BackupError::io(path, e))?;
    Ok(MboxReader::new(BufReader::new(file)))
}

/// Lazy iterator over the messages of an mbox stream
///
/// Bytes before the first separator line yield a single
/// [`BackupError::Format`] item; reading then continues with the next
/// message.
pub struct MboxReader<R> {
    reader: R,
    /// Message being accumulated; None before the first separator
    current: Option<Vec<u8>>,
    /// Non-blank content seen before the first separator
    leading_garbage: bool,
    line: Vec<u8>,
    finished: bool,
}

impl<R: BufRead> MboxReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            current: None,
            leading_garbage: false,
            line: Vec::new(),
            finished: false,
        }
    }

    fn garbage_error() -> BackupError {
        BackupError::Format("archive does not start with a From separator line".to_string())
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.line.clear();
            let read = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(BackupError::Format(format!("failed to read archive: {}", e))));
                }
            };

            if read == 0 {
                self.finished = true;
                if let Some(message) = self.current.take() {
                    return Some(Ok(finish_message(message)));
                }
                if self.leading_garbage {
                    return Some(Err(Self::garbage_error()));
                }
                return None;
            }

            if self.line.starts_with(b"From ") {
                match self.current.replace(Vec::new()) {
                    Some(message) => return Some(Ok(finish_message(message))),
                    None if self.leading_garbage => {
                        self.leading_garbage = false;
                        return Some(Err(Self::garbage_error()));
                    }
                    None => continue,
                }
            }

            match self.current.as_mut() {
                Some(message) => {
                    let unescaped = if self.line.starts_with(b">") && is_from_line(&self.line) {
                        &self.line[1..]
                    } else {
                        &self.line[..]
                    };
                    message.extend_from_slice(unescaped);
                }
                None => {
                    if !self.line.iter().all(u8::is_ascii_whitespace) {
                        self.leading_garbage = true;
                    }
                }
            }
        }
    }
}

/// Drop the blank line the writer puts after every message
fn finish_message(mut message: Vec<u8>) -> Vec<u8> {
    if message.ends_with(b"\n\n") {
        message.pop();
    }
    message
}
