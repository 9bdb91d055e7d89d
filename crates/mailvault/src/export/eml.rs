//! One `.eml` file per message

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::MessageSink;
use crate::error::{BackupError, Result};
use crate::models::Message;

/// Directory receiving `<id>.eml` files in wire format
///
/// Ids are reduced to `[A-Za-z0-9_-]` for the file name. When that name is
/// already taken the file becomes `<id>-1.eml`, `<id>-2.eml`, ...; existing
/// files are never overwritten.
pub struct EmlDirectory {
    dir: PathBuf,
}

impl EmlDirectory {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| BackupError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn file_for(&self, message: &Message) -> PathBuf {
        let name: String = message
            .id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        let mut path = self.dir.join(format!("{}.eml", name));
        let mut suffix = 0;
        while path.exists() {
            suffix += 1;
            path = self.dir.join(format!("{}-{}.eml", name, suffix));
        }
        path
    }
}

impl MessageSink for EmlDirectory {
    fn append(&mut self, message: &Message) -> Result<()> {
        if message.id.as_str().is_empty() {
            return Err(BackupError::InvalidMessage("message without id".to_string()));
        }
        let path = self.file_for(message);

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("eml.tmp");
        fs::write(&temp_path, message.wire_bytes()).map_err(|e| BackupError::io(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| BackupError::io(&path, e))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, ThreadId};
    use tempfile::TempDir;

    #[test]
    fn test_writes_one_file_per_message() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("eml_export");
        let mut sink = EmlDirectory::create(&out).unwrap();

        let raw = b"Subject: one\r\n\r\nbody\r\n";
        let msg = Message::raw(MessageId::new("18c/9a"), ThreadId::new("t"), raw.to_vec()).unwrap();
        sink.append(&msg).unwrap();
        Box::new(sink).finish().unwrap();

        let written = fs::read(out.join("18c_9a.eml")).unwrap();
        assert_eq!(written, raw);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn test_colliding_names_keep_both_messages() {
        let dir = TempDir::new().unwrap();
        let mut sink = EmlDirectory::create(dir.path()).unwrap();

        let first = b"Subject: slash\r\n\r\nfirst\r\n";
        let second = b"Subject: underscore\r\n\r\nsecond\r\n";
        let third = b"Subject: again\r\n\r\nthird\r\n";
        for (id, raw) in [("a/b", &first[..]), ("a_b", &second[..]), ("a.b", &third[..])] {
            let msg = Message::raw(MessageId::new(id), ThreadId::new("t"), raw.to_vec()).unwrap();
            sink.append(&msg).unwrap();
        }
        Box::new(sink).finish().unwrap();

        assert_eq!(fs::read(dir.path().join("a_b.eml")).unwrap(), first);
        assert_eq!(fs::read(dir.path().join("a_b-1.eml")).unwrap(), second);
        assert_eq!(fs::read(dir.path().join("a_b-2.eml")).unwrap(), third);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m1.eml"), b"kept").unwrap();
        let mut sink = EmlDirectory::create(dir.path()).unwrap();

        let raw = b"Subject: new\r\n\r\nbody\r\n";
        let msg = Message::raw(MessageId::new("m1"), ThreadId::new("t"), raw.to_vec()).unwrap();
        sink.append(&msg).unwrap();

        assert_eq!(fs::read(dir.path().join("m1.eml")).unwrap(), b"kept");
        assert_eq!(fs::read(dir.path().join("m1-1.eml")).unwrap(), raw);
    }
}
