//! Mailbox archive codec
//!
//! Archives use the mboxrd flavour of the mbox format: every message is
//! preceded by a `From ` separator line, body lines matching `^>*From `
//! gain one `>` on write and lose it on read, and a blank line follows each
//! message.

mod reader;
mod writer;

pub use reader::{MboxReader, read_all};
pub use writer::MboxWriter;

use crate::error::Result;
use crate::models::Message;

/// Destination a run streams messages into
///
/// Implemented by the mbox writer and by every export codec, so the
/// orchestrator can fan out the writing phase without knowing the format.
pub trait MessageSink {
    /// Write one message
    fn append(&mut self, message: &Message) -> Result<()>;

    /// Flush everything to disk and release the destination
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Whether `line` is escaped or needs escaping under mboxrd (`^>*From `)
fn is_from_line(line: &[u8]) -> bool {
    let unquoted = line.iter().position(|&b| b != b'>').map_or(&[][..], |i| &line[i..]);
    unquoted.starts_with(b"From ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_line_detection() {
        assert!(is_from_line(b"From someone\n"));
        assert!(is_from_line(b">From someone\n"));
        assert!(is_from_line(b">>>From someone\n"));
        assert!(!is_from_line(b"From: header\n"));
        assert!(!is_from_line(b" From indented\n"));
        assert!(!is_from_line(b">>>\n"));
    }
}
