//! Domain models for mail entities

mod backup_state;
mod label;
mod message;
mod parsed;

pub use backup_state::{BackupState, BackupType};
pub use label::{Label, LabelId};
pub use message::{EmailAddress, Message, MessageContent, MessageId, ThreadId};
pub use parsed::{Attachment, AttachmentContent, Header, Headers, ParsedMessage, is_structural};
