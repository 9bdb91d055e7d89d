//! Export codecs
//!
//! Each format is a [`MessageSink`]; [`open_sink`] picks one by
//! [`ExportFormat`].

mod eml;
mod jsonl;
mod tabular;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use eml::EmlDirectory;
pub use jsonl::JsonlWriter;
pub use tabular::{CSV_COLUMNS, CsvWriter};

use crate::archive::{MboxWriter, MessageSink};
use crate::error::Result;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Single mbox archive
    Mbox,
    /// One JSON object per line
    Jsonl,
    /// Fixed-column CSV table
    Csv,
    /// Directory with one `.eml` file per message
    Eml,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Mbox,
        ExportFormat::Jsonl,
        ExportFormat::Csv,
        ExportFormat::Eml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Mbox => "mbox",
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Csv => "csv",
            ExportFormat::Eml => "eml",
        }
    }

    /// File extension of the output, or None for directory outputs
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ExportFormat::Eml => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mbox" => Ok(ExportFormat::Mbox),
            "jsonl" | "json" => Ok(ExportFormat::Jsonl),
            "csv" => Ok(ExportFormat::Csv),
            "eml" => Ok(ExportFormat::Eml),
            other => Err(format!(
                "unsupported export format: {} (expected mbox, jsonl, csv or eml)",
                other
            )),
        }
    }
}

/// Open the sink for `format` at `path`
pub fn open_sink(format: ExportFormat, path: &Path) -> Result<Box<dyn MessageSink>> {
    Ok(match format {
        ExportFormat::Mbox => Box::new(MboxWriter::open(path)?),
        ExportFormat::Jsonl => Box::new(JsonlWriter::create(path)?),
        ExportFormat::Csv => Box::new(CsvWriter::create(path)?),
        ExportFormat::Eml => Box::new(EmlDirectory::create(path)?),
    })
}

/// Create the parent directory of a file output
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| crate::error::BackupError::io(parent, e))?;
    }
    Ok(())
}
