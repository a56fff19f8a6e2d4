//! Storage for sanitized records.
//!
//! The crawl writes through [`RecordSink`]; the production sink is the
//! gzip JSONL [`DurableAppendLog`].
//!
//! ## Artifact
//!
//! ```text
//! data/raw/
//! └── reddit_child_injury_YYYYMMDD.jsonl.gz   # one gzip member per record
//! ```

pub mod local;
pub mod reader;

use crate::error::Result;
use crate::models::SanitizedRecord;

// Re-export for convenience
pub use local::{DurableAppendLog, StagedBlock};
pub use reader::{LogReader, parse_record};

/// Destination for records produced by a crawl.
pub trait RecordSink {
    /// Persist one record. Records must land in call order.
    fn append_record(&mut self, record: &SanitizedRecord) -> Result<()>;

    /// Human-readable location for logs and summaries.
    fn location(&self) -> String;
}
