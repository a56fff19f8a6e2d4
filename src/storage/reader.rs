//! Streaming reader for append logs.
//!
//! Offline tooling only: the crawl itself never reads its log back.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{SCHEMA_VERSION, SanitizedRecord};

/// Iterates the records of a `.jsonl.gz` (or plain `.jsonl`) log in append order.
pub struct LogReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
}

impl LogReader<Box<dyn Read>> {
    /// Open a log file, decoding every gzip member when the name ends in `.gz`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let reader: Box<dyn Read> = match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => {
                log::debug!("Opening gzip log {}", path.display());
                Box::new(MultiGzDecoder::new(file))
            }
            _ => Box::new(file),
        };
        Ok(Self::new(reader))
    }
}

impl<R: Read> LogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
        }
    }
}

/// Decode one log line, dispatching on its `schema_version`.
pub fn parse_record(line: &str) -> Result<SanitizedRecord> {
    let value: Value = serde_json::from_str(line)?;
    let version = value
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| AppError::malformed("record has no schema_version"))?;

    match version {
        v if v == SCHEMA_VERSION as u64 => Ok(serde_json::from_value(value)?),
        other => Err(AppError::malformed(format!(
            "unsupported schema_version {other}"
        ))),
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<SanitizedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();

        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(parse_record(trimmed).map_err(|e| {
                        AppError::malformed(format!("line {}: {}", self.line_number, e))
                    }));
                }
                Err(e) => return Some(Err(AppError::Io(e))),
            }
        }
    }
}
