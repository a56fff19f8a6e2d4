//! Local filesystem append log.
//!
//! Every record becomes its own gzip member: one JSON line, compressed
//! independently. Gzip readers that understand multi-member files (e.g.
//! `zcat`, `flate2::read::MultiGzDecoder`) return the lines in append order.
//!
//! ## Commit sequence
//!
//! ```text
//! 1. write member to {dir}/.append-XXXX.gz.tmp and fsync
//! 2a. target missing:  rename temp -> target
//! 2b. target present:  append temp bytes to target, fsync, delete temp
//!                      (on failure truncate target back to its old length)
//! ```
//!
//! A crash before step 2 leaves the target untouched and at most an orphan
//! staging file, which [`DurableAppendLog::remove_stale_staging`] cleans up.
//! One writer per target path is assumed; concurrent writers would
//! interleave members unpredictably and are not guarded against.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::{Compression, GzBuilder};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::models::SanitizedRecord;
use crate::storage::RecordSink;

const STAGING_PREFIX: &str = ".append-";
const STAGING_SUFFIX: &str = ".gz.tmp";

/// Crash-safe gzip JSONL appender bound to one target file.
#[derive(Debug, Clone)]
pub struct DurableAppendLog {
    target: PathBuf,
}

impl DurableAppendLog {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.target
    }

    /// Directory holding the target and its staging files.
    fn dir(&self) -> PathBuf {
        match self.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Serialize and append one record.
    pub fn append<T: Serialize + ?Sized>(&self, record: &T) -> Result<()> {
        self.stage(record)?.commit()
    }

    /// Write the record's gzip member to a staging file next to the target.
    ///
    /// Nothing visible to readers of the target changes until
    /// [`StagedBlock::commit`]; dropping the block deletes the staging file.
    pub fn stage<T: Serialize + ?Sized>(&self, record: &T) -> Result<StagedBlock<'_>> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let dir = self.dir();
        fs::create_dir_all(&dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&dir)?;

        let mut encoder = GzBuilder::new()
            .mtime(0)
            .write(temp.as_file_mut(), Compression::default());
        encoder.write_all(line.as_bytes())?;
        encoder.finish()?;
        temp.as_file().sync_all()?;

        Ok(StagedBlock { log: self, temp })
    }

    /// Delete staging files left behind by an interrupted run.
    ///
    /// Only safe while no append to this target is in flight.
    pub fn remove_stale_staging(&self) -> Result<usize> {
        let dir = self.dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(STAGING_PREFIX) && name.ends_with(STAGING_SUFFIX) {
                log::warn!("Removing stale staging file {}", entry.path().display());
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl RecordSink for DurableAppendLog {
    fn append_record(&mut self, record: &SanitizedRecord) -> Result<()> {
        self.append(record)
    }

    fn location(&self) -> String {
        self.target.display().to_string()
    }
}

/// A compressed record written to disk but not yet part of the target.
#[derive(Debug)]
pub struct StagedBlock<'a> {
    log: &'a DurableAppendLog,
    temp: NamedTempFile,
}

impl StagedBlock<'_> {
    pub fn staging_path(&self) -> &Path {
        self.temp.path()
    }

    /// Make the staged record part of the target file.
    pub fn commit(self) -> Result<()> {
        let StagedBlock { log, temp } = self;
        let target = log.path();

        if !target.try_exists()? {
            temp.persist(target).map_err(|e| e.error)?;
            sync_dir(&log.dir());
            return Ok(());
        }

        let block = fs::read(temp.path())?;
        append_bytes(target, &block)?;
        temp.close()?;
        Ok(())
    }
}

/// File operations an append needs, so tests can fail a write midway.
trait AppendTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append `bytes` to `target`, restoring the old length if the write fails.
fn append_bytes(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().append(true).open(target)?;
    append_with_rollback(&mut file, bytes, target)?;
    Ok(())
}

fn append_with_rollback<F: AppendTarget>(
    file: &mut F,
    bytes: &[u8],
    target: &Path,
) -> io::Result<()> {
    let original_len = file.current_len()?;

    if let Err(e) = file.write_all(bytes).and_then(|_| file.sync()) {
        if let Err(rollback) = file.truncate_to(original_len).and_then(|_| file.sync()) {
            log::error!(
                "Failed to roll back {} to {} bytes: {}",
                target.display(),
                original_len,
                rollback
            );
        }
        return Err(e);
    }
    Ok(())
}

/// Persist a rename by syncing the containing directory (best effort).
fn sync_dir(dir: &Path) {
    if cfg!(unix) {
        if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
            log::debug!("Directory sync failed for {}: {}", dir.display(), e);
        }
    }
}
