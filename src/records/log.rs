//! Append-only item log.

use crate::error::{Result, StoreError};
use crate::types::{Item, ItemId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for log frames.
const LOG_MAGIC: &[u8; 4] = b"ITM\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Fixed bytes around each payload: magic + version + length + checksum.
const FRAME_OVERHEAD: u64 = 4 + 1 + 4 + 4;

/// A single change recorded in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Insert or overwrite an item.
    Put(Item),

    /// Remove an item.
    Delete(ItemId),

    /// Lowest id the store may hand out next. Written by compaction so that
    /// ids of dropped entries stay retired.
    Watermark(ItemId),
}

/// Append-only item log.
pub struct ItemLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: RwLock<File>,

    /// Current file size (for appending).
    file_size: RwLock<u64>,

    /// Number of frames in the file.
    entry_count: RwLock<u64>,

    /// Number of writes since last sync.
    writes_since_sync: RwLock<u64>,

    /// Sync every N writes.
    sync_interval: u64,
}

impl ItemLog {
    /// Default sync interval.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 1;

    /// Open or create an item log with default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create an item log with custom sync interval.
    /// - sync_interval = 0 or 1: sync every write
    /// - sync_interval = 100: sync every 100 writes
    ///
    /// A damaged tail (torn write, bad checksum) is cut off here so that
    /// later appends land after the last intact frame.
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let (valid_len, entry_count) = Self::scan(&mut file, file_size)?;

        if valid_len < file_size {
            tracing::warn!(
                path = %path.display(),
                discarded_bytes = file_size - valid_len,
                "truncating damaged log tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path,
            file: RwLock::new(file),
            file_size: RwLock::new(valid_len),
            entry_count: RwLock::new(entry_count),
            writes_since_sync: RwLock::new(0),
            sync_interval: sync_interval.max(1),
        })
    }

    /// Append an entry to the log.
    ///
    /// Returns the offset where it was written.
    ///
    /// Once the frame is written it is part of the log and will be replayed,
    /// so an error here always means nothing was appended. A write that fails
    /// part way is cut back off. A failed sync does not fail the append; it
    /// is retried on the next write.
    pub fn append(&self, entry: &LogEntry) -> Result<u64> {
        let frame = encode_frame(entry)?;
        let mut file = self.file.write();

        let offset = *self.file_size.read();
        file.seek(SeekFrom::Start(offset))?;
        if let Err(e) = file.write_all(&frame) {
            if let Err(trunc) = file.set_len(offset) {
                tracing::error!(offset, error = %trunc, "failed to cut back partial frame");
            }
            return Err(e.into());
        }

        *self.file_size.write() = offset + frame.len() as u64;
        *self.entry_count.write() += 1;

        let mut writes = self.writes_since_sync.write();
        *writes += 1;
        if *writes >= self.sync_interval && synced(offset, || file.sync_data()) {
            *writes = 0;
        }

        Ok(offset)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.write();
        file.sync_all()?;
        *self.writes_since_sync.write() = 0;
        Ok(())
    }

    /// Read the entry at a given offset.
    pub fn read_at(&self, offset: u64) -> Result<LogEntry> {
        self.read_frame_at(offset).map(|(entry, _)| entry)
    }

    /// Read the entry at `offset`, returning it with the offset of the next frame.
    fn read_frame_at(&self, offset: u64) -> Result<(LogEntry, u64)> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        let (entry, len) = read_frame(&mut *file)?;
        Ok((entry, offset + len))
    }

    /// Iterate all entries from a given offset.
    pub fn iter_from(&self, offset: u64) -> EntryIterator<'_> {
        EntryIterator {
            log: self,
            offset,
            end: *self.file_size.read(),
        }
    }

    /// Replace the whole log with `entries`.
    ///
    /// The new content is written beside the log and renamed over it, so a
    /// crash leaves either the old or the new file in place.
    pub fn rewrite(&self, entries: &[LogEntry]) -> Result<()> {
        let mut file = self.file.write();

        let tmp_path = self.path.with_extension("log.compact");
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut size = 0u64;
        for entry in entries {
            let frame = encode_frame(entry)?;
            tmp.write_all(&frame)?;
            size += frame.len() as u64;
        }
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;

        *file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        *self.file_size.write() = size;
        *self.entry_count.write() = entries.len() as u64;
        *self.writes_since_sync.write() = 0;

        Ok(())
    }

    /// Get current file size.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    /// Number of frames currently in the log.
    pub fn entry_count(&self) -> u64 {
        *self.entry_count.read()
    }

    /// Walk frames from the start, returning the length of the intact prefix
    /// and the number of frames in it.
    fn scan(file: &mut File, file_size: u64) -> Result<(u64, u64)> {
        file.seek(SeekFrom::Start(0))?;

        let mut offset = 0u64;
        let mut count = 0u64;

        while offset < file_size {
            match read_frame(file) {
                Ok((_, len)) => {
                    offset += len;
                    count += 1;
                }
                Err(StoreError::Io(e)) if e.kind() != ErrorKind::UnexpectedEof => {
                    return Err(StoreError::Io(e));
                }
                Err(e) => {
                    tracing::debug!(offset, error = %e, "log scan stopped");
                    break;
                }
            }
        }

        Ok((offset, count))
    }
}

/// Run a sync for the frame just written at `offset`. Failures are logged,
/// not returned: the frame is already committed.
fn synced(offset: u64, sync: impl FnOnce() -> std::io::Result<()>) -> bool {
    match sync() {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(offset, error = %e, "log sync failed; will retry on next write");
            false
        }
    }
}

/// Serialize an entry into a complete frame.
fn encode_frame(entry: &LogEntry) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec(entry)?;
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization("log entry too large".into()))?;

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD as usize);
    frame.extend_from_slice(LOG_MAGIC);
    frame.push(LOG_VERSION);
    frame.extend_from_slice(&payload_len.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());

    Ok(frame)
}

/// Read one frame from the current position. Returns the entry and the frame length.
fn read_frame(reader: &mut impl Read) -> Result<(LogEntry, u64)> {
    // Magic
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != LOG_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid log frame magic".into()));
    }

    // Version
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != LOG_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported log version: {}",
            version[0]
        )));
    }

    // Payload
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let payload_len = u32::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload)?;

    // Checksum
    let mut checksum_bytes = [0u8; 4];
    reader.read_exact(&mut checksum_bytes)?;
    let stored_checksum = u32::from_le_bytes(checksum_bytes);
    let computed_checksum = crc32fast::hash(&payload);

    if stored_checksum != computed_checksum {
        return Err(StoreError::ChecksumMismatch {
            expected: stored_checksum,
            got: computed_checksum,
        });
    }

    let entry = rmp_serde::from_slice(&payload)?;
    Ok((entry, payload_len as u64 + FRAME_OVERHEAD))
}

/// Iterator over entries in the log.
pub struct EntryIterator<'a> {
    log: &'a ItemLog,
    offset: u64,
    end: u64,
}

impl<'a> Iterator for EntryIterator<'a> {
    type Item = Result<(u64, LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let current_offset = self.offset;
        match self.log.read_frame_at(current_offset) {
            Ok((entry, next_offset)) => {
                self.offset = next_offset;
                Some(Ok((current_offset, entry)))
            }
            Err(e) => {
                self.offset = self.end; // Stop iteration on error
                Some(Err(e))
            }
        }
    }
}
