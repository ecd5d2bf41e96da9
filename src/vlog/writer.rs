//! Value Log Writer
//!
//! Appends framed records to the active segment and decides when to fsync.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};
use crate::io_util;

use super::record::encode_parts;
use super::{LogPosition, ValueLogReader, ValuePointer};

/// Appends records to the value log
///
/// Each batch is encoded into one buffer and written with a single
/// `write_all`, so a batch either lands whole or is rolled back.
pub struct ValueLogWriter {
    /// Segment handles shared with readers
    reader: Arc<ValueLogReader>,

    /// Active segment, opened for writing
    file: File,

    /// Active segment id
    file_id: u32,

    /// End of the active segment
    offset: u64,

    /// Sequence number assigned to the next record
    next_seq: u64,

    /// When to fsync
    sync_strategy: WalSyncStrategy,

    /// Records written since the last fsync
    uncommitted: usize,

    /// Rotate once the active segment reaches this size
    max_file_size: u64,
}

impl ValueLogWriter {
    /// Open the newest segment for appending, creating segment 1 if none exist
    ///
    /// `next_seq` continues the numbering found during recovery.
    pub fn open(
        reader: Arc<ValueLogReader>,
        sync_strategy: WalSyncStrategy,
        max_file_size: u64,
        next_seq: u64,
    ) -> Result<Self> {
        let file_id = match reader.last_segment_id() {
            Some(id) => id,
            None => {
                Self::create_segment(&reader, 1)?;
                1
            }
        };

        let mut file = OpenOptions::new()
            .write(true)
            .open(reader.segment_path(file_id))?;
        let offset = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            reader,
            file,
            file_id,
            offset,
            next_seq: next_seq.max(1),
            sync_strategy,
            uncommitted: 0,
            max_file_size,
        })
    }

    /// Append a single record; returns its sequence number and pointer
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(u64, ValuePointer)> {
        let mut written = self.append_batch(&[(key, value)])?;
        written
            .pop()
            .ok_or_else(|| KvError::ValueLog("empty append result".to_string()))
    }

    /// Append a batch of records with at most one fsync
    ///
    /// On failure the segment is cut back to where the batch started and no
    /// record of the batch is considered written.
    pub fn append_batch<K, V>(&mut self, entries: &[(K, V)]) -> Result<Vec<(u64, ValuePointer)>>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        if self.offset >= self.max_file_size {
            self.rotate()?;
        }

        let start = self.offset;
        let mut buffer = Vec::new();
        let mut written = Vec::with_capacity(entries.len());
        let mut seq = self.next_seq;

        for (key, value) in entries {
            let frame = encode_parts(seq, key.as_ref(), value.as_ref())?;
            written.push((
                seq,
                ValuePointer {
                    file_id: self.file_id,
                    offset: start + buffer.len() as u64,
                    len: frame.len() as u32,
                },
            ));
            buffer.extend_from_slice(&frame);
            seq += 1;
        }

        if let Err(e) = self.file.write_all(&buffer) {
            self.rollback(start);
            return Err(KvError::ValueLog(format!("append failed: {}", e)));
        }

        let pending = self.uncommitted + entries.len();
        let must_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => pending >= count,
        };

        if must_sync {
            if let Err(e) = self.file.sync_data() {
                self.rollback(start);
                return Err(KvError::ValueLog(format!("fsync failed: {}", e)));
            }
            self.uncommitted = 0;
        } else {
            self.uncommitted = pending;
        }

        self.offset = start + buffer.len() as u64;
        self.next_seq = seq;

        Ok(written)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Position just past the last written record
    pub fn head(&self) -> LogPosition {
        LogPosition::new(self.file_id, self.offset)
    }

    /// Sequence number of the last written record (0 if none)
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Sequence number the next record will get
    pub fn current_seq(&self) -> u64 {
        self.next_seq
    }

    /// Records written but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Active segment id
    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Seal the active segment and start the next one
    fn rotate(&mut self) -> Result<()> {
        self.sync()?;

        let next_id = self.file_id + 1;
        let file = Self::create_segment(&self.reader, next_id)?;

        tracing::debug!(
            "Value log rotated: segment {} sealed at {} bytes, segment {} active",
            self.file_id,
            self.offset,
            next_id
        );

        self.file = file;
        self.file_id = next_id;
        self.offset = 0;
        Ok(())
    }

    /// Create an empty segment, persist its directory entry and register it
    fn create_segment(reader: &ValueLogReader, id: u32) -> Result<File> {
        let path = reader.segment_path(id);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        io_util::sync_dir(reader.dir())?;
        reader.register(id)?;
        Ok(file)
    }

    /// Best effort: cut the segment back to `offset` after a failed batch
    fn rollback(&mut self, offset: u64) {
        let result = self
            .file
            .set_len(offset)
            .and_then(|_| self.file.seek(SeekFrom::Start(offset)).map(|_| ()));

        if let Err(e) = result {
            tracing::error!(
                "Failed to roll back segment {} to offset {}: {}",
                self.file_id,
                offset,
                e
            );
        }
    }
}
