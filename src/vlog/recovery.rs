//! Value Log Recovery
//!
//! Replays the value log from the last checkpoint after a restart.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::error::{KvError, Result};

use super::record::{decode_header, MIN_BODY_SIZE};
use super::{LogPosition, LogRecord, ValueLogReader, ValuePointer, HEADER_SIZE};

/// Handles value log replay after a restart
pub struct ValueLogRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records successfully replayed
    pub entries_recovered: u64,

    /// Number of torn tails discarded (at most one per segment)
    pub entries_discarded: u64,

    /// Last valid sequence number seen (0 if none)
    pub last_seq: u64,

    /// Whether any segment was truncated (partial writes removed)
    pub was_truncated: bool,

    /// Number of segments scanned
    pub segments_scanned: u32,
}

/// Outcome of scanning one segment
struct SegmentScan {
    /// End of the last valid record
    valid_end: u64,
    /// Whether a torn tail follows `valid_end`
    torn_tail: bool,
}

impl ValueLogRecovery {
    /// Replay every record at or after `from`, in log order
    ///
    /// This will:
    /// 1. Skip segments older than the checkpoint
    /// 2. Hand each valid record and its pointer to `apply`
    /// 3. Truncate a torn tail (partial or checksum-failing last record)
    /// 4. Fail with `Corruption` if a bad record is followed by more data
    pub fn replay<F>(reader: &ValueLogReader, from: LogPosition, apply: F) -> Result<RecoveryResult>
    where
        F: FnMut(LogRecord, ValuePointer) -> Result<()>,
    {
        Self::run(reader, from, apply, true)
    }

    /// Verify integrity of the value log without modifying it
    pub fn verify(reader: &ValueLogReader, from: LogPosition) -> Result<RecoveryResult> {
        Self::run(reader, from, |_, _| Ok(()), false)
    }

    fn run<F>(
        reader: &ValueLogReader,
        from: LogPosition,
        mut apply: F,
        repair: bool,
    ) -> Result<RecoveryResult>
    where
        F: FnMut(LogRecord, ValuePointer) -> Result<()>,
    {
        let mut result = RecoveryResult::default();
        let segment_ids = reader.segment_ids();

        if from.offset > 0 && !segment_ids.contains(&from.file_id) {
            return Err(KvError::Corruption(format!(
                "checkpoint refers to missing value log segment {}",
                from.file_id
            )));
        }

        for id in segment_ids.into_iter().filter(|&id| id >= from.file_id) {
            let start = if id == from.file_id { from.offset } else { 0 };
            let path = reader.segment_path(id);
            let file = File::open(&path)?;

            let scan = Self::scan_segment(id, file, start, &mut result, &mut apply)?;
            result.segments_scanned += 1;

            if scan.torn_tail {
                result.entries_discarded += 1;
                tracing::warn!(
                    "Discarding torn tail of value log segment {} after offset {}",
                    id,
                    scan.valid_end
                );

                if repair {
                    let file = OpenOptions::new().write(true).open(&path)?;
                    file.set_len(scan.valid_end)?;
                    file.sync_all()?;
                    result.was_truncated = true;
                }
            }
        }

        Ok(result)
    }

    /// Walk one segment from `start`, applying every valid record
    fn scan_segment<F>(
        id: u32,
        file: File,
        start: u64,
        result: &mut RecoveryResult,
        apply: &mut F,
    ) -> Result<SegmentScan>
    where
        F: FnMut(LogRecord, ValuePointer) -> Result<()>,
    {
        let file_len = file.metadata()?.len();
        if start > file_len {
            return Err(KvError::Corruption(format!(
                "checkpoint offset {} is past the end of segment {} ({} bytes)",
                start, id, file_len
            )));
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start))?;
        let mut pos = start;

        loop {
            if pos == file_len {
                return Ok(SegmentScan { valid_end: pos, torn_tail: false });
            }

            // Header cut short by the end of the file
            if pos + HEADER_SIZE as u64 > file_len {
                return Ok(SegmentScan { valid_end: pos, torn_tail: true });
            }

            let mut header = [0u8; HEADER_SIZE];
            reader.read_exact(&mut header)?;
            let (body_len, crc) = decode_header(&header);
            let frame_end = pos + HEADER_SIZE as u64 + body_len as u64;

            // Body runs past the end of the file
            if frame_end > file_len {
                return Ok(SegmentScan { valid_end: pos, torn_tail: true });
            }

            let mut body = vec![0u8; body_len as usize];
            reader.read_exact(&mut body)?;

            let decoded = if (body_len as usize) < MIN_BODY_SIZE || crc32fast::hash(&body) != crc {
                None
            } else {
                LogRecord::decode_body(&body).ok()
            };

            match decoded {
                Some(record) => {
                    let ptr = ValuePointer {
                        file_id: id,
                        offset: pos,
                        len: (frame_end - pos) as u32,
                    };
                    result.entries_recovered += 1;
                    result.last_seq = result.last_seq.max(record.seq);
                    apply(record, ptr)?;
                    pos = frame_end;
                }
                None => {
                    // A bad last record is a torn write. Zero fill after a crash
                    // counts as tail too; anything else means real damage.
                    if frame_end == file_len || Self::rest_is_zero(&mut reader)? {
                        return Ok(SegmentScan { valid_end: pos, torn_tail: true });
                    }
                    return Err(KvError::Corruption(format!(
                        "invalid record at segment {} offset {} followed by more data",
                        id, pos
                    )));
                }
            }
        }
    }

    /// True if every remaining byte in the reader is zero
    fn rest_is_zero(reader: &mut BufReader<File>) -> Result<bool> {
        let mut chunk = [0u8; 8192];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                return Ok(true);
            }
            if chunk[..n].iter().any(|&b| b != 0) {
                return Ok(false);
            }
        }
    }
}
