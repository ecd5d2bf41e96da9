//! Index Table Reader
//!
//! Opens index tables, verifies their checksums, and serves O(log n) key
//! lookups via an in-memory key → offset map. Entry reads are positional,
//! so one reader can serve many threads at once.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};
use crate::io_util;
use crate::memtable::IndexEntry;
use crate::vlog::LogPosition;

use super::iterator::TableIterator;
use super::{decode_entry, ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Chunk size used while checksumming the data block
const CRC_CHUNK: usize = 64 * 1024;

/// Reader for index table files
pub struct TableReader {
    /// Path of the table file
    path: PathBuf,
    /// File handle (positional reads only)
    file: File,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    /// Number of entries
    entry_count: u64,
    /// Index block starting offset (end of data block)
    pub(super) index_offset: u64,
    /// Value log position covered by this table
    head: LogPosition,
    /// Last sequence number covered by this table
    last_seq: u64,
}

impl TableReader {
    /// Open an index table for reading
    ///
    /// Validates header, footer and both checksums, then loads the key index
    /// into memory. Any mismatch is reported as `Corruption`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(path, format!("file too short ({} bytes)", file_size)));
        }

        // Header
        let mut header = [0u8; HEADER_SIZE as usize];
        io_util::read_exact_at(&file, &mut header, 0)?;

        if &header[0..4] != MAGIC {
            return Err(corrupt(path, format!("invalid magic {:?}", &header[0..4])));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(corrupt(path, format!("unsupported version {}", version)));
        }

        let entry_count = read_u64(&header[6..14]);

        // Footer
        let mut footer = [0u8; FOOTER_SIZE as usize];
        io_util::read_exact_at(&file, &mut footer, file_size - FOOTER_SIZE)?;

        let index_offset = read_u64(&footer[0..8]);
        let data_crc = read_u32(&footer[8..12]);
        let index_crc = read_u32(&footer[12..16]);
        let head_offset = read_u64(&footer[16..24]);
        let last_seq = read_u64(&footer[24..32]);
        let head_file = read_u32(&footer[32..36]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(corrupt(path, format!("index offset {} out of bounds", index_offset)));
        }

        // Index block
        let index_len = (file_size - FOOTER_SIZE - index_offset) as usize;
        let mut index_data = vec![0u8; index_len];
        io_util::read_exact_at(&file, &mut index_data, index_offset)?;

        if crc32fast::hash(&index_data) != index_crc {
            return Err(corrupt(path, "index block checksum mismatch".to_string()));
        }

        // Data block checksum
        let mut hasher = crc32fast::Hasher::new();
        let mut chunk = vec![0u8; CRC_CHUNK];
        let mut pos = HEADER_SIZE;
        while pos < index_offset {
            let n = CRC_CHUNK.min((index_offset - pos) as usize);
            io_util::read_exact_at(&file, &mut chunk[..n], pos)?;
            hasher.update(&chunk[..n]);
            pos += n as u64;
        }
        if hasher.finalize() != data_crc {
            return Err(corrupt(path, "data block checksum mismatch".to_string()));
        }

        let index = parse_index(path, &index_data, index_offset)?;
        if index.len() as u64 != entry_count {
            return Err(corrupt(
                path,
                format!("header says {} entries, index has {}", entry_count, index.len()),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
            entry_count,
            index_offset,
            head: LogPosition::new(head_file, head_offset),
            last_seq,
        })
    }

    /// Get the entry for a key (binary search over the in-memory index)
    ///
    /// Returns `Ok(None)` if the key is not in this table.
    pub fn get(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        let (stored_key, entry, _) = self.read_entry_at(offset)?;
        if stored_key != key {
            return Err(corrupt(&self.path, format!("index points at wrong key at {}", offset)));
        }

        Ok(Some(entry))
    }

    /// Read one data entry; returns (key, entry, offset of next entry)
    pub(super) fn read_entry_at(&self, offset: u64) -> Result<(Vec<u8>, IndexEntry, u64)> {
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        io_util::read_exact_at(&self.file, &mut header, offset)?;

        let key_len = read_u32(&header[0..4]) as usize;
        let kind = header[4];
        let payload_len = read_u32(&header[5..9]) as usize;

        let body_start = offset + ENTRY_HEADER_SIZE as u64;
        let next = body_start + (key_len + payload_len) as u64;
        if next > self.index_offset {
            return Err(corrupt(&self.path, format!("entry at {} overruns data block", offset)));
        }

        let mut body = vec![0u8; key_len + payload_len];
        io_util::read_exact_at(&self.file, &mut body, body_start)?;
        let payload = body.split_off(key_len);

        Ok((body, decode_entry(kind, payload)?, next))
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Value log position covered by this table
    pub fn head(&self) -> LogPosition {
        self.head
    }

    /// Last sequence number covered by this table
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Get the table path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this table (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this table (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this table (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty table
        }
    }

    /// Iterate over all entries in key order (used by compaction)
    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator::new(self)
    }
}

/// Parse index entries: [key_len(4)][offset(8)][key]
fn parse_index(path: &Path, data: &[u8], data_end: u64) -> Result<BTreeMap<Vec<u8>, u64>> {
    let mut index = BTreeMap::new();
    let mut pos = 0;

    while pos < data.len() {
        if pos + 12 > data.len() {
            return Err(corrupt(path, "truncated index entry".to_string()));
        }
        let key_len = read_u32(&data[pos..pos + 4]) as usize;
        let offset = read_u64(&data[pos + 4..pos + 12]);
        pos += 12;

        if pos + key_len > data.len() {
            return Err(corrupt(path, "truncated index key".to_string()));
        }
        if offset < HEADER_SIZE || offset >= data_end {
            return Err(corrupt(path, format!("entry offset {} out of bounds", offset)));
        }

        index.insert(data[pos..pos + key_len].to_vec(), offset);
        pos += key_len;
    }

    Ok(index)
}

fn corrupt(path: &Path, detail: String) -> KvError {
    KvError::Corruption(format!("index table {}: {}", path.display(), detail))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
