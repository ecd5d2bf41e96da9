//! Index Table Builder
//!
//! Writes sorted entries to a temp file, then renames it into place.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};
use crate::io_util;
use crate::memtable::IndexEntry;
use crate::vlog::LogPosition;

use super::{encode_entry, TableMeta, HEADER_SIZE, MAGIC, VERSION};

/// Builder for creating new index tables from sorted entries
pub struct TableBuilder {
    /// Final file path
    path: PathBuf,
    /// Temp path written until `finish`
    tmp_path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Number of entries written
    entry_count: u64,
    /// Current write position (for index)
    current_offset: u64,
    /// Index: key → file offset of entry
    index: Vec<(Vec<u8>, u64)>,
    /// Track min/max keys for metadata
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl TableBuilder {
    /// Create a new table builder
    ///
    /// Writes the header immediately; call `add()` in strictly increasing key
    /// order, then `finish()` to write index and footer and publish the file.
    pub fn new(path: &Path) -> Result<Self> {
        let tmp_path = Self::tmp_path_for(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);

        // Header (entry_count placeholder, patched in finish)
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            min_key: None,
            max_key: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add an entry (keys must be strictly increasing)
    pub fn add(&mut self, key: &[u8], entry: &IndexEntry) -> Result<()> {
        if let Some(last) = &self.max_key {
            if key <= last.as_slice() {
                return Err(KvError::Storage(
                    "index table keys must be added in strictly increasing order".to_string(),
                ));
            }
        }

        let (kind, payload) = encode_entry(entry);
        let key_len = u32::try_from(key.len())
            .map_err(|_| KvError::Storage(format!("key of {} bytes is too large", key.len())))?;
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            KvError::Storage(format!("inline value of {} bytes is too large", payload.len()))
        })?;

        self.index.push((key.to_vec(), self.current_offset));
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());

        // [key_len(4)][kind(1)][payload_len(4)][key][payload]
        let key_len_bytes = key_len.to_le_bytes();
        let payload_len_bytes = payload_len.to_le_bytes();

        for part in [&key_len_bytes[..], &[kind][..], &payload_len_bytes[..], key, &payload[..]] {
            self.writer.write_all(part)?;
            self.data_hasher.update(part);
        }

        self.current_offset += (super::ENTRY_HEADER_SIZE + key.len() + payload.len()) as u64;
        self.entry_count += 1;

        Ok(())
    }

    /// Finish building: write index block and footer, then publish atomically
    ///
    /// `head` and `last_seq` record how much of the value log this table covers.
    pub fn finish(mut self, head: LogPosition, last_seq: u64) -> Result<TableMeta> {
        let index_offset = self.current_offset;
        let mut index_hasher = crc32fast::Hasher::new();

        // Index block: [key_len(4)][offset(8)][key] for each entry
        for (key, offset) in &self.index {
            let key_len = (key.len() as u32).to_le_bytes();
            let offset = offset.to_le_bytes();
            for part in [&key_len[..], &offset[..], key.as_slice()] {
                self.writer.write_all(part)?;
                index_hasher.update(part);
            }
        }

        let data_crc = self.data_hasher.finalize();
        let index_crc = index_hasher.finalize();

        // Footer
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&index_crc.to_le_bytes())?;
        self.writer.write_all(&head.offset.to_le_bytes())?;
        self.writer.write_all(&last_seq.to_le_bytes())?;
        self.writer.write_all(&head.file_id.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;

        self.writer.flush()?;

        // Patch entry count in header
        let mut file = self.writer.into_inner().map_err(|e| {
            KvError::Storage(format!("Failed to flush index table: {}", e))
        })?;
        file.seek(SeekFrom::Start(6))?; // After magic + version
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();
        drop(file);

        // Publish: rename is atomic, then persist the directory entry
        fs::rename(&self.tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            io_util::sync_dir(dir)?;
        }

        Ok(TableMeta {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            file_size,
            head,
            last_seq,
        })
    }

    /// "index_000001.sst" → "index_000001.sst.tmp"
    pub fn tmp_path_for(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
