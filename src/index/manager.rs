//! Index Manager
//!
//! Manages the on-disk index tables in the metadata directory.
//!
//! ## Responsibilities
//! - Discover existing tables on startup (and drop half-written temp files)
//! - Search tables newest → oldest for reads
//! - Create new tables from MemTable flushes
//! - Merge all tables into one when too many accumulate

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::io_util;
use crate::memtable::{IndexEntry, MemTable};
use crate::vlog::LogPosition;

use super::{TableBuilder, TableMeta, TableReader};

const TABLE_PREFIX: &str = "index_";
const TABLE_EXTENSION: &str = "sst";

/// An open table and the id it was discovered under
#[derive(Clone)]
struct OpenTable {
    id: u32,
    reader: Arc<TableReader>,
}

/// Manages the index tables
///
/// ## Concurrency:
/// - `tables`: Protected by RwLock; readers clone a snapshot of `Arc`s and
///   release the lock before doing any I/O
/// - `next_table_id`: Atomic counter (lock-free)
/// - Flush and compaction are only driven by the commit thread
pub struct IndexManager {
    /// Directory where tables are stored
    dir: PathBuf,

    /// Open tables, ordered newest → oldest
    tables: RwLock<Vec<OpenTable>>,

    /// Next ID for creating new tables
    next_table_id: AtomicU32,
}

impl IndexManager {
    /// Open or create the index in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Remove temp files left by an interrupted flush
    /// 3. Open readers for each table (verifies checksums, loads indexes)
    /// 4. Order by ID descending (newest first)
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut table_ids: Vec<u32> = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            if path.extension().map_or(false, |ext| ext == "tmp") {
                tracing::warn!("Removing unfinished index table {}", path.display());
                fs::remove_file(&path)?;
                continue;
            }

            if let Some(id) = io_util::parse_file_id(&path, TABLE_PREFIX, TABLE_EXTENSION) {
                table_ids.push(id);
            }
        }

        // Newest first
        table_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut tables = Vec::with_capacity(table_ids.len());
        for &id in &table_ids {
            let reader = TableReader::open(&Self::table_path_in(dir, id))?;
            tables.push(OpenTable { id, reader: Arc::new(reader) });
        }

        let next_id = table_ids.first().map(|&id| id + 1).unwrap_or(1);

        tracing::debug!("Opened {} index table(s) in {}", tables.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            tables: RwLock::new(tables),
            next_table_id: AtomicU32::new(next_id),
        })
    }

    /// Get the entry for a key (searches all tables newest → oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let snapshot = self.tables.read().clone();

        for table in &snapshot {
            // Skip table if key is outside its range (O(1) check)
            if !table.reader.might_contain(key) {
                continue;
            }

            if let Some(entry) = table.reader.get(key)? {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    /// Flush a MemTable to a new table covering the value log up to `head`
    ///
    /// The new table is published before the caller clears the MemTable, so
    /// readers always find every key in one place or the other.
    pub fn flush(&self, memtable: &MemTable, head: LogPosition, last_seq: u64) -> Result<TableMeta> {
        let meta = self.write_table(memtable.iter(), head, last_seq)?;
        let reader = Arc::new(TableReader::open(&meta.path)?);
        let id = self.id_of(&meta.path);

        self.tables.write().insert(0, OpenTable { id, reader });

        tracing::debug!(
            "Flushed {} entries to {} (head {}:{})",
            meta.entry_count,
            meta.path.display(),
            head.file_id,
            head.offset
        );

        Ok(meta)
    }

    /// Merge every current table into one; newest entry per key wins
    ///
    /// Returns `None` when there is nothing to merge.
    pub fn compact(&self) -> Result<Option<TableMeta>> {
        let snapshot = self.tables.read().clone();
        if snapshot.len() < 2 {
            return Ok(None);
        }

        // Oldest → newest so newer entries overwrite older ones
        let mut merged: BTreeMap<Vec<u8>, IndexEntry> = BTreeMap::new();
        for table in snapshot.iter().rev() {
            for item in table.reader.iter() {
                let (key, entry) = item?;
                merged.insert(key, entry);
            }
        }

        let newest = &snapshot[0].reader;
        let meta = self.write_table(merged.into_iter(), newest.head(), newest.last_seq())?;
        let reader = Arc::new(TableReader::open(&meta.path)?);
        let id = self.id_of(&meta.path);

        let merged_ids: HashSet<u32> = snapshot.iter().map(|t| t.id).collect();
        {
            let mut tables = self.tables.write();
            tables.retain(|t| !merged_ids.contains(&t.id));
            tables.push(OpenTable { id, reader });
            tables.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        }

        // Outstanding readers keep their handles; the files can go now
        for table in &snapshot {
            if let Err(e) = fs::remove_file(table.reader.path()) {
                tracing::warn!("Failed to remove merged table {}: {}", table.reader.path().display(), e);
            }
        }
        io_util::sync_dir(&self.dir)?;

        tracing::info!(
            "Compacted {} index tables into {} ({} entries)",
            snapshot.len(),
            meta.path.display(),
            meta.entry_count
        );

        Ok(Some(meta))
    }

    /// Value log position covered by the newest table (the checkpoint)
    pub fn head(&self) -> LogPosition {
        self.tables
            .read()
            .first()
            .map(|t| t.reader.head())
            .unwrap_or_default()
    }

    /// Last sequence number covered by the newest table
    pub fn last_seq(&self) -> u64 {
        self.tables.read().first().map(|t| t.reader.last_seq()).unwrap_or(0)
    }

    /// Get the number of tables
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Get the metadata directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Build and publish a table from sorted entries
    fn write_table<I>(&self, entries: I, head: LogPosition, last_seq: u64) -> Result<TableMeta>
    where
        I: Iterator<Item = (Vec<u8>, IndexEntry)>,
    {
        let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let path = Self::table_path_in(&self.dir, id);

        let result = (|| {
            let mut builder = TableBuilder::new(&path)?;
            for (key, entry) in entries {
                builder.add(&key, &entry)?;
            }
            builder.finish(head, last_seq)
        })();

        if result.is_err() {
            let _ = fs::remove_file(TableBuilder::tmp_path_for(&path));
        }
        result
    }

    fn id_of(&self, path: &Path) -> u32 {
        io_util::parse_file_id(path, TABLE_PREFIX, TABLE_EXTENSION).unwrap_or(0)
    }

    /// "index_000042.sst"
    fn table_path_in(dir: &Path, id: u32) -> PathBuf {
        dir.join(format!("{}{:06}.{}", TABLE_PREFIX, id, TABLE_EXTENSION))
    }
}
