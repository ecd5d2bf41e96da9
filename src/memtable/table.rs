//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::IndexEntry;

/// In-memory table for recent writes
///
/// Readers take the read lock; only the commit thread takes the write lock.
pub struct MemTable {
    /// Key → index entry, kept sorted for flushing
    data: RwLock<BTreeMap<Vec<u8>, IndexEntry>>,

    /// Approximate size in bytes (keys + entries)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<IndexEntry> {
        self.data.read().get(key).cloned()
    }

    /// Insert or replace one entry; returns the new approximate size
    pub fn put(&self, key: Vec<u8>, entry: IndexEntry) -> usize {
        let mut data = self.data.write();
        self.insert_locked(&mut data, key, entry);
        self.size.load(Ordering::SeqCst)
    }

    /// Insert a batch under a single write lock; returns the new approximate size
    ///
    /// Later entries for the same key win.
    pub fn apply_batch(&self, entries: Vec<(Vec<u8>, IndexEntry)>) -> usize {
        let mut data = self.data.write();
        for (key, entry) in entries {
            self.insert_locked(&mut data, key, entry);
        }
        self.size.load(Ordering::SeqCst)
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn iter(&self) -> impl Iterator<Item = (Vec<u8>, IndexEntry)> {
        let snapshot: Vec<_> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        snapshot.into_iter()
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
    }

    fn insert_locked(&self, data: &mut BTreeMap<Vec<u8>, IndexEntry>, key: Vec<u8>, entry: IndexEntry) {
        let key_len = key.len();
        let entry_size = entry.size();
        match data.insert(key, entry) {
            Some(old) => {
                // Key bytes were already counted; swap the entry size only
                self.size.fetch_sub(old.size(), Ordering::SeqCst);
                self.size.fetch_add(entry_size, Ordering::SeqCst);
            }
            None => {
                self.size.fetch_add(key_len + entry_size, Ordering::SeqCst);
            }
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
