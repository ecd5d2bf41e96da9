//! MemTable Module
//!
//! In-memory index for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered iteration for index table creation
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for index table generation)
//! - A whole commit batch is applied under one write lock

mod table;

pub use table::MemTable;

use crate::vlog::ValuePointer;

/// Where a key's current value lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEntry {
    /// Small value stored directly in the index
    Inline(Vec<u8>),

    /// Large value stored in the value log
    Pointer(ValuePointer),
}

impl IndexEntry {
    /// Inline small values, point at large ones
    pub fn for_value(value: Vec<u8>, ptr: ValuePointer, threshold: usize) -> Self {
        if value.len() < threshold {
            IndexEntry::Inline(value)
        } else {
            IndexEntry::Pointer(ptr)
        }
    }

    /// Approximate in-memory footprint (excluding the key)
    pub fn size(&self) -> usize {
        match self {
            IndexEntry::Inline(value) => value.len(),
            IndexEntry::Pointer(_) => ValuePointer::ENCODED_SIZE,
        }
    }
}
