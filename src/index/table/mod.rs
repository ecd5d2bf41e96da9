//! Index Table Module
//!
//! Immutable on-disk sorted map from key to index entry (inline value or
//! value log pointer). Each table also records the value log checkpoint it
//! covers.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "SKVI" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][Kind: u8][PayloadLen: u32][Key][Payload]│
//! │   Kind 0 = inline value, Kind 1 = value pointer (16)    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (40 bytes)                                       │
//! │   IndexOffset: u64 | DataCRC: u32 | IndexCRC: u32 |     │
//! │   HeadOffset: u64 | LastSeq: u64 | HeadFile: u32 | Pad  │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

use crate::error::{KvError, Result};
use crate::memtable::IndexEntry;
use crate::vlog::{LogPosition, ValuePointer};

pub use builder::TableBuilder;
pub use iterator::TableIterator;
pub use reader::TableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying a SplitKV index table
pub(crate) const MAGIC: &[u8; 4] = b"SKVI";

/// Current index table format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: u64 = 14;

/// Footer size: IndexOffset (8) + DataCRC (4) + IndexCRC (4) + HeadOffset (8)
/// + LastSeq (8) + HeadFile (4) + Padding (4) = 40 bytes
pub(crate) const FOOTER_SIZE: u64 = 40;

/// Per-entry header: KeyLen (4) + Kind (1) + PayloadLen (4)
pub(crate) const ENTRY_HEADER_SIZE: usize = 9;

pub(crate) const KIND_INLINE: u8 = 0;
pub(crate) const KIND_POINTER: u8 = 1;

/// Encode an entry as (kind, payload)
pub(crate) fn encode_entry(entry: &IndexEntry) -> (u8, Vec<u8>) {
    match entry {
        IndexEntry::Inline(value) => (KIND_INLINE, value.clone()),
        IndexEntry::Pointer(ptr) => (KIND_POINTER, ptr.to_bytes().to_vec()),
    }
}

/// Decode an entry from (kind, payload)
pub(crate) fn decode_entry(kind: u8, payload: Vec<u8>) -> Result<IndexEntry> {
    match kind {
        KIND_INLINE => Ok(IndexEntry::Inline(payload)),
        KIND_POINTER => Ok(IndexEntry::Pointer(ValuePointer::from_bytes(&payload)?)),
        other => Err(KvError::Corruption(format!(
            "unknown index entry kind: 0x{:02x}",
            other
        ))),
    }
}

// =============================================================================
// Table Metadata
// =============================================================================

/// Metadata describing a finished index table
#[derive(Debug, Clone)]
pub struct TableMeta {
    /// Path to the table file
    pub path: PathBuf,
    /// Number of entries in this table
    pub entry_count: u64,
    /// Smallest key (for range filtering)
    pub min_key: Vec<u8>,
    /// Largest key (for range filtering)
    pub max_key: Vec<u8>,
    /// File size in bytes
    pub file_size: u64,
    /// Value log position covered by this table
    pub head: LogPosition,
    /// Last sequence number covered by this table
    pub last_seq: u64,
}

impl TableMeta {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Quick check if a key might be in this table (range check)
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.entry_count > 0 && key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}
