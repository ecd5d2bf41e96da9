//! Index Table Iterator
//!
//! Sequential iteration over all entries in an index table.

use crate::error::Result;
use crate::memtable::IndexEntry;

use super::{TableReader, HEADER_SIZE};

/// Iterator over table entries in sorted key order
pub struct TableIterator<'a> {
    reader: &'a TableReader,
    /// Offset of the next entry
    offset: u64,
    /// Stops iteration after the first error
    failed: bool,
}

impl<'a> TableIterator<'a> {
    pub(super) fn new(reader: &'a TableReader) -> Self {
        Self {
            reader,
            offset: HEADER_SIZE,
            failed: false,
        }
    }
}

impl<'a> Iterator for TableIterator<'a> {
    type Item = Result<(Vec<u8>, IndexEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop at index block
        if self.failed || self.offset >= self.reader.index_offset {
            return None;
        }

        match self.reader.read_entry_at(self.offset) {
            Ok((key, entry, next)) => {
                self.offset = next;
                Some(Ok((key, entry)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
