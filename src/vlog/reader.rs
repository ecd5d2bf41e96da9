//! Value Log Reader
//!
//! Resolves value pointers against the set of segment files. Reads are
//! positional, so concurrent lookups never contend on a file cursor.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{KvError, Result};
use crate::io_util;

use super::{LogRecord, ValuePointer};

const SEGMENT_PREFIX: &str = "vlog_";
const SEGMENT_EXTENSION: &str = "log";

/// Read handles for every segment in the value directory
pub struct ValueLogReader {
    /// Directory holding the segments
    dir: PathBuf,

    /// Segment id → shared read handle
    segments: RwLock<BTreeMap<u32, Arc<File>>>,
}

impl ValueLogReader {
    /// Discover and open every segment in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut segments = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(id) = io_util::parse_file_id(&path, SEGMENT_PREFIX, SEGMENT_EXTENSION) {
                segments.insert(id, Arc::new(File::open(&path)?));
            }
        }

        tracing::debug!("Opened {} value log segment(s) in {}", segments.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            segments: RwLock::new(segments),
        })
    }

    /// Read and verify the record a pointer refers to
    pub fn read(&self, ptr: ValuePointer) -> Result<LogRecord> {
        // Clone the handle so the map lock is not held across I/O
        let file = self.segments.read().get(&ptr.file_id).cloned().ok_or_else(|| {
            KvError::Corruption(format!("value log segment {} is missing", ptr.file_id))
        })?;

        let mut frame = vec![0u8; ptr.len as usize];
        io_util::read_exact_at(&file, &mut frame, ptr.offset).map_err(|e| {
            KvError::ValueLog(format!(
                "failed to read {} bytes at segment {} offset {}: {}",
                ptr.len, ptr.file_id, ptr.offset, e
            ))
        })?;

        LogRecord::decode(&frame)
    }

    /// Make a freshly created segment readable
    pub fn register(&self, id: u32) -> Result<()> {
        let file = File::open(self.segment_path(id))?;
        self.segments.write().insert(id, Arc::new(file));
        Ok(())
    }

    /// All known segment ids, ascending
    pub fn segment_ids(&self) -> Vec<u32> {
        self.segments.read().keys().copied().collect()
    }

    /// Highest segment id, if any segment exists
    pub fn last_segment_id(&self) -> Option<u32> {
        self.segments.read().keys().next_back().copied()
    }

    /// Path of the segment with the given id
    pub fn segment_path(&self, id: u32) -> PathBuf {
        Self::segment_path_in(&self.dir, id)
    }

    /// Get the value directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// "vlog_000042.log"
    pub(crate) fn segment_path_in(dir: &Path, id: u32) -> PathBuf {
        dir.join(format!("{}{:06}.{}", SEGMENT_PREFIX, id, SEGMENT_EXTENSION))
    }
}
