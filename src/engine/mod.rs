//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate value log, MemTable, and index tables
//! - Handle concurrent read/write access
//! - Trigger flushes when the MemTable is full
//! - Manage crash recovery on startup

mod commit;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::index::IndexManager;
use crate::memtable::{IndexEntry, MemTable};
use crate::vlog::{RecoveryResult, ValueLogReader, ValueLogRecovery, ValueLogWriter};

use commit::{CommitRequest, CommitWorker};

/// State shared between readers and the commit thread
pub(crate) struct Shared {
    /// In-memory index for recent writes (internal RwLock)
    pub(crate) memtable: MemTable,

    /// On-disk index tables (internal RwLock on the table list)
    pub(crate) index: IndexManager,

    /// Read handles for the value log
    pub(crate) vlog: Arc<ValueLogReader>,
}

/// The main storage engine
///
/// ## Concurrency Model: Single Committer / Multiple Readers
///
/// - **Writes** (set/flush/sync): sent to one commit thread over a channel.
///   Sets queued behind an in-progress batch are committed together with one
///   value log write and at most one fsync. Same-key writes apply in channel
///   order; the last one committed wins.
///
/// - **Reads** (get): fully concurrent
///   - MemTable read lock, then a snapshot of the index table list
///   - Values in the value log are fetched with positional reads
///
/// A Set returns only after its record is in the value log and visible in the
/// MemTable, so any Get that starts afterwards observes it.
///
/// ## Durability
/// With `WalSyncStrategy::EveryWrite` a successful Set has been fsynced. With
/// `EveryNEntries` a Set is acknowledged once written to the OS; a crash before
/// the next fsync can lose the most recent acknowledged writes. That window is
/// the price of the relaxed mode's throughput.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Shared with the commit thread
    shared: Arc<Shared>,

    /// Request channel into the commit thread (None once closed)
    commit_tx: RwLock<Option<Sender<CommitRequest>>>,

    /// Commit thread handle (taken on close/drop)
    commit_thread: Mutex<Option<JoinHandle<()>>>,

    /// Set once close() starts
    closed: AtomicBool,

    /// What recovery found on open
    recovery: RecoveryResult,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create the metadata and value directories
    /// 2. Open index tables (the newest one holds the checkpoint)
    /// 3. Replay the value log from the checkpoint into the MemTable
    /// 4. Checkpoint the replayed entries into a new index table
    /// 5. Start the commit thread
    ///
    /// Any failure is reported as `KvError::StorageInit`.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_inner(config).map_err(KvError::into_init)
    }

    /// Open with a pair of directories (convenience method)
    ///
    /// Uses default config with the specified directories
    pub fn open_path(meta_dir: &Path, value_dir: &Path) -> Result<Self> {
        let config = Config::builder().meta_dir(meta_dir).value_dir(value_dir).build();
        Self::open(config)
    }

    fn open_inner(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Directories
        fs::create_dir_all(&config.meta_dir)?;
        fs::create_dir_all(&config.value_dir)?;

        // Step 2: Index tables and value log handles
        let index = IndexManager::open(&config.meta_dir)?;
        let vlog = Arc::new(ValueLogReader::open(&config.value_dir)?);
        let memtable = MemTable::new();

        // Step 3: Replay from the checkpoint
        let checkpoint = index.head();
        let threshold = config.value_threshold;
        let recovery = ValueLogRecovery::replay(&vlog, checkpoint, |record, ptr| {
            memtable.put(record.key, IndexEntry::for_value(record.value, ptr, threshold));
            Ok(())
        })?;

        if recovery.entries_recovered > 0 || recovery.was_truncated {
            tracing::info!(
                "Value log recovery: {} entries replayed from {}:{}, {} torn tail(s) discarded, last_seq={}",
                recovery.entries_recovered,
                checkpoint.file_id,
                checkpoint.offset,
                recovery.entries_discarded,
                recovery.last_seq
            );
        }

        let last_seq = index.last_seq().max(recovery.last_seq);
        let mut writer = ValueLogWriter::open(
            Arc::clone(&vlog),
            config.wal_sync_strategy,
            config.vlog_max_file_size,
            last_seq + 1,
        )?;

        // Step 4: Make replayed data part of the checkpoint
        if !memtable.is_empty() {
            tracing::info!(
                "Flushing {} recovered entries to an index table",
                memtable.entry_count()
            );
            writer.sync()?;
            index.flush(&memtable, writer.head(), writer.last_seq())?;
            memtable.clear();
        }

        // Step 5: Commit thread
        let shared = Arc::new(Shared { memtable, index, vlog });
        let (tx, rx) = channel::unbounded();
        let handle = CommitWorker::new(Arc::clone(&shared), writer, config.clone()).spawn(rx)?;

        tracing::info!(
            "Engine opened (meta: {}, values: {}, {} index table(s), strict sync: {})",
            config.meta_dir.display(),
            config.value_dir.display(),
            shared.index.table_count(),
            config.wal_sync_strategy.is_strict()
        );

        Ok(Self {
            config,
            shared,
            commit_tx: RwLock::new(Some(tx)),
            commit_thread: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            recovery,
        })
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. Index tables (newest to oldest)
    ///
    /// A pointer entry is resolved against the value log and CRC-checked.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let entry = match self.shared.memtable.get(key) {
            Some(entry) => Some(entry),
            None => self.shared.index.get(key)?,
        };

        match entry {
            None => Ok(None),
            Some(IndexEntry::Inline(value)) => Ok(Some(value)),
            Some(IndexEntry::Pointer(ptr)) => {
                let record = self.shared.vlog.read(ptr)?;
                if record.key != key {
                    return Err(KvError::Corruption(format!(
                        "value log record at {}:{} belongs to another key",
                        ptr.file_id, ptr.offset
                    )));
                }
                Ok(Some(record.value))
            }
        }
    }

    /// Put a key-value pair
    ///
    /// Returns once the record is in the value log (fsynced in strict mode)
    /// and visible to readers. On error neither the value log nor the index
    /// retains a partial record.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.request(|done| CommitRequest::Set {
            key: key.to_vec(),
            value: value.to_vec(),
            done,
        })
    }

    /// Flush MemTable to an index table (public API)
    ///
    /// Forces a flush regardless of MemTable size
    pub fn flush(&self) -> Result<()> {
        self.request(|done| CommitRequest::Flush { done })
    }

    /// fsync the value log regardless of the sync strategy
    pub fn sync(&self) -> Result<()> {
        self.request(|done| CommitRequest::Sync { done })
    }

    /// Close the engine gracefully
    ///
    /// Commits queued writes, flushes the MemTable, syncs the value log and
    /// stops the commit thread. Calling it again is a no-op; every other
    /// operation fails with `EngineClosed` afterwards.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let tx = self.commit_tx.write().take();
        let result = match tx {
            Some(tx) => {
                let (done, wait) = channel::bounded(1);
                match tx.send(CommitRequest::Shutdown { done }) {
                    Ok(()) => wait.recv().unwrap_or_else(|_| {
                        Err(KvError::Storage("commit thread exited during close".to_string()))
                    }),
                    Err(_) => Err(KvError::Storage("commit thread is not running".to_string())),
                }
            }
            None => Ok(()),
        };

        self.join_commit_thread();

        match &result {
            Ok(()) => tracing::info!("Engine closed"),
            Err(e) => tracing::error!("Engine close failed: {}", e),
        }
        result
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the metadata directory path
    pub fn meta_dir(&self) -> &Path {
        &self.config.meta_dir
    }

    /// Get the value directory path
    pub fn value_dir(&self) -> &Path {
        &self.config.value_dir
    }

    /// Get the MemTable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.shared.memtable.entry_count()
    }

    /// Get the MemTable approximate size
    pub fn memtable_size(&self) -> usize {
        self.shared.memtable.size()
    }

    /// Get the number of index tables
    pub fn index_table_count(&self) -> usize {
        self.shared.index.table_count()
    }

    /// What recovery found when this engine was opened
    pub fn last_recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(KvError::EngineClosed);
        }
        Ok(())
    }

    /// Send a request to the commit thread and wait for its reply
    fn request<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(crossbeam::channel::Sender<Result<()>>) -> CommitRequest,
    {
        self.ensure_open()?;

        // Clone the sender so close() is never blocked behind a waiting caller
        let tx = self.commit_tx.read().clone().ok_or(KvError::EngineClosed)?;

        let (done, wait) = channel::bounded(1);
        tx.send(build(done)).map_err(|_| KvError::EngineClosed)?;
        drop(tx);

        // A dropped reply means the commit thread stopped before serving us
        wait.recv().unwrap_or(Err(KvError::EngineClosed))
    }

    fn join_commit_thread(&self) {
        if let Some(handle) = self.commit_thread.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Commit thread panicked");
            }
        }
    }
}

impl Drop for Engine {
    /// Dropping without `close()` stops the commit thread but writes no
    /// checkpoint; the next open replays the value log instead.
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::warn!("Engine dropped without close(); next open will replay the value log");
            self.commit_tx.write().take();
            self.join_commit_thread();
        }
    }
}
