//! Configuration for SplitKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Main configuration for SplitKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for the key index (metadata)
    /// Internal structure:
    ///   {meta_dir}/
    ///     └── index_NNNNNN.sst   (immutable index tables)
    pub meta_dir: PathBuf,

    /// Directory for raw value bytes
    /// Internal structure:
    ///   {value_dir}/
    ///     └── vlog_NNNNNN.log    (value log segments, doubles as WAL)
    pub value_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Value Log Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the value log
    pub wal_sync_strategy: WalSyncStrategy,

    /// Segment size (in bytes) after which the value log rotates
    pub vlog_max_file_size: u64,

    /// Values shorter than this are kept inline in the index
    pub value_threshold: usize,

    /// Max number of Set requests committed as one group
    pub max_write_batch: usize,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    /// Number of index tables that triggers a full merge
    pub max_index_tables: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// How often idle connections check for shutdown (milliseconds)
    pub poll_interval_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// How long shutdown waits for open connections (milliseconds)
    pub shutdown_grace_ms: u64,
}

/// Value log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync before acknowledging every write batch (strict durability)
    EveryWrite,

    /// fsync after N unsynced entries (relaxed: a crash may lose the most
    /// recent acknowledged writes)
    EveryNEntries { count: usize },
}

impl WalSyncStrategy {
    /// True when an acknowledged write is guaranteed to be on disk
    pub fn is_strict(&self) -> bool {
        matches!(self, WalSyncStrategy::EveryWrite)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta_dir: PathBuf::from("db/meta"),
            value_dir: PathBuf::from("db/data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            vlog_max_file_size: 1024 * 1024 * 1024, // 1 GB
            value_threshold: 32,
            max_write_batch: 256,
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            max_index_tables: 8,
            listen_addr: "0.0.0.0:16379".to_string(),
            max_connections: 1024,
            poll_interval_ms: 100,
            write_timeout_ms: 5000,
            shutdown_grace_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine or server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.meta_dir.as_os_str().is_empty() || self.value_dir.as_os_str().is_empty() {
            return Err(KvError::Config("storage directories must not be empty".to_string()));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(KvError::Config("sync entry count must be at least 1".to_string()));
        }
        if self.vlog_max_file_size == 0 || self.vlog_max_file_size > u32::MAX as u64 {
            return Err(KvError::Config(format!(
                "vlog_max_file_size must be in 1..={}",
                u32::MAX
            )));
        }
        if self.max_write_batch == 0 {
            return Err(KvError::Config("max_write_batch must be at least 1".to_string()));
        }
        if self.memtable_size_limit == 0 {
            return Err(KvError::Config("memtable_size_limit must be at least 1".to_string()));
        }
        if self.max_index_tables < 2 {
            return Err(KvError::Config("max_index_tables must be at least 2".to_string()));
        }
        if self.max_connections == 0 {
            return Err(KvError::Config("max_connections must be at least 1".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(KvError::Config("poll_interval_ms must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the metadata (index) directory
    pub fn meta_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.meta_dir = path.into();
        self
    }

    /// Set the value log directory
    pub fn value_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.value_dir = path.into();
        self
    }

    /// Set the value log sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Shorthand: strict (`true`) or default relaxed (`false`) durability
    pub fn sync_writes(mut self, strict: bool) -> Self {
        self.config.wal_sync_strategy = if strict {
            WalSyncStrategy::EveryWrite
        } else {
            WalSyncStrategy::EveryNEntries { count: 100 }
        };
        self
    }

    /// Set the value log segment size (in bytes)
    pub fn vlog_max_file_size(mut self, size: u64) -> Self {
        self.config.vlog_max_file_size = size;
        self
    }

    /// Set the inline value threshold (in bytes)
    pub fn value_threshold(mut self, size: usize) -> Self {
        self.config.value_threshold = size;
        self
    }

    /// Set the max group commit batch
    pub fn max_write_batch(mut self, count: usize) -> Self {
        self.config.max_write_batch = count;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the index table count that triggers compaction
    pub fn max_index_tables(mut self, count: usize) -> Self {
        self.config.max_index_tables = count;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the shutdown poll interval (in milliseconds)
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the shutdown grace period (in milliseconds)
    pub fn shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_grace_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
