//! Commit pipeline
//!
//! All mutations funnel through one commit thread. Requests arriving while a
//! batch is being written queue up and are committed together as the next
//! batch, so concurrent Sets share a single value log write and fsync.
//!
//! ```text
//! conn 1 ── set ──┐
//! conn 2 ── set ──┼──► channel ──► commit thread ──► value log (1 write, ≤1 fsync)
//! conn 3 ── set ──┘                      │
//!                                        └──► memtable ──► ack each caller
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::memtable::IndexEntry;
use crate::vlog::ValueLogWriter;

use super::Shared;

/// Reply channel for a single request
pub(crate) type Reply = Sender<Result<()>>;

/// Work item for the commit thread
pub(crate) enum CommitRequest {
    /// Append and index one key/value pair
    Set { key: Vec<u8>, value: Vec<u8>, done: Reply },

    /// Turn the memtable into an index table
    Flush { done: Reply },

    /// fsync the value log
    Sync { done: Reply },

    /// Drain, checkpoint, sync, then exit
    Shutdown { done: Reply },
}

/// Owns the value log writer; the only mutator of memtable and index
pub(crate) struct CommitWorker {
    shared: Arc<Shared>,
    writer: ValueLogWriter,
    config: Config,
}

/// Set requests gathered from one batch
type PendingSet = (Vec<u8>, Vec<u8>, Reply);

impl CommitWorker {
    pub(crate) fn new(shared: Arc<Shared>, writer: ValueLogWriter, config: Config) -> Self {
        Self { shared, writer, config }
    }

    /// Run the worker on its own thread
    pub(crate) fn spawn(self, requests: Receiver<CommitRequest>) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("splitkv-commit".to_string())
            .spawn(move || self.run(requests))
            .map_err(KvError::Io)
    }

    fn run(mut self, requests: Receiver<CommitRequest>) {
        tracing::debug!("Commit thread started");

        while let Ok(first) = requests.recv() {
            let mut batch = vec![first];
            while batch.len() < self.config.max_write_batch {
                match requests.try_recv() {
                    Ok(request) => batch.push(request),
                    Err(_) => break,
                }
            }

            if let Some(done) = self.process(batch) {
                // Requests that raced with shutdown still get served
                let rest: Vec<_> = requests.try_iter().collect();
                if let Some(extra) = self.process(rest) {
                    let _ = extra.send(Ok(()));
                }

                let result = self.shutdown();
                let _ = done.send(result);
                tracing::debug!("Commit thread stopped");
                return;
            }
        }

        // Every sender dropped without close(): leave the checkpoint to
        // recovery but make what was written durable.
        if let Err(e) = self.writer.sync() {
            tracing::error!("Failed to sync value log on release: {}", e);
        }
        tracing::debug!("Commit thread released without close");
    }

    /// Handle one batch; returns the shutdown reply if shutdown was requested
    fn process(&mut self, batch: Vec<CommitRequest>) -> Option<Reply> {
        let mut sets: Vec<PendingSet> = Vec::new();
        let mut controls = Vec::new();
        let mut shutdown = None;

        for request in batch {
            match request {
                CommitRequest::Set { key, value, done } => sets.push((key, value, done)),
                CommitRequest::Shutdown { done } => shutdown = Some(done),
                other => controls.push(other),
            }
        }

        if !sets.is_empty() {
            self.commit_sets(sets);

            if self.shared.memtable.should_flush(self.config.memtable_size_limit) {
                if let Err(e) = self.checkpoint() {
                    // Data stays in the memtable and value log; retried next batch
                    tracing::warn!("Background flush failed: {}", e);
                }
            }
        }

        for request in controls {
            match request {
                CommitRequest::Flush { done } => {
                    let _ = done.send(self.checkpoint());
                }
                CommitRequest::Sync { done } => {
                    let _ = done.send(self.writer.sync());
                }
                CommitRequest::Set { .. } | CommitRequest::Shutdown { .. } => {}
            }
        }

        shutdown
    }

    /// Append a group of Sets, publish them, then acknowledge each caller
    fn commit_sets(&mut self, sets: Vec<PendingSet>) {
        let pairs: Vec<(&[u8], &[u8])> = sets
            .iter()
            .map(|(key, value, _)| (key.as_slice(), value.as_slice()))
            .collect();

        match self.writer.append_batch(&pairs) {
            Ok(written) => {
                let threshold = self.config.value_threshold;
                let mut replies = Vec::with_capacity(sets.len());
                let mut entries = Vec::with_capacity(sets.len());

                for ((key, value, done), (_, ptr)) in sets.into_iter().zip(written) {
                    entries.push((key, IndexEntry::for_value(value, ptr, threshold)));
                    replies.push(done);
                }

                let count = entries.len();
                self.shared.memtable.apply_batch(entries);
                tracing::trace!("Committed batch of {} set(s)", count);

                for done in replies {
                    let _ = done.send(Ok(()));
                }
            }
            Err(e) => {
                tracing::error!("Failed to commit batch of {} set(s): {}", sets.len(), e);
                let message = e.to_string();
                for (_, _, done) in sets {
                    let _ = done.send(Err(KvError::ValueLog(message.clone())));
                }
            }
        }
    }

    /// Persist the memtable as an index table and clear it
    fn checkpoint(&mut self) -> Result<()> {
        if self.shared.memtable.is_empty() {
            return Ok(());
        }

        // Table pointers must never reference records that are not on disk
        self.writer.sync()?;

        self.shared.index.flush(
            &self.shared.memtable,
            self.writer.head(),
            self.writer.last_seq(),
        )?;
        self.shared.memtable.clear();

        if self.shared.index.table_count() > self.config.max_index_tables {
            self.shared.index.compact()?;
        }

        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.checkpoint()?;
        self.writer.sync()
    }
}
