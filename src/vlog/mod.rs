//! Value Log Module
//!
//! Append-only storage for raw value bytes. Every Set is appended here before
//! it is acknowledged, so the value log doubles as the write-ahead log.
//!
//! ## Responsibilities
//! - Append records in batches (one write, at most one fsync per batch)
//! - CRC32 checksums for corruption detection
//! - Sequence numbers for ordering
//! - Segment rotation
//! - Replay from the last checkpoint, discarding torn tails
//!
//! ## File Format
//! ```text
//! {value_dir}/vlog_000001.log, vlog_000002.log, ...
//! ┌──────────────────────────────────────────────┐
//! │ Record 1                                     │
//! │ ┌───────────┬─────────┬────────────────────┐ │
//! │ │BodyLen (4)│ CRC (4) │ bincode{seq,k,v}   │ │
//! │ └───────────┴─────────┴────────────────────┘ │
//! ├──────────────────────────────────────────────┤
//! │ Record 2 ...                                 │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The index stores a `ValuePointer` (segment, offset, frame length) for each
//! key whose value is too large to keep inline.

mod record;
mod reader;
mod writer;
mod recovery;

pub use record::{LogPosition, LogRecord, ValuePointer, HEADER_SIZE};
pub use reader::ValueLogReader;
pub use writer::ValueLogWriter;
pub use recovery::{RecoveryResult, ValueLogRecovery};
