//! # splitkv
//!
//! A networked key-value store speaking a RESP subset, with:
//! - Keys and values persisted separately (index in the meta dir,
//!   values in an append-only value log)
//! - Crash recovery that repairs torn log tails and refuses real corruption
//! - Group commit: many concurrent SETs share one write and one fsync
//! - Thread-per-connection TCP server with pipelining
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (thread per connection, RESP)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Command Table                              │
//! │                 (GET / SET / PING)                           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Engine                                  │
//! │     reads: direct      writes: commit thread (batched)       │
//! └──────────┬───────────────────────────────────┬──────────────┘
//!            │                                   │
//!            ▼                                   ▼
//!   ┌─────────────────┐                 ┌─────────────────┐
//!   │   Value Log     │                 │    MemTable     │
//!   │  (value dir)    │◀── pointers ────│   (RwLock)      │
//!   └─────────────────┘                 └────────┬────────┘
//!                                                │ flush
//!                                                ▼
//!                                       ┌─────────────────┐
//!                                       │  Index Tables   │
//!                                       │   (meta dir)    │
//!                                       └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
mod io_util;

pub mod vlog;
pub mod memtable;
pub mod index;
pub mod engine;
pub mod protocol;
pub mod command;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::Config;
pub use engine::Engine;
pub use command::CommandTable;
pub use network::{Server, ShutdownHandle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of splitkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
