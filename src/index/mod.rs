//! Index Module
//!
//! Persistent key → location mapping, stored in the metadata directory apart
//! from the value bytes.
//!
//! ## Responsibilities
//! - Persist flushed MemTables as immutable sorted tables
//! - Point lookups, newest table first
//! - Record the value log checkpoint each table covers
//! - Merge tables when too many accumulate

mod table;
mod manager;

pub use table::{TableBuilder, TableIterator, TableMeta, TableReader};
pub use manager::IndexManager;
