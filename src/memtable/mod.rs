//! MemTable Module
//!
//! Versioned in-memory table with optimistic transactions.
//!
//! ## Responsibilities
//! - Fast point reads and writes in memory
//! - Many concurrent readers, commits serialized by a write lock
//! - Per-key commit versions for conflict detection
//! - Sorted snapshots of live items (for log compaction)
//!
//! ## Conflict Detection
//! A [`Txn`] records the commit version of every key it reads. At commit
//! time, under the write lock, each recorded version is compared with the
//! key's current version; any difference means another transaction
//! committed in between and the commit fails with `KvError::Conflict`.
//! A delete removes the key outright; the key then reads as version 0, so
//! a racing delete is detected the same way as a racing put and churning
//! keys leave nothing behind.

mod table;

pub use table::{MemTable, Mutation, Txn};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A pending delete (never stored in the table)
    Tombstone,
}
