//! Write-Ahead Log (WAL) Module
//!
//! Commit log of the `logdb` engine. Every committed transaction becomes
//! exactly one [`WalEntry`] carrying all of its operations, appended
//! before the transaction's writes are published to readers.
//!
//! ## Frame Layout
//! ```text
//! ┌─────────┬─────────┬─────────┬──────────────────────────┐
//! │ LSN (8) │ CRC (4) │ Len (4) │ bincode(WalEntry) (Len)  │
//! └─────────┴─────────┴─────────┴──────────────────────────┘
//! ```
//!
//! Header integers are little-endian and the CRC covers the data only.
//! LSNs strictly increase through a file; compaction writes its snapshot
//! with LSNs continuing the old sequence.
//!
//! ## Recovery
//! [`WalRecovery::recover`] keeps the longest valid prefix: the first torn
//! frame, CRC mismatch or LSN regression ends the log and everything from
//! there on is cut off.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE};
pub use writer::WalWriter;
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};
