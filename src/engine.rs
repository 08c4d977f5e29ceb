//! Engine Module
//!
//! The reference transactional storage engine behind the built-in drivers.
//!
//! ## Responsibilities
//! - Run every mutation as an optimistic read-modify-write transaction
//! - Log each commit to the WAL before it becomes visible (durable mode)
//! - Replay the WAL on open, truncating torn tails
//! - Compact the WAL into a snapshot on close

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::WalSyncStrategy;
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::memtable::{MemTable, MemTableEntry, Mutation, Txn};
use crate::wal::{Operation, RecoveryResult, WalRecovery, WalWriter};

/// Puts per WAL entry when writing a compacted snapshot
const SNAPSHOT_BATCH: usize = 256;

/// Durable half of the engine
struct Durability {
    data_dir: PathBuf,
    wal_path: PathBuf,
    sync_strategy: WalSyncStrategy,
    /// Exclusive access; only taken while the memtable write lock is held
    wal: Mutex<WalWriter>,
    recovery: RecoveryResult,
}

/// The storage engine
///
/// ## Concurrency Model
///
/// - **Reads** (get): memtable read lock only, never block each other
/// - **Writes** (put/delete): optimistic transactions; validation, WAL
///   append and publication happen under the memtable write lock, so
///   commits are serialized and a racing writer on the same key gets
///   `KvError::Conflict` instead of silently overwriting
/// - **Lock order**: memtable → WAL, everywhere
pub struct Engine {
    memtable: MemTable,

    /// `None` for the volatile in-memory engine
    durability: Option<Durability>,

    closed: AtomicBool,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const COMPACT_FILENAME: &'static str = "wal.log.compact";

    /// Open or create a durable engine in `data_dir`
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Recover the WAL if it exists (torn tail is truncated)
    /// 3. Replay recovered entries into the memtable
    /// 4. Reopen the WAL for appending, continuing the LSN sequence
    pub fn open(data_dir: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        fs::create_dir_all(data_dir)?;

        let wal_path = data_dir.join(Self::WAL_FILENAME);

        // A leftover snapshot means a compaction died before its rename
        let stale = data_dir.join(Self::COMPACT_FILENAME);
        if stale.exists() {
            tracing::warn!("Removing unfinished compaction {}", stale.display());
            fs::remove_file(&stale)?;
        }

        let memtable = MemTable::new();

        let recovery = if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;

            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    result.entries_recovered,
                    result.entries_corrupted,
                    result.last_lsn
                );
            }

            for entry in entries {
                for op in entry.operations {
                    match op {
                        Operation::Put { key, value } => {
                            memtable.apply(key, MemTableEntry::Value(value));
                        }
                        Operation::Delete { key } => {
                            memtable.apply(key, MemTableEntry::Tombstone);
                        }
                    }
                }
            }

            result
        } else {
            RecoveryResult::default()
        };

        let wal = WalWriter::open(&wal_path, sync_strategy, recovery.last_lsn)?;

        tracing::debug!(
            "Engine opened at {} with {} live keys",
            data_dir.display(),
            memtable.len()
        );

        Ok(Self {
            memtable,
            durability: Some(Durability {
                data_dir: data_dir.to_path_buf(),
                wal_path,
                sync_strategy,
                wal: Mutex::new(wal),
                recovery,
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Create a volatile engine that keeps everything in memory
    pub fn in_memory() -> Self {
        Self {
            memtable: MemTable::new(),
            durability: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the current value of a key
    pub fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        ctx.check()?;

        self.memtable
            .get(key)
            .ok_or_else(|| KvError::KeyNotFound(key.to_string()))
    }

    /// Upsert a key
    ///
    /// The current version of the key is read inside the transaction, so a
    /// concurrent commit to the same key between read and commit surfaces
    /// as `KvError::Conflict`.
    pub fn put(&self, ctx: &Context, key: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_open()?;

        let mut txn = self.memtable.begin();
        txn.get(key);
        txn.put(key, value);
        self.commit(ctx, txn)?;
        Ok(())
    }

    /// Delete an existing key
    ///
    /// Existence is checked inside the same transaction; deleting an absent
    /// key is `KvError::KeyNotFound`.
    pub fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.ensure_open()?;

        let mut txn = self.memtable.begin();
        if !txn.exists(key) {
            return Err(KvError::KeyNotFound(key.to_string()));
        }
        txn.delete(key);
        self.commit(ctx, txn)?;
        Ok(())
    }

    /// Commit a transaction, logging it first in durable mode
    pub fn commit(&self, ctx: &Context, txn: Txn<'_>) -> Result<u64> {
        match &self.durability {
            Some(durability) => txn.commit_with(ctx, |_, mutations| {
                let mut wal = durability.wal.lock();
                wal.append(to_operations(mutations))?;
                Ok(())
            }),
            None => txn.commit(ctx),
        }
    }

    /// Begin a raw transaction (multi-key read-modify-write)
    pub fn begin(&self) -> Result<Txn<'_>> {
        self.ensure_open()?;
        Ok(self.memtable.begin())
    }

    /// Force the WAL to disk
    pub fn sync(&self) -> Result<()> {
        if let Some(durability) = &self.durability {
            durability.wal.lock().sync()?;
        }
        Ok(())
    }

    /// Rewrite the WAL as a snapshot of live keys
    ///
    /// Commits are blocked for the duration. The snapshot is written to a
    /// side file, synced, then renamed over the log.
    pub fn compact(&self) -> Result<()> {
        let durability = match &self.durability {
            Some(d) => d,
            None => return Ok(()),
        };

        self.memtable.compact_with(|items| {
            let mut wal = durability.wal.lock();
            let tmp_path = durability.data_dir.join(Self::COMPACT_FILENAME);

            // Snapshot continues the LSN sequence so recovery stays monotonic
            let mut snapshot = WalWriter::open(
                &tmp_path,
                WalSyncStrategy::EveryNEntries { count: usize::MAX },
                wal.current_lsn(),
            )?;
            snapshot.truncate()?;

            for chunk in items.chunks(SNAPSHOT_BATCH) {
                let ops = chunk
                    .iter()
                    .map(|(key, value)| Operation::Put {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect();
                snapshot.append(ops)?;
            }
            snapshot.sync()?;
            let last_lsn = snapshot.current_lsn();
            drop(snapshot);

            fs::rename(&tmp_path, &durability.wal_path)?;
            sync_dir(&durability.data_dir)?;

            *wal = WalWriter::open(&durability.wal_path, durability.sync_strategy, last_lsn)?;

            tracing::debug!(
                "Compacted WAL to {} live keys (last_lsn={})",
                items.len(),
                last_lsn
            );
            Ok(())
        })
    }

    /// Close the engine
    ///
    /// Flushes every acknowledged write and compacts the log. Later
    /// operations fail with `KvError::Closed`; a second close is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.compact() {
            tracing::warn!("Compaction on close failed, syncing log instead: {}", e);
            self.sync()?;
            return Err(e);
        }
        self.sync()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KvError::Closed);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.memtable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memtable.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get the data directory path (durable engines only)
    pub fn data_dir(&self) -> Option<&Path> {
        self.durability.as_ref().map(|d| d.data_dir.as_path())
    }

    /// Get the WAL path (durable engines only)
    pub fn wal_path(&self) -> Option<&Path> {
        self.durability.as_ref().map(|d| d.wal_path.as_path())
    }

    /// What recovery found when this engine was opened
    pub fn recovery(&self) -> Option<&RecoveryResult> {
        self.durability.as_ref().map(|d| &d.recovery)
    }

    /// LSN of the last logged commit
    pub fn current_lsn(&self) -> Option<u64> {
        self.durability.as_ref().map(|d| d.wal.lock().current_lsn())
    }
}

fn to_operations(mutations: &[Mutation]) -> Vec<Operation> {
    mutations
        .iter()
        .map(|(key, entry)| match entry {
            MemTableEntry::Value(value) => Operation::Put {
                key: key.clone(),
                value: value.clone(),
            },
            MemTableEntry::Tombstone => Operation::Delete { key: key.clone() },
        })
        .collect()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
