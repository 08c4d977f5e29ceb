//! MemTable implementation
//!
//! HashMap-based table behind a parking_lot RwLock, plus the optimistic
//! transaction type that commits into it.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::context::Context;
use crate::error::{KvError, Result};

use super::MemTableEntry;

/// A single write produced by a committing transaction
pub type Mutation = (String, MemTableEntry);

/// Stored state of one live key
///
/// Deleted keys have no slot. An absent key reads as version 0, which a
/// transaction validates exactly like any other version: a key that went
/// away after being read no longer matches, and a key that was absent when
/// read and is absent again at commit is the state the transaction saw.
#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    /// Version of the commit that last wrote this key
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    /// Highest version handed out so far
    last_version: u64,
}

impl Inner {
    fn version_of(&self, key: &str) -> u64 {
        self.slots.get(key).map(|s| s.version).unwrap_or(0)
    }

    fn apply(&mut self, key: String, entry: MemTableEntry, version: u64) {
        match entry {
            MemTableEntry::Value(value) => {
                self.slots.insert(key, Slot { value, version });
            }
            MemTableEntry::Tombstone => {
                self.slots.remove(&key);
            }
        }
    }

    fn value_of(&self, key: &str) -> Option<Vec<u8>> {
        self.slots.get(key).map(|s| s.value.clone())
    }
}

/// In-memory table for committed items
#[derive(Debug, Default)]
pub struct MemTable {
    inner: RwLock<Inner>,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the committed value of a key (read lock)
    ///
    /// Returns `None` for absent and deleted keys alike.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().value_of(key)
    }

    /// Apply an entry outside of any transaction (WAL replay)
    ///
    /// Returns the version assigned to the write.
    pub fn apply(&self, key: String, entry: MemTableEntry) -> u64 {
        let mut inner = self.inner.write();
        inner.last_version += 1;
        let version = inner.last_version;
        inner.apply(key, entry, version);
        version
    }

    /// Begin an optimistic transaction against this table
    pub fn begin(&self) -> Txn<'_> {
        Txn {
            table: self,
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Number of keys holding a live value
    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version of the most recent commit (0 for a fresh table)
    pub fn version(&self) -> u64 {
        self.inner.read().last_version
    }

    /// Sorted copy of every live item
    pub fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        Self::live_items(&self.inner.read())
    }

    /// Run `f` over a sorted snapshot of live items while commits are
    /// blocked
    ///
    /// Used to rewrite the log from a state no concurrent commit can
    /// change underneath it.
    pub fn compact_with<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&[(String, Vec<u8>)]) -> Result<R>,
    {
        // Write lock: commits wait until `f` has persisted the snapshot
        let inner = self.inner.write();
        let items = Self::live_items(&inner);
        f(&items)
    }

    fn live_items(inner: &Inner) -> Vec<(String, Vec<u8>)> {
        let mut items: Vec<(String, Vec<u8>)> = inner
            .slots
            .iter()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }
}

/// Optimistic read-modify-write transaction
///
/// Reads go straight to the committed table and are recorded with the
/// version they observed. Writes are buffered until [`Txn::commit`].
pub struct Txn<'a> {
    table: &'a MemTable,
    /// key -> version observed when first read
    reads: HashMap<String, u64>,
    /// buffered writes, sorted so hooks see a stable order
    writes: BTreeMap<String, MemTableEntry>,
}

impl<'a> Txn<'a> {
    /// Read a key, preferring this transaction's own pending write
    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        if let Some(entry) = self.writes.get(key) {
            return match entry {
                MemTableEntry::Value(v) => Some(v.clone()),
                MemTableEntry::Tombstone => None,
            };
        }

        let inner = self.table.inner.read();
        let version = inner.version_of(key);
        self.reads.entry(key.to_string()).or_insert(version);

        inner.value_of(key)
    }

    /// Whether a key currently exists (recorded as a read)
    pub fn exists(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.insert(key.into(), MemTableEntry::Value(value));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.insert(key.into(), MemTableEntry::Tombstone);
    }

    /// Commit without a durability hook
    pub fn commit(self, ctx: &Context) -> Result<u64> {
        self.commit_with(ctx, |_, _| Ok(()))
    }

    /// Validate reads, run `hook`, then publish writes atomically
    ///
    /// The hook runs under the table's write lock with the commit version
    /// and the pending mutations; if it fails nothing becomes visible.
    /// Returns the commit version (the current version for read-only
    /// transactions).
    pub fn commit_with<F>(self, ctx: &Context, hook: F) -> Result<u64>
    where
        F: FnOnce(u64, &[Mutation]) -> Result<()>,
    {
        ctx.check()?;

        let mut inner = self.table.inner.write();

        for (key, seen) in &self.reads {
            if inner.version_of(key) != *seen {
                return Err(KvError::Conflict(key.clone()));
            }
        }

        if self.writes.is_empty() {
            return Ok(inner.last_version);
        }

        // Last chance to abort: nothing has been logged yet
        ctx.check()?;

        let version = inner.last_version + 1;
        let mutations: Vec<Mutation> = self.writes.into_iter().collect();
        hook(version, &mutations)?;

        inner.last_version = version;
        for (key, entry) in mutations {
            inner.apply(key, entry, version);
        }

        Ok(version)
    }
}
