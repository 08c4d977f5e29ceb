//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::Result;
use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    /// Frames are built in memory and written with one call, so no
    /// user-space buffer can hold half a frame
    file: File,
    /// LSN of the last entry written
    current_lsn: u64,
    /// Length of the file up to the last complete frame
    len: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl WalWriter {
    /// Open or create a WAL file, appending after its current end
    ///
    /// `last_lsn` is the LSN of the last valid entry already in the file
    /// (0 for an empty log); it comes from recovery.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            current_lsn: last_lsn,
            len,
            sync_strategy,
            unsynced: 0,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append one entry holding `operations` and return its LSN
    ///
    /// The frame is handed to the OS before this returns; fsync follows
    /// the configured strategy. A failed append, including a failed fsync
    /// of the new frame, is cut off so the log only ever holds entries
    /// whose append was reported as successful.
    pub fn append(&mut self, operations: Vec<Operation>) -> Result<u64> {
        let lsn = self.current_lsn + 1;
        let frame = WalEntry::new(lsn, operations).encode()?;
        let prev_len = self.len;

        if let Err(e) = self.write_frame(&frame) {
            tracing::warn!("WAL append failed at LSN {}: {}", lsn, e);
            self.rollback_to(prev_len)?;
            return Err(e);
        }

        let unsynced = self.unsynced + 1;
        let must_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => unsynced >= count.max(1),
        };

        if must_sync {
            if let Err(e) = self.sync() {
                tracing::warn!("WAL fsync failed at LSN {}, dropping entry: {}", lsn, e);
                self.rollback_to(prev_len)?;
                return Err(e);
            }
        } else {
            self.unsynced = unsynced;
        }

        self.current_lsn = lsn;
        self.len = prev_len + frame.len() as u64;

        Ok(lsn)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.file.write_all(frame)?;
        Ok(())
    }

    fn rollback_to(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.check_injected_failure()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    #[cfg(test)]
    fn check_injected_failure(&mut self) -> Result<()> {
        if std::mem::take(&mut self.fail_next_sync) {
            let err = std::io::Error::new(std::io::ErrorKind::Other, "injected fsync failure");
            return Err(err.into());
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_injected_failure(&mut self) -> Result<()> {
        Ok(())
    }

    /// Discard every entry, keeping the LSN sequence
    pub fn truncate(&mut self) -> Result<()> {
        self.rollback_to(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Bytes of complete frames in the file
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::WalRecovery;
    use tempfile::TempDir;

    fn put(key: &str) -> Vec<Operation> {
        vec![Operation::Put {
            key: key.to_string(),
            value: b"v".to_vec(),
        }]
    }

    #[test]
    fn test_failed_fsync_removes_entry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        let mut writer = WalWriter::open(&path, WalSyncStrategy::EveryWrite, 0).unwrap();

        writer.append(put("kept")).unwrap();
        let len_before = writer.len();

        writer.fail_next_sync = true;
        assert!(writer.append(put("lost")).is_err());

        assert_eq!(writer.current_lsn(), 1);
        assert_eq!(writer.len(), len_before);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);

        // The sequence continues where the last good entry left it
        assert_eq!(writer.append(put("after")).unwrap(), 2);
        drop(writer);

        let (entries, result) = WalRecovery::recover(&path).unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.operations[0].key()).collect();
        assert_eq!(keys, vec!["kept", "after"]);
        assert!(!result.was_truncated);
    }

    #[test]
    fn test_batched_entries_count_toward_sync() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        let mut writer =
            WalWriter::open(&path, WalSyncStrategy::EveryNEntries { count: 3 }, 0).unwrap();

        writer.append(put("a")).unwrap();
        writer.append(put("b")).unwrap();
        assert_eq!(writer.unsynced, 2);

        // Third append triggers the fsync; its failure drops only that entry
        writer.fail_next_sync = true;
        assert!(writer.append(put("c")).is_err());
        assert_eq!(writer.current_lsn(), 2);
        assert_eq!(writer.unsynced, 2);

        writer.append(put("c")).unwrap();
        assert_eq!(writer.unsynced, 0);
        assert_eq!(writer.current_lsn(), 3);
    }
}
