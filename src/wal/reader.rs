//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use bytes::Buf;

use crate::error::{KvError, Result};
use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset of the next unread frame
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// - `Ok(Some(entry))`: a complete, checksummed entry
    /// - `Ok(None)`: clean end of log
    /// - `Err(WalCorruption)`: torn or corrupt frame at [`Self::position`]
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        if self.position >= self.file_len {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        self.read_exact_or_torn(&mut header, "header")?;

        let mut fields = &header[..];
        let lsn = fields.get_u64_le();
        let crc = fields.get_u32_le();
        let len = fields.get_u32_le() as u64;

        let remaining = self.file_len - self.position - HEADER_SIZE as u64;
        if len > remaining {
            return Err(KvError::WalCorruption(format!(
                "torn entry at offset {}: needs {} bytes, {} left",
                self.position, len, remaining
            )));
        }

        let mut data = vec![0u8; len as usize];
        self.read_exact_or_torn(&mut data, "data")?;

        let entry = WalEntry::decode(lsn, crc, &data)?;
        self.position += HEADER_SIZE as u64 + len;
        Ok(Some(entry))
    }

    fn read_exact_or_torn(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(KvError::WalCorruption(
                format!("torn {} at offset {}", what, self.position),
            )),
            Err(e) => Err(KvError::Io(e)),
        }
    }

    /// Offset just past the last entry successfully read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
