//! Error types for PlugKV
//!
//! Provides a unified error type for all operations, plus the closed
//! [`ErrorKind`] classification that storage callers branch on.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Classification of a [`KvError`] as seen by callers of the storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested key does not exist.
    NotFound,

    /// A concurrent mutation of the same key was detected. Retryable.
    Conflict,

    /// Anything else. Never retried automatically.
    Internal,
}

/// Unified error type for PlugKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Storage Contract Errors
    // -------------------------------------------------------------------------
    #[error("no item with key '{0}' exists")]
    KeyNotFound(String),

    #[error("a transaction conflict has occurred on key '{0}'")]
    Conflict(String),

    #[error("store is closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    // -------------------------------------------------------------------------
    // Driver Errors
    // -------------------------------------------------------------------------
    #[error("kvdb: unknown storage driver {0:?}")]
    UnknownDriver(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Fold this error into the closed kind callers match on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KvError::KeyNotFound(_) => ErrorKind::NotFound,
            KvError::Conflict(_) => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<bincode::Error> for KvError {
    fn from(err: bincode::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}
