//! # PlugKV
//!
//! A network key-value store with pluggable, transactional storage:
//! - A storage contract (`KeyValueStore`) with explicit conflict semantics
//! - A driver registry that selects the engine by name at startup
//! - A request service mapping storage errors to wire statuses
//! - A WAL-backed reference engine with optimistic transactions
//! - A TCP protocol, threaded server and blocking client
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (Acceptor + Worker Pool)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Command
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    KvService                                 │
//! │        (Value codec, error → Status mapping)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ dyn KeyValueStore
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │          Registry::open(driver, location)                    │
//! │                "logdb" | "memory"                            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │ (Versioned) │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;

pub mod value;
pub mod wal;
pub mod memtable;
pub mod engine;
pub mod kvdb;
pub mod service;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, KvError, Result};
pub use config::Config;
pub use context::Context;
pub use engine::Engine;
pub use kvdb::{KeyValueStore, Registry};
pub use service::KvService;
pub use value::Value;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of PlugKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
