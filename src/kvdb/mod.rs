//! KVDB Module
//!
//! The storage contract every engine satisfies, and the registry that
//! selects an engine by name at startup.
//!
//! ## Contract
//! - `put_item` upserts; a concurrent mutation of the same key that would
//!   break consistency fails with `KvError::Conflict` (caller retries)
//! - `get_item` returns the latest acknowledged value or
//!   `KvError::KeyNotFound`
//! - `delete_item` removes an existing key; an absent key is
//!   `KvError::KeyNotFound`, a racing mutation is `KvError::Conflict`
//! - `close` flushes acknowledged writes; call it exactly once
//!
//! Adapters classify only the not-found and conflict conditions; every
//! other engine failure passes through and is treated as internal.

mod driver;
mod adapter;

pub use driver::{Driver, Registry};
pub use adapter::{register_builtin, LogDbDriver, MemoryDriver, LOGDB_DRIVER, MEMORY_DRIVER};

use crate::context::Context;
use crate::error::Result;

/// Interface for managing items in a key/value database
pub trait KeyValueStore: Send + Sync {
    /// Idempotently upsert the item in the request.
    fn put_item(&self, ctx: &Context, req: PutItemRequest) -> Result<PutItemResponse>;

    /// Fetch the item stored under the requested key.
    fn get_item(&self, ctx: &Context, req: GetItemRequest) -> Result<GetItemResponse>;

    /// Remove the item stored under the requested key.
    fn delete_item(&self, ctx: &Context, req: DeleteItemRequest) -> Result<DeleteItemResponse>;

    /// Flush unwritten data to the underlying storage and release it.
    fn close(&self, ctx: &Context) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutItemRequest {
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutItemResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItemRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItemResponse {
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItemRequest {
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteItemResponse;

impl PutItemRequest {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl GetItemRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl DeleteItemRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}
