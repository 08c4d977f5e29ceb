//! Engine Adapters
//!
//! Plugs [`Engine`] into the storage contract and provides the built-in
//! drivers:
//!
//! - `logdb`: durable, WAL-backed; location is a data directory
//! - `memory`: volatile; location is ignored

use std::path::Path;

use crate::config::WalSyncStrategy;
use crate::context::Context;
use crate::engine::Engine;
use crate::error::{KvError, Result};

use super::{
    DeleteItemRequest, DeleteItemResponse, Driver, GetItemRequest, GetItemResponse,
    KeyValueStore, PutItemRequest, PutItemResponse, Registry,
};

pub const LOGDB_DRIVER: &str = "logdb";
pub const MEMORY_DRIVER: &str = "memory";

/// Register every built-in driver
pub fn register_builtin(registry: &Registry, sync_strategy: WalSyncStrategy) {
    registry.register(LOGDB_DRIVER, LogDbDriver::new(sync_strategy));
    registry.register(MEMORY_DRIVER, MemoryDriver);
}

impl KeyValueStore for Engine {
    fn put_item(&self, ctx: &Context, req: PutItemRequest) -> Result<PutItemResponse> {
        self.put(ctx, &req.key, req.value)?;
        Ok(PutItemResponse)
    }

    fn get_item(&self, ctx: &Context, req: GetItemRequest) -> Result<GetItemResponse> {
        let value = self.get(ctx, &req.key)?;
        Ok(GetItemResponse {
            key: req.key,
            value,
        })
    }

    fn delete_item(&self, ctx: &Context, req: DeleteItemRequest) -> Result<DeleteItemResponse> {
        self.delete(ctx, &req.key)?;
        Ok(DeleteItemResponse)
    }

    fn close(&self, _ctx: &Context) -> Result<()> {
        // Acknowledged writes must reach disk even for a cancelled caller
        Engine::close(self)
    }
}

/// Driver for the durable WAL-backed engine
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDbDriver {
    sync_strategy: WalSyncStrategy,
}

impl LogDbDriver {
    pub fn new(sync_strategy: WalSyncStrategy) -> Self {
        Self { sync_strategy }
    }
}

impl Driver for LogDbDriver {
    fn open(&self, location: &str) -> Result<Box<dyn KeyValueStore>> {
        if location.trim().is_empty() {
            return Err(KvError::Config(
                "logdb driver needs a data directory".to_string(),
            ));
        }

        let engine = Engine::open(Path::new(location), self.sync_strategy)?;
        Ok(Box::new(engine))
    }
}

/// Driver for the volatile in-memory engine
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDriver;

impl Driver for MemoryDriver {
    fn open(&self, _location: &str) -> Result<Box<dyn KeyValueStore>> {
        Ok(Box::new(Engine::in_memory()))
    }
}
