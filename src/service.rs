//! Request Service
//!
//! Translates typed Set/Get/Delete requests into storage calls and storage
//! failures into wire statuses.
//!
//! ## Error Mapping
//! - `ErrorKind::NotFound` → `Status::NotFound`, "key '<key>' not found"
//! - `ErrorKind::Conflict` → `Status::Conflict`, fixed retry message
//! - anything else → `Status::Error`, fixed message; detail is logged
//!   server-side only

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{ErrorKind, KvError};
use crate::kvdb::{DeleteItemRequest, GetItemRequest, KeyValueStore, PutItemRequest};
use crate::protocol::{Command, Response, Status};
use crate::value::Value;

pub const INTERNAL_ERROR_MESSAGE: &str = "an internal server error has occurred";
pub const CONFLICT_MESSAGE: &str = "a transaction conflict has occurred, retry the request";

/// A failed request as the caller sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub status: Status,
    pub message: String,
}

impl ServiceError {
    pub fn not_found(key: &str) -> Self {
        Self {
            status: Status::NotFound,
            message: format!("key '{}' not found", key),
        }
    }

    pub fn conflict() -> Self {
        Self {
            status: Status::Conflict,
            message: CONFLICT_MESSAGE.to_string(),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: Status::Error,
            message: INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for ServiceError {}

/// Successful Get
#[derive(Debug, Clone, PartialEq)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

/// Stateless front-end over one shared store handle
#[derive(Clone)]
pub struct KvService {
    store: Arc<dyn KeyValueStore>,
}

impl KvService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Store `value` under `key`
    pub fn set(&self, ctx: &Context, key: &str, value: &Value) -> Result<(), ServiceError> {
        let bytes = value.encode().map_err(|e| {
            tracing::error!("failed to encode value for key '{}': {}", key, e);
            ServiceError::internal()
        })?;

        self.store
            .put_item(ctx, PutItemRequest::new(key, bytes))
            .map_err(|e| storage_failure("put_item", key, e))?;

        Ok(())
    }

    /// Fetch and decode the value stored under `key`
    pub fn get(&self, ctx: &Context, key: &str) -> Result<GetResponse, ServiceError> {
        let item = self
            .store
            .get_item(ctx, GetItemRequest::new(key))
            .map_err(|e| storage_failure("get_item", key, e))?;

        let value = Value::decode(&item.value).map_err(|e| {
            tracing::error!("failed to decode stored value for key '{}': {}", key, e);
            ServiceError::internal()
        })?;

        Ok(GetResponse {
            key: item.key,
            value,
        })
    }

    /// Remove `key`
    pub fn delete(&self, ctx: &Context, key: &str) -> Result<(), ServiceError> {
        self.store
            .delete_item(ctx, DeleteItemRequest::new(key))
            .map_err(|e| storage_failure("delete_item", key, e))?;

        Ok(())
    }

    /// Execute a protocol command and build its response
    pub fn handle(&self, ctx: &Context, command: Command) -> Response {
        let result = match command {
            Command::Get { key } => self.get(ctx, &key).and_then(|resp| {
                resp.value.encode().map(Some).map_err(|e| {
                    tracing::error!("failed to re-encode value for key '{}': {}", key, e);
                    ServiceError::internal()
                })
            }),
            Command::Set { key, value } => self.set(ctx, &key, &value).map(|_| None),
            Command::Delete { key } => self.delete(ctx, &key).map(|_| None),
            Command::Ping => Ok(Some(b"PONG".to_vec())),
        };

        match result {
            Ok(payload) => Response::ok(payload),
            Err(e) => Response::failure(e.status, &e.message),
        }
    }
}

/// Re-classify a storage error for the caller
fn storage_failure(op: &str, key: &str, err: KvError) -> ServiceError {
    match err.kind() {
        ErrorKind::NotFound => ServiceError::not_found(key),
        ErrorKind::Conflict => {
            tracing::debug!("{} conflict on key '{}'", op, key);
            ServiceError::conflict()
        }
        ErrorKind::Internal => {
            tracing::error!("{} failed for key '{}': {}", op, key, err);
            ServiceError::internal()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::kvdb::{DeleteItemResponse, GetItemResponse, PutItemResponse};

    /// Store whose every call fails with a fixed error
    struct FailingStore(fn() -> KvError);

    impl KeyValueStore for FailingStore {
        fn put_item(&self, _: &Context, _: PutItemRequest) -> Result<PutItemResponse> {
            Err((self.0)())
        }

        fn get_item(&self, _: &Context, _: GetItemRequest) -> Result<GetItemResponse> {
            Err((self.0)())
        }

        fn delete_item(&self, _: &Context, _: DeleteItemRequest) -> Result<DeleteItemResponse> {
            Err((self.0)())
        }

        fn close(&self, _: &Context) -> Result<()> {
            Ok(())
        }
    }

    /// Store that hands back bytes no codec wrote
    struct CorruptStore;

    impl KeyValueStore for CorruptStore {
        fn put_item(&self, _: &Context, _: PutItemRequest) -> Result<PutItemResponse> {
            Ok(PutItemResponse)
        }

        fn get_item(&self, _: &Context, req: GetItemRequest) -> Result<GetItemResponse> {
            Ok(GetItemResponse {
                key: req.key,
                value: vec![0xde, 0xad, 0xbe, 0xef, 0x00],
            })
        }

        fn delete_item(&self, _: &Context, _: DeleteItemRequest) -> Result<DeleteItemResponse> {
            Ok(DeleteItemResponse)
        }

        fn close(&self, _: &Context) -> Result<()> {
            Ok(())
        }
    }

    fn service_over(store: impl KeyValueStore + 'static) -> KvService {
        KvService::new(Arc::new(store))
    }

    #[test]
    fn test_conflict_is_retryable_status() {
        let svc = service_over(FailingStore(|| KvError::Conflict("k".into())));
        let err = svc.set(&Context::background(), "k", &Value::Null).unwrap_err();

        assert_eq!(err.status, Status::Conflict);
        assert!(err.status.is_retryable());
    }

    #[test]
    fn test_engine_error_text_is_not_leaked() {
        let svc = service_over(FailingStore(|| KvError::Storage("secret path /var/db".into())));
        let err = svc.get(&Context::background(), "k").unwrap_err();

        assert_eq!(err, ServiceError::internal());
        assert!(!err.message.contains("secret"));
    }

    #[test]
    fn test_not_found_carries_key() {
        let svc = service_over(FailingStore(|| KvError::KeyNotFound("gone".into())));
        let err = svc.delete(&Context::background(), "gone").unwrap_err();

        assert_eq!(err.status, Status::NotFound);
        assert_eq!(err.message, "key 'gone' not found");
    }

    #[test]
    fn test_undecodable_value_is_internal() {
        let svc = service_over(CorruptStore);
        let err = svc.get(&Context::background(), "k").unwrap_err();
        assert_eq!(err.status, Status::Error);
        assert_eq!(err.message, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_handle_ping() {
        let svc = service_over(CorruptStore);
        let resp = svc.handle(&Context::background(), Command::Ping);
        assert_eq!(resp, Response::ok(Some(b"PONG".to_vec())));
    }
}
