//! Service Tests
//!
//! End-to-end request flows through `KvService` over real stores:
//! structured values in, wire statuses out.

use std::sync::Arc;

use plugkv::kvdb::{Registry, LOGDB_DRIVER, MEMORY_DRIVER};
use plugkv::protocol::{Command, Status};
use plugkv::service::{ServiceError, CONFLICT_MESSAGE, INTERNAL_ERROR_MESSAGE};
use plugkv::{Context, KvService, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn memory_service() -> KvService {
    let store = Registry::with_builtin().open(MEMORY_DRIVER, "").unwrap();
    KvService::new(Arc::from(store))
}

fn logdb_service(dir: &TempDir) -> KvService {
    let store = Registry::with_builtin()
        .open(LOGDB_DRIVER, dir.path().to_str().unwrap())
        .unwrap();
    KvService::new(Arc::from(store))
}

fn bg() -> Context {
    Context::background()
}

// =============================================================================
// Request Flow Tests
// =============================================================================

#[test]
fn test_set_get_delete_get() {
    let svc = memory_service();
    let value = Value::from(serde_json::json!({"x": 1}));

    svc.set(&bg(), "a", &value).unwrap();

    let got = svc.get(&bg(), "a").unwrap();
    assert_eq!(got.key, "a");
    assert_eq!(got.value, value);

    svc.delete(&bg(), "a").unwrap();

    let err = svc.get(&bg(), "a").unwrap_err();
    assert_eq!(err.status, Status::NotFound);
    assert_eq!(err.message, "key 'a' not found");
}

#[test]
fn test_overwrite_changes_type() {
    let svc = memory_service();

    svc.set(&bg(), "k", &Value::from(42i64)).unwrap();
    svc.set(&bg(), "k", &Value::from("hello")).unwrap();

    assert_eq!(svc.get(&bg(), "k").unwrap().value, Value::from("hello"));
}

#[test]
fn test_delete_missing_key() {
    let svc = memory_service();
    let err = svc.delete(&bg(), "ghost").unwrap_err();
    assert_eq!(err, ServiceError::not_found("ghost"));
}

#[test]
fn test_every_value_shape_survives_logdb_reopen() {
    let temp = TempDir::new().unwrap();
    let value = Value::from(serde_json::json!({
        "null": null,
        "flag": false,
        "n": -3.25,
        "s": "text",
        "list": [1, "two", [3]],
        "map": {"inner": {"deep": true}}
    }));

    {
        let svc = logdb_service(&temp);
        svc.set(&bg(), "doc", &value).unwrap();
        svc.store().close(&bg()).unwrap();
    }

    let svc = logdb_service(&temp);
    assert_eq!(svc.get(&bg(), "doc").unwrap().value, value);
}

#[test]
fn test_closed_store_maps_to_internal_error() {
    let svc = memory_service();
    svc.store().close(&bg()).unwrap();

    let err = svc.set(&bg(), "k", &Value::Null).unwrap_err();
    assert_eq!(err.status, Status::Error);
    assert_eq!(err.message, INTERNAL_ERROR_MESSAGE);
}

#[test]
fn test_cancelled_request_is_internal_and_harmless() {
    let svc = memory_service();
    let ctx = Context::background();
    ctx.cancel();

    let err = svc.set(&ctx, "k", &Value::from(1i64)).unwrap_err();
    assert_eq!(err.status, Status::Error);
    assert!(svc.get(&bg(), "k").is_err());
}

#[test]
fn test_conflict_message_is_fixed() {
    let err = ServiceError::conflict();
    assert_eq!(err.status, Status::Conflict);
    assert_eq!(err.message, CONFLICT_MESSAGE);
}

// =============================================================================
// Command Dispatch Tests
// =============================================================================

#[test]
fn test_handle_commands() {
    let svc = memory_service();

    let resp = svc.handle(
        &bg(),
        Command::Set {
            key: "a".into(),
            value: Value::from(true),
        },
    );
    assert_eq!(resp.status, Status::Ok);
    assert!(resp.payload.is_none());

    let resp = svc.handle(&bg(), Command::Get { key: "a".into() });
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(Value::decode(&resp.payload.unwrap()).unwrap(), Value::Bool(true));

    let resp = svc.handle(&bg(), Command::Delete { key: "a".into() });
    assert_eq!(resp.status, Status::Ok);

    let resp = svc.handle(&bg(), Command::Get { key: "a".into() });
    assert_eq!(resp.status, Status::NotFound);
    assert_eq!(resp.message(), "key 'a' not found");
}
