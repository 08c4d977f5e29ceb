//! Server Tests
//!
//! Client/server round trips over loopback TCP, ending with a clean
//! shutdown through `ShutdownHandle`.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use plugkv::kvdb::{Registry, LOGDB_DRIVER, MEMORY_DRIVER};
use plugkv::network::{Client, ClientError, Server, ShutdownHandle};
use plugkv::protocol::{read_response, Status, MAX_PAYLOAD_SIZE};
use plugkv::{Config, KvService, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct RunningServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: JoinHandle<plugkv::Result<()>>,
}

impl RunningServer {
    fn stop(self) {
        self.shutdown.shutdown();
        self.thread.join().unwrap().unwrap();
    }
}

fn test_config() -> Config {
    Config::builder()
        .listen_addr("127.0.0.1:0")
        .max_connections(16)
        .build()
}

fn start_server(config: Config) -> RunningServer {
    let store = Registry::with_builtin()
        .open(&config.driver, &config.location)
        .unwrap();
    let service = KvService::new(Arc::from(store));

    let mut server = Server::new(config, service);
    let addr = server.bind().unwrap();
    let shutdown = server.shutdown_handle();
    let thread = thread::spawn(move || server.run());

    RunningServer {
        addr,
        shutdown,
        thread,
    }
}

fn memory_server() -> RunningServer {
    let mut config = test_config();
    config.driver = MEMORY_DRIVER.to_string();
    start_server(config)
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_ping() {
    let server = memory_server();

    let mut client = Client::connect(server.addr).unwrap();
    assert_eq!(client.ping().unwrap(), "PONG");

    drop(client);
    server.stop();
}

#[test]
fn test_set_get_delete_over_tcp() {
    let server = memory_server();
    let mut client = Client::connect(server.addr).unwrap();

    let doc = Value::from(serde_json::json!({"x": 1}));
    client.set("a", &doc).unwrap();
    assert_eq!(client.get("a").unwrap(), doc);

    client.set("a", &Value::from(42i64)).unwrap();
    client.set("a", &Value::from("hello")).unwrap();
    assert_eq!(client.get("a").unwrap(), Value::from("hello"));

    client.delete("a").unwrap();

    match client.get("a").unwrap_err() {
        ClientError::Server(e) => {
            assert_eq!(e.status, Status::NotFound);
            assert_eq!(e.message, "key 'a' not found");
        }
        other => panic!("expected a server error, got {:?}", other),
    }

    let err = client.delete("a").unwrap_err();
    assert_eq!(err.status(), Some(Status::NotFound));

    drop(client);
    server.stop();
}

#[test]
fn test_many_clients_in_parallel() {
    let server = memory_server();
    let addr = server.addr;

    let handles: Vec<_> = (0..8)
        .map(|t| {
            thread::spawn(move || {
                let mut client = Client::connect(addr).unwrap();
                for i in 0..25 {
                    let key = format!("client{}-key{}", t, i);
                    client.set(&key, &Value::from(i as i64)).unwrap();
                    assert_eq!(client.get(&key).unwrap(), Value::from(i as i64));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    server.stop();
}

#[test]
fn test_oversized_request_gets_error_reply() {
    let mut config = test_config();
    config.driver = MEMORY_DRIVER.to_string();
    config.max_request_bytes = 1024;
    let server = start_server(config);

    // Header only: the server must reject on the declared length alone
    let mut stream = TcpStream::connect(server.addr).unwrap();
    let mut header = vec![0x02];
    header.extend_from_slice(&4096u32.to_be_bytes());
    stream.write_all(&header).unwrap();

    let resp = read_response(&mut stream, MAX_PAYLOAD_SIZE).unwrap();
    assert_eq!(resp.status, Status::Error);
    assert!(resp.message().contains("too large"));

    drop(stream);
    server.stop();
}

#[test]
fn test_logdb_server_persists_across_restart() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config();
    config.driver = LOGDB_DRIVER.to_string();
    config.location = temp.path().to_str().unwrap().to_string();

    {
        let server = start_server(config.clone());
        let mut client = Client::connect(server.addr).unwrap();
        client.set("durable", &Value::from(vec![Value::from(1i64), Value::Null])).unwrap();
        drop(client);
        server.stop();
    }

    let server = start_server(config);
    let mut client = Client::connect(server.addr).unwrap();
    assert_eq!(
        client.get("durable").unwrap(),
        Value::List(vec![Value::Number(1.0), Value::Null])
    );
    drop(client);
    server.stop();
}

// =============================================================================
// Connection Handling Tests
// =============================================================================

#[test]
fn test_idle_connections_do_not_delay_others() {
    let server = memory_server();

    // Peers that connect and never send a request
    let idle: Vec<TcpStream> = (0..6)
        .map(|_| TcpStream::connect(server.addr).unwrap())
        .collect();

    let started = Instant::now();
    let mut client = Client::connect(server.addr).unwrap();
    assert_eq!(client.ping().unwrap(), "PONG");
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "ping waited {:?} behind idle connections",
        started.elapsed()
    );

    drop(idle);
    drop(client);
    server.stop();
}

#[test]
fn test_connection_limit_refuses_extra() {
    let mut config = test_config();
    config.driver = MEMORY_DRIVER.to_string();
    config.max_connections = 1;
    let server = start_server(config);

    let mut first = Client::connect(server.addr).unwrap();
    assert_eq!(first.ping().unwrap(), "PONG");

    let mut extra = TcpStream::connect(server.addr).unwrap();
    let resp = read_response(&mut extra, MAX_PAYLOAD_SIZE).unwrap();
    assert_eq!(resp.status, Status::Error);
    assert_eq!(resp.message(), "server busy");
    drop(extra);

    // The slot frees up once the first client goes away
    drop(first);
    let mut admitted = false;
    for _ in 0..100 {
        let mut next = Client::connect(server.addr).unwrap();
        if next.ping().is_ok() {
            admitted = true;
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(admitted, "connection slot was never released");

    server.stop();
}

#[test]
fn test_shutdown_wakes_idle_connection() {
    let server = memory_server();
    let mut client = Client::connect(server.addr).unwrap();
    assert_eq!(client.ping().unwrap(), "PONG");

    // Client stays connected and silent; shutdown must not wait for the
    // read timeout
    let started = Instant::now();
    server.stop();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(client.ping().is_err());
}

#[test]
fn test_large_values_need_matching_client_limit() {
    let mut config = test_config();
    config.driver = MEMORY_DRIVER.to_string();
    config.max_request_bytes = 4 * 1024 * 1024;
    let server = start_server(config);

    let big = Value::from("x".repeat(2 * 1024 * 1024));

    let mut client = Client::connect(server.addr).unwrap();
    client.set_max_response_bytes(4 * 1024 * 1024);
    client.set("big", &big).unwrap();
    assert_eq!(client.get("big").unwrap(), big);

    let mut default_client = Client::connect(server.addr).unwrap();
    assert_eq!(default_client.max_response_bytes(), MAX_PAYLOAD_SIZE);
    let err = default_client.get("big").unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "{:?}", err);

    drop(default_client);
    drop(client);
    server.stop();
}

#[test]
fn test_shutdown_without_clients() {
    let server = memory_server();
    assert!(!server.shutdown.is_shutdown());
    server.stop();
}
