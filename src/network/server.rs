//! TCP Server
//!
//! Accepts connections and serves each one on its own thread.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::protocol::{write_response, Response};
use crate::service::KvService;

use super::Connection;

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Cloneable handle that stops a running [`Server`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Stop accepting connections; in-flight ones finish their current
    /// request and close
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// TCP server for PlugKV
pub struct Server {
    config: Config,
    service: KvService,
    listener: Option<TcpListener>,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Create a new server with the given config and service
    pub fn new(config: Config, service: KvService) -> Self {
        Self {
            config,
            service,
            listener: None,
            shutdown: ShutdownHandle::default(),
        }
    }

    /// Bind the listen address; returns the bound address
    ///
    /// Called by `run` if needed. Binding first lets callers learn the
    /// port when listening on port 0.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            KvError::Network(format!("failed to bind {}: {}", self.config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Handle that stops `run` from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Start the server (blocking)
    ///
    /// Every accepted connection is served on its own thread, so an idle
    /// client never holds up another one. Returns after shutdown was
    /// requested and every connection has drained: in-flight requests get
    /// their response, idle connections are woken and closed.
    pub fn run(&mut self) -> Result<()> {
        let addr = self.bind()?;
        let listener = match self.listener.take() {
            Some(l) => l,
            None => return Err(KvError::Network("listener not bound".to_string())),
        };

        let open: OpenConnections = Arc::new(Mutex::new(HashMap::new()));
        let drained = WaitGroup::new();
        let mut next_id: u64 = 0;

        tracing::info!(
            "Serving on {} (max {} connections)",
            addr,
            self.config.max_connections
        );

        while !self.shutdown.is_shutdown() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!("Dropping connection from {}: {}", peer, e);
                        continue;
                    }

                    if open.lock().len() >= self.config.max_connections {
                        tracing::warn!("Connection limit reached, refusing {}", peer);
                        refuse(stream);
                        continue;
                    }

                    let id = next_id;
                    next_id += 1;
                    if let Err(e) = self.spawn_connection(id, stream, &open, &drained) {
                        tracing::error!("Failed to start connection thread for {}: {}", peer, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        drop(listener);

        // Wake connections blocked waiting for their next request
        let waiting = {
            let open = open.lock();
            for stream in open.values() {
                let _ = stream.shutdown(Shutdown::Read);
            }
            open.len()
        };
        tracing::info!("Shutting down, draining {} connections", waiting);
        drained.wait();

        Ok(())
    }

    fn spawn_connection(
        &self,
        id: u64,
        stream: TcpStream,
        open: &OpenConnections,
        drained: &WaitGroup,
    ) -> Result<()> {
        let registration = Registration::new(id, &stream, open)?;
        let service = self.service.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();
        let drained = drained.clone();

        thread::Builder::new()
            .name(format!("plugkv-conn-{}", id))
            .spawn(move || {
                serve(stream, &service, &config, &shutdown);
                drop(registration);
                drop(drained);
            })?;

        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn serve(stream: TcpStream, service: &KvService, config: &Config, shutdown: &ShutdownHandle) {
    let mut conn = match Connection::new(stream, service.clone(), config, shutdown.clone()) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("Failed to set up connection: {}", e);
            return;
        }
    };

    if let Err(e) = conn.handle() {
        tracing::debug!("Connection {} closed with error: {}", conn.peer_addr(), e);
    }
}

/// Live connections by id; the stored handle is a clone used to wake the
/// connection at shutdown
type OpenConnections = Arc<Mutex<HashMap<u64, TcpStream>>>;

/// Keeps a connection counted as open until it is dropped, even if its
/// thread panics
struct Registration {
    id: u64,
    open: OpenConnections,
}

impl Registration {
    fn new(id: u64, stream: &TcpStream, open: &OpenConnections) -> Result<Self> {
        open.lock().insert(id, stream.try_clone()?);
        Ok(Self {
            id,
            open: Arc::clone(open),
        })
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.open.lock().remove(&self.id);
    }
}

fn refuse(mut stream: TcpStream) {
    let _ = write_response(&mut stream, &Response::error("server busy"));
}
