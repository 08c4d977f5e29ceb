//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread (the caller of `Server::run`)
//! - One thread per open connection, capped at `Config::max_connections`
//! - Commands routed through `KvService`

mod server;
mod connection;
mod client;

pub use server::{Server, ShutdownHandle};
pub use connection::Connection;
pub use client::{Client, ClientError};
