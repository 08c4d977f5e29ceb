//! Blocking Client
//!
//! Speaks the wire protocol to a PlugKV server.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

use crate::error::KvError;
use crate::protocol::{
    read_response, write_command, Command, Response, Status, MAX_PAYLOAD_SIZE,
};
use crate::service::ServiceError;
use crate::value::Value;

/// Client-side failure
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not talk to the server
    #[error(transparent)]
    Transport(#[from] KvError),

    /// The server answered with a non-OK status
    #[error("{0}")]
    Server(ServiceError),
}

impl ClientError {
    /// Status the server replied with, if it replied
    pub fn status(&self) -> Option<Status> {
        match self {
            ClientError::Server(e) => Some(e.status),
            ClientError::Transport(_) => None,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// A single connection to a server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    /// Largest response payload accepted from the server
    max_response_bytes: usize,
}

impl Client {
    /// Connect to `addr`
    pub fn connect(addr: impl ToSocketAddrs) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).map_err(KvError::from)?;
        stream.set_nodelay(true).map_err(KvError::from)?;
        let read_stream = stream.try_clone().map_err(KvError::from)?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            max_response_bytes: MAX_PAYLOAD_SIZE,
        })
    }

    /// Accept responses up to `bytes` of payload
    ///
    /// Match this to the server's `max_request_bytes` when it was raised
    /// above the default, or large stored values cannot be read back.
    pub fn set_max_response_bytes(&mut self, bytes: usize) {
        self.max_response_bytes = bytes;
    }

    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Bound how long a reply may take
    pub fn set_timeout(&self, timeout: Option<Duration>) -> ClientResult<()> {
        self.reader
            .get_ref()
            .set_read_timeout(timeout)
            .map_err(KvError::from)?;
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &Value) -> ClientResult<()> {
        self.call(Command::Set {
            key: key.to_string(),
            value: value.clone(),
        })?;
        Ok(())
    }

    pub fn get(&mut self, key: &str) -> ClientResult<Value> {
        let resp = self.call(Command::Get {
            key: key.to_string(),
        })?;
        let payload = resp.payload.unwrap_or_default();
        Ok(Value::decode(&payload)?)
    }

    pub fn delete(&mut self, key: &str) -> ClientResult<()> {
        self.call(Command::Delete {
            key: key.to_string(),
        })?;
        Ok(())
    }

    pub fn ping(&mut self) -> ClientResult<String> {
        let resp = self.call(Command::Ping)?;
        Ok(resp.message())
    }

    /// Send one command and wait for its response
    fn call(&mut self, command: Command) -> ClientResult<Response> {
        write_command(&mut self.writer, &command)?;
        let resp = read_response(&mut self.reader, self.max_response_bytes)?;

        match resp.status {
            Status::Ok => Ok(resp),
            status => Err(ClientError::Server(ServiceError {
                status,
                message: resp.message(),
            })),
        }
    }
}
