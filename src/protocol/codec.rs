//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type
//! - GET:    key_len (4 bytes) + key
//! - SET:    key_len (4 bytes) + key + encoded value
//! - DELETE: key_len (4 bytes) + key
//! - PING:   empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Lengths are big-endian; keys are UTF-8.

use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};

use crate::error::{KvError, Result};
use crate::value::Value;
use super::{Command, CommandType, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Default maximum payload size (1.5 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 1536 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    let mut payload = BytesMut::new();

    match command {
        Command::Get { key } | Command::Delete { key } => put_key(&mut payload, key),
        Command::Set { key, value } => {
            put_key(&mut payload, key);
            payload.put_slice(&value.encode()?);
        }
        Command::Ping => {}
    }

    Ok(frame(command.command_type() as u8, &payload))
}

/// Decode a command from a complete frame
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    decode_command_limited(bytes, MAX_PAYLOAD_SIZE)
}

fn decode_command_limited(bytes: &[u8], max_payload: usize) -> Result<Command> {
    let (cmd_byte, payload) = split_frame(bytes, max_payload, "request")?;

    let cmd_type = CommandType::from_byte(cmd_byte).ok_or_else(|| {
        KvError::Protocol(format!("Unknown command type: 0x{:02x}", cmd_byte))
    })?;

    match cmd_type {
        CommandType::Get => {
            let key = key_only(payload, "GET")?;
            Ok(Command::Get { key })
        }
        CommandType::Set => {
            let (key, rest) = split_key(payload, "SET")?;
            let value = Value::decode(rest)
                .map_err(|e| KvError::Protocol(format!("SET command: {}", e)))?;
            Ok(Command::Set { key, value })
        }
        CommandType::Delete => {
            let key = key_only(payload, "DELETE")?;
            Ok(Command::Delete { key })
        }
        CommandType::Ping => {
            if !payload.is_empty() {
                return Err(KvError::Protocol(format!(
                    "PING command: unexpected payload of {} bytes",
                    payload.len()
                )));
            }
            Ok(Command::Ping)
        }
    }
}

/// Split `key_len (4) + key` off the front of a payload
fn split_key<'a>(payload: &'a [u8], name: &str) -> Result<(String, &'a [u8])> {
    if payload.len() < 4 {
        return Err(KvError::Protocol(format!(
            "{} command: missing key length",
            name
        )));
    }

    let key_len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let rest = &payload[4..];

    if rest.len() < key_len {
        return Err(KvError::Protocol(format!(
            "{} command: incomplete key (expected {}, got {})",
            name,
            key_len,
            rest.len()
        )));
    }

    let key = std::str::from_utf8(&rest[..key_len])
        .map_err(|_| KvError::Protocol(format!("{} command: key is not valid UTF-8", name)))?
        .to_string();

    Ok((key, &rest[key_len..]))
}

/// A payload that is exactly `key_len (4) + key`
fn key_only(payload: &[u8], name: &str) -> Result<String> {
    let (key, rest) = split_key(payload, name)?;
    if !rest.is_empty() {
        return Err(KvError::Protocol(format!(
            "{} command: {} unexpected bytes after key",
            name,
            rest.len()
        )));
    }
    Ok(key)
}

fn put_key(buf: &mut BytesMut, key: &str) {
    buf.put_u32(key.len() as u32);
    buf.put_slice(key.as_bytes());
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame(response.status as u8, payload)
}

/// Decode a response from a complete frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    decode_response_limited(bytes, MAX_PAYLOAD_SIZE)
}

fn decode_response_limited(bytes: &[u8], max_payload: usize) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, max_payload, "response")?;

    let status = Status::from_byte(status_byte).ok_or_else(|| {
        KvError::Protocol(format!("Unknown response status: 0x{:02x}", status_byte))
    })?;

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Framing
// =============================================================================

fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(tag);
    message.put_u32(payload.len() as u32);
    message.put_slice(payload);
    message.to_vec()
}

/// Validate a frame and return its tag and payload
fn split_frame<'a>(bytes: &'a [u8], max_payload: usize, what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(KvError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let payload_len = check_payload_len(&bytes[..HEADER_SIZE], max_payload, what)?;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(KvError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..total_len]))
}

fn check_payload_len(header: &[u8], max_payload: usize, what: &str) -> Result<usize> {
    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

    if payload_len > max_payload {
        return Err(KvError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, payload_len, max_payload
        )));
    }

    Ok(payload_len)
}

/// Read one whole frame (header + payload) from a stream
fn read_frame<R: Read>(reader: &mut R, max_payload: usize, what: &str) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = check_payload_len(&header, max_payload, what)?;

    let mut message = vec![0u8; HEADER_SIZE + payload_len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut message[HEADER_SIZE..])?;

    Ok(message)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs.
/// Frames with a payload above `max_payload` are rejected before the
/// payload is read.
pub fn read_command<R: Read>(reader: &mut R, max_payload: usize) -> Result<Command> {
    let message = read_frame(reader, max_payload, "request")?;
    decode_command_limited(&message, max_payload)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
///
/// Frames with a payload above `max_payload` are rejected before the
/// payload is read.
pub fn read_response<R: Read>(reader: &mut R, max_payload: usize) -> Result<Response> {
    let message = read_frame(reader, max_payload, "response")?;
    decode_response_limited(&message, max_payload)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
