//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;

use super::messages::FrameKind;
use super::{Request, RequestEnvelope, Response};
use crate::error::{Result, TenantError};

/// Header size: 1 byte kind + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Size of the timeout prefix of every request payload
const TIMEOUT_SIZE: usize = 8;

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request frame
pub fn encode_request(envelope: &RequestEnvelope) -> Result<Bytes> {
    let body = match &envelope.request {
        Request::Put(msg) => bincode::serialize(msg)?,
        Request::Get(msg) => bincode::serialize(msg)?,
        Request::Delete(msg) => bincode::serialize(msg)?,
        Request::StreamGet(msg) => bincode::serialize(msg)?,
        Request::Ping => Vec::new(),
    };

    let mut payload = Vec::with_capacity(TIMEOUT_SIZE + body.len());
    payload.extend_from_slice(&envelope.timeout_ms.to_be_bytes());
    payload.extend_from_slice(&body);

    frame(envelope.request.kind(), &payload)
}

/// Decode a complete request frame
pub fn decode_request(bytes: &[u8]) -> Result<RequestEnvelope> {
    let (kind, payload) = split_frame(bytes)?;

    if payload.len() < TIMEOUT_SIZE {
        return Err(TenantError::Protocol(format!(
            "Request payload too short: {} bytes",
            payload.len()
        )));
    }
    let mut timeout = [0u8; TIMEOUT_SIZE];
    timeout.copy_from_slice(&payload[..TIMEOUT_SIZE]);
    let timeout_ms = u64::from_be_bytes(timeout);
    let body = &payload[TIMEOUT_SIZE..];

    let request = match kind {
        FrameKind::Put => Request::Put(decode_body(body)?),
        FrameKind::Get => Request::Get(decode_body(body)?),
        FrameKind::Delete => Request::Delete(decode_body(body)?),
        FrameKind::StreamGet => Request::StreamGet(decode_body(body)?),
        FrameKind::Ping => {
            expect_empty(kind, body)?;
            Request::Ping
        }
        other => {
            return Err(TenantError::Protocol(format!(
                "Unexpected frame kind in request: {:?}",
                other
            )))
        }
    };

    Ok(RequestEnvelope {
        timeout_ms,
        request,
    })
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response frame
pub fn encode_response(response: &Response) -> Result<Bytes> {
    let payload = match response {
        Response::Put(msg) => bincode::serialize(msg)?,
        Response::Get(msg) => bincode::serialize(msg)?,
        Response::Delete(msg) => bincode::serialize(msg)?,
        Response::Item(msg) => bincode::serialize(msg)?,
        Response::Status(msg) => bincode::serialize(msg)?,
        Response::End | Response::Pong => Vec::new(),
    };

    frame(response.kind(), &payload)
}

/// Decode a complete response frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (kind, payload) = split_frame(bytes)?;

    let response = match kind {
        FrameKind::PutResponse => Response::Put(decode_body(payload)?),
        FrameKind::GetResponse => Response::Get(decode_body(payload)?),
        FrameKind::DeleteResponse => Response::Delete(decode_body(payload)?),
        FrameKind::Item => Response::Item(decode_body(payload)?),
        FrameKind::Status => Response::Status(decode_body(payload)?),
        FrameKind::End => {
            expect_empty(kind, payload)?;
            Response::End
        }
        FrameKind::Pong => {
            expect_empty(kind, payload)?;
            Response::Pong
        }
        other => {
            return Err(TenantError::Protocol(format!(
                "Unexpected frame kind in response: {:?}",
                other
            )))
        }
    };

    Ok(response)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete request from a stream
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_request<R: Read>(reader: &mut R) -> Result<RequestEnvelope> {
    decode_request(&read_frame(reader)?)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, envelope: &RequestEnvelope) -> Result<()> {
    let bytes = encode_request(envelope)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    decode_response(&read_frame(reader)?)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Framing helpers
// =============================================================================

fn frame(kind: FrameKind, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(TenantError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(kind as u8);
    message.put_u32(payload.len() as u32);
    message.put_slice(payload);
    Ok(message.freeze())
}

/// Validate the header and return the kind and exact payload slice
fn split_frame(bytes: &[u8]) -> Result<(FrameKind, &[u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(TenantError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let kind = FrameKind::from_byte(bytes[0]).ok_or_else(|| {
        TenantError::Protocol(format!("Unknown frame kind: 0x{:02x}", bytes[0]))
    })?;
    let payload_len = payload_len(&bytes[..HEADER_SIZE])?;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(TenantError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    Ok((kind, &bytes[HEADER_SIZE..total_len]))
}

fn payload_len(header: &[u8]) -> Result<usize> {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(TenantError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = payload_len(&header)?;

    let mut message = vec![0u8; HEADER_SIZE + payload_len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    if payload_len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }
    Ok(message)
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    bincode::deserialize(body)
        .map_err(|e| TenantError::Protocol(format!("Malformed message: {}", e)))
}

fn expect_empty(kind: FrameKind, body: &[u8]) -> Result<()> {
    if !body.is_empty() {
        return Err(TenantError::Protocol(format!(
            "{:?} frame: unexpected payload of {} bytes",
            kind,
            body.len()
        )));
    }
    Ok(())
}
