//! Typed request/response messages

use serde::{Deserialize, Serialize};

use crate::pipeline::Query;

use super::RpcStatus;

/// Frame kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Put = 0x01,
    Get = 0x02,
    Delete = 0x03,
    StreamGet = 0x04,
    Ping = 0x05,
    PutResponse = 0x81,
    GetResponse = 0x82,
    DeleteResponse = 0x83,
    Item = 0x84,
    End = 0x85,
    Status = 0x86,
    Pong = 0x87,
}

impl FrameKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let kind = match byte {
            0x01 => FrameKind::Put,
            0x02 => FrameKind::Get,
            0x03 => FrameKind::Delete,
            0x04 => FrameKind::StreamGet,
            0x05 => FrameKind::Ping,
            0x81 => FrameKind::PutResponse,
            0x82 => FrameKind::GetResponse,
            0x83 => FrameKind::DeleteResponse,
            0x84 => FrameKind::Item,
            0x85 => FrameKind::End,
            0x86 => FrameKind::Status,
            0x87 => FrameKind::Pong,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutRequest {
    pub database: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    pub database: String,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: Vec<u8>,
    pub found: bool,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub database: String,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamGetRequest {
    pub database: String,
    pub query: Query,
}

/// One streamed item; a non-empty `error` marks a per-key failure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamGetResponse {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub error: String,
}

/// An inbound call
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Put(PutRequest),
    Get(GetRequest),
    Delete(DeleteRequest),
    StreamGet(StreamGetRequest),
    Ping,
}

impl Request {
    pub fn kind(&self) -> FrameKind {
        match self {
            Request::Put(_) => FrameKind::Put,
            Request::Get(_) => FrameKind::Get,
            Request::Delete(_) => FrameKind::Delete,
            Request::StreamGet(_) => FrameKind::StreamGet,
            Request::Ping => FrameKind::Ping,
        }
    }
}

/// A request plus the caller's deadline
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// Milliseconds the caller is willing to wait; 0 = no deadline
    pub timeout_ms: u64,
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            timeout_ms: 0,
            request,
        }
    }

    pub fn with_timeout(request: Request, timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            request,
        }
    }
}

/// An outbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Put(PutResponse),
    Get(GetResponse),
    Delete(DeleteResponse),
    Item(StreamGetResponse),
    End,
    Status(RpcStatus),
    Pong,
}

impl Response {
    pub fn kind(&self) -> FrameKind {
        match self {
            Response::Put(_) => FrameKind::PutResponse,
            Response::Get(_) => FrameKind::GetResponse,
            Response::Delete(_) => FrameKind::DeleteResponse,
            Response::Item(_) => FrameKind::Item,
            Response::End => FrameKind::End,
            Response::Status(_) => FrameKind::Status,
            Response::Pong => FrameKind::Pong,
        }
    }
}
