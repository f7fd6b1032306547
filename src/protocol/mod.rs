//! Protocol Module
//!
//! Wire protocol between clients and the service.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Request payloads start with an 8-byte big-endian timeout in
//! milliseconds (0 = no deadline) followed by the bincode-encoded message.
//! Response payloads are the bincode-encoded message alone.
//!
//! ### Request Kinds
//! - 0x01: PUT        - PutRequest
//! - 0x02: GET        - GetRequest
//! - 0x03: DELETE     - DeleteRequest
//! - 0x04: STREAM_GET - StreamGetRequest
//! - 0x05: PING       - empty message
//!
//! ### Response Kinds
//! - 0x81: PUT        - PutResponse
//! - 0x82: GET        - GetResponse
//! - 0x83: DELETE     - DeleteResponse
//! - 0x84: ITEM       - StreamGetResponse (one per streamed item)
//! - 0x85: END        - stream completed normally
//! - 0x86: STATUS     - RpcStatus (call or stream aborted)
//! - 0x87: PONG       - empty message

mod codec;
mod messages;
mod status;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use messages::{
    DeleteRequest, DeleteResponse, FrameKind, GetRequest, GetResponse, PutRequest, PutResponse,
    Request, RequestEnvelope, Response, StreamGetRequest, StreamGetResponse,
};
pub use status::{RpcStatus, StatusCode};
