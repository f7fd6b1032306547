//! Network Module
//!
//! TCP server and blocking client.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One thread per connection, capped at `max_connections`
//! - Calls routed through [`KvService`](crate::service::KvService)

mod client;
mod connection;
mod server;

pub use client::{Client, ClientStream};
pub use connection::{Connection, FrameWriter};
pub use server::{Server, ShutdownHandle};
