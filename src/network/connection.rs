//! Connection Handler
//!
//! Serves the calls of one client connection, one at a time.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, TenantError};
use crate::protocol::{read_request, write_response, Response, RpcStatus};
use crate::service::{KvService, ResponseSink};
use crate::storage::{LsmEngine, StorageEngine};

/// Buffered write half; every frame is flushed so streamed items reach the
/// client as they are produced
pub struct FrameWriter {
    inner: BufWriter<TcpStream>,
}

impl ResponseSink for FrameWriter {
    fn send(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.inner, &response)
    }
}

/// Handles a single client connection
pub struct Connection<E: StorageEngine = LsmEngine> {
    reader: BufReader<TcpStream>,
    writer: FrameWriter,
    service: Arc<KvService<E>>,

    /// Peer address for logging
    peer_addr: String,
}

impl<E: StorageEngine> Connection<E> {
    pub fn new(stream: TcpStream, service: Arc<KvService<E>>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Streamed items are small; don't let Nagle hold them back
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: FrameWriter {
                inner: BufWriter::new(stream),
            },
            service,
            peer_addr,
        })
    }

    /// Configure socket timeouts; 0 leaves a direction unbounded
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .inner
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Serve calls until the client disconnects or the socket is shut down
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let envelope = match read_request(&mut self.reader) {
                Ok(envelope) => envelope,
                Err(TenantError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(TenantError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    // Windows reports a read timeout as TimedOut
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    let status = RpcStatus::invalid_argument(e.to_string());
                    let _ = self.writer.send(Response::Status(status));
                    return Err(e);
                }
            };

            tracing::trace!(
                "Received {:?} from {} (timeout {}ms)",
                envelope.request.kind(),
                self.peer_addr,
                envelope.timeout_ms
            );

            if let Err(e) = self
                .service
                .dispatch(envelope, Instant::now(), &mut self.writer)
            {
                // Dispatch only fails when a frame could not be written
                tracing::debug!(
                    "Client {} went away before the call completed: {}",
                    self.peer_addr,
                    e
                );
                return Ok(());
            }
        }
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
