//! TCP Server
//!
//! Accepts connections and serves each on its own thread.
//!
//! ## Shutdown
//! 1. Stop accepting.
//! 2. Half-close every live connection for reading, so idle clients exit
//!    and in-flight calls finish writing their responses.
//! 3. After the grace period, close whatever is left outright; streams
//!    still running are cancelled through their failed writes.
//! 4. Join the connection threads, then close every database.

use std::collections::HashMap;
use std::io::{BufWriter, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::connection::Connection;
use crate::config::Config;
use crate::error::{Result, TenantError};
use crate::manager::DbManager;
use crate::protocol::{write_response, Response, RpcStatus, StatusCode};
use crate::service::KvService;
use crate::storage::{LsmEngine, StorageEngine};

/// How often the accept loop checks the shutdown flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How often the drain checks for finished connections
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cloneable handle that asks a running server to stop
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The raw flag, for registering with signal handlers
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Live connections, keyed by an id assigned at accept time
#[derive(Default)]
struct ConnectionRegistry {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, TcpStream>>,
}

impl ConnectionRegistry {
    fn register(&self, stream: &TcpStream) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().insert(id, stream.try_clone()?);
        Ok(id)
    }

    fn remove(&self, id: u64) {
        self.streams.lock().remove(&id);
    }

    fn len(&self) -> usize {
        self.streams.lock().len()
    }

    fn shutdown_all(&self, how: Shutdown) {
        for stream in self.streams.lock().values() {
            // The peer may already be gone
            let _ = stream.shutdown(how);
        }
    }
}

/// TCP server for TenantKV
pub struct Server<E: StorageEngine = LsmEngine> {
    config: Config,
    service: Arc<KvService<E>>,
    listener: Option<TcpListener>,
    shutdown: ShutdownHandle,
    connections: Arc<ConnectionRegistry>,
    workers: Vec<JoinHandle<()>>,
}

impl<E: StorageEngine> Server<E> {
    /// Validate `config` and prepare the base directory
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let manager = Arc::new(DbManager::new(&config));
        manager.ensure_base_dir()?;

        Ok(Self {
            service: Arc::new(KvService::new(manager)),
            config,
            listener: None,
            shutdown: ShutdownHandle::default(),
            connections: Arc::new(ConnectionRegistry::default()),
            workers: Vec::new(),
        })
    }

    /// Bind the listen address; `run` binds on its own if this was skipped
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            TenantError::Network(format!("failed to bind {}: {}", self.config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        let addr = listener.local_addr()?;
        tracing::info!("Listening on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn manager(&self) -> &Arc<DbManager<E>> {
        self.service.manager()
    }

    /// Serve until the shutdown handle fires, then drain and close
    pub fn run(&mut self) -> Result<()> {
        self.bind()?;
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => return Err(TenantError::Network("listener not bound".to_string())),
        };

        let result = self.accept_loop(&listener);
        drop(listener);

        self.drain();
        let closed = self.service.manager().close_all();
        tracing::info!("Server stopped; {} database(s) closed", closed);
        result
    }

    fn accept_loop(&mut self, listener: &TcpListener) -> Result<()> {
        while !self.shutdown.is_shutdown() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.admit(stream) {
                        tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    return Err(e.into());
                }
            }
            self.workers.retain(|w| !w.is_finished());
        }

        tracing::info!("Shutdown requested; no longer accepting connections");
        Ok(())
    }

    fn admit(&mut self, stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;

        if self.connections.len() >= self.config.max_connections {
            tracing::warn!(
                "Rejecting connection: {} connections open",
                self.config.max_connections
            );
            let status = RpcStatus::new(StatusCode::ResourceExhausted, "too many connections");
            let mut writer = BufWriter::new(stream);
            return write_response(&mut writer, &Response::Status(status));
        }

        let id = self.connections.register(&stream)?;
        let mut connection = match self.connection(stream) {
            Ok(connection) => connection,
            Err(e) => {
                self.connections.remove(id);
                return Err(e);
            }
        };

        let registry = Arc::clone(&self.connections);
        let spawned = thread::Builder::new()
            .name(format!("conn-{}", id))
            .spawn(move || {
                if let Err(e) = connection.handle() {
                    let peer = connection.peer_addr();
                    tracing::debug!("Connection {} ended with error: {}", peer, e);
                }
                registry.remove(id);
            });

        match spawned {
            Ok(worker) => {
                self.workers.push(worker);
                Ok(())
            }
            Err(e) => {
                self.connections.remove(id);
                Err(e.into())
            }
        }
    }

    fn connection(&self, stream: TcpStream) -> Result<Connection<E>> {
        let mut connection = Connection::new(stream, Arc::clone(&self.service))?;
        connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;
        Ok(connection)
    }

    fn drain(&mut self) {
        let open = self.connections.len();
        if open > 0 {
            tracing::info!("Draining {} connection(s)", open);
        }

        self.connections.shutdown_all(Shutdown::Read);

        let deadline = Instant::now() + self.config.shutdown_grace();
        while self.connections.len() > 0 && Instant::now() < deadline {
            thread::sleep(DRAIN_POLL_INTERVAL);
        }

        let remaining = self.connections.len();
        if remaining > 0 {
            tracing::warn!("Grace period expired; closing {} connection(s)", remaining);
            self.connections.shutdown_all(Shutdown::Both);
        }

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("Connection thread panicked");
            }
        }
    }
}
