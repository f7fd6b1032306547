//! Request Dispatcher
//!
//! Maps each inbound call to a manager lookup followed by a point operation
//! or a retrieval pipeline, and translates the outcome into responses.
//!
//! | Call      | Lookup failure            | Operation failure                  |
//! |-----------|---------------------------|------------------------------------|
//! | Put       | `INVALID_ARGUMENT` status | `success=false` + message          |
//! | Get       | `INVALID_ARGUMENT` status | `found=false` + message            |
//! | Delete    | `INVALID_ARGUMENT` status | `success=false` + message          |
//! | StreamGet | `INVALID_ARGUMENT` status | error items; a fault → `INTERNAL`  |
//!
//! Point calls keep storage failures in the response body so a caller can
//! tell "the request never reached storage" from "the key operation failed".

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, TenantError};
use crate::handle::Database;
use crate::manager::DbManager;
use crate::pipeline::{PipelineState, Recv, ResultItem, ResultStream};
use crate::protocol::{
    DeleteRequest, DeleteResponse, GetRequest, GetResponse, PutRequest, PutResponse, Request,
    RequestEnvelope, Response, RpcStatus, StreamGetRequest, StreamGetResponse,
};
use crate::storage::{LsmEngine, StorageEngine};

/// Outcome of a call: a response body or a terminal status
pub type CallResult<T> = std::result::Result<T, RpcStatus>;

/// Destination for the frames of one call
pub trait ResponseSink {
    fn send(&mut self, response: Response) -> Result<()>;
}

impl ResponseSink for Vec<Response> {
    fn send(&mut self, response: Response) -> Result<()> {
        self.push(response);
        Ok(())
    }
}

/// The service behind every connection
pub struct KvService<E: StorageEngine = LsmEngine> {
    manager: Arc<DbManager<E>>,
}

impl<E: StorageEngine> KvService<E> {
    pub fn new(manager: Arc<DbManager<E>>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<DbManager<E>> {
        &self.manager
    }

    /// Run one call, writing its frames to `sink`
    ///
    /// `received` is when the request arrived; the caller's timeout counts
    /// from there. Errors returned here are sink failures only.
    pub fn dispatch<S: ResponseSink>(
        &self,
        envelope: RequestEnvelope,
        received: Instant,
        sink: &mut S,
    ) -> Result<()> {
        let deadline = (envelope.timeout_ms > 0)
            .then(|| received + Duration::from_millis(envelope.timeout_ms));

        let response = match envelope.request {
            Request::Ping => Response::Pong,
            Request::Put(req) => match self.put(req, deadline) {
                Ok(resp) => Response::Put(resp),
                Err(status) => Response::Status(status),
            },
            Request::Get(req) => match self.get(req, deadline) {
                Ok(resp) => Response::Get(resp),
                Err(status) => Response::Status(status),
            },
            Request::Delete(req) => match self.delete(req, deadline) {
                Ok(resp) => Response::Delete(resp),
                Err(status) => Response::Status(status),
            },
            Request::StreamGet(req) => return self.serve_stream(req, deadline, sink),
        };

        sink.send(response)
    }

    // =========================================================================
    // Point operations
    // =========================================================================

    pub fn put(&self, req: PutRequest, deadline: Option<Instant>) -> CallResult<PutResponse> {
        require_key(&req.key)?;
        let db = self.lookup(&req.database, deadline)?;

        Ok(match db.put(&req.key, &req.value) {
            Ok(()) => PutResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => PutResponse {
                success: false,
                error: e.to_string(),
            },
        })
    }

    pub fn get(&self, req: GetRequest, deadline: Option<Instant>) -> CallResult<GetResponse> {
        require_key(&req.key)?;
        let db = self.lookup(&req.database, deadline)?;

        Ok(match db.get(&req.key) {
            Ok(Some(value)) => GetResponse {
                value,
                found: true,
                error: String::new(),
            },
            Ok(None) => GetResponse::default(),
            Err(e) => GetResponse {
                value: Vec::new(),
                found: false,
                error: e.to_string(),
            },
        })
    }

    pub fn delete(
        &self,
        req: DeleteRequest,
        deadline: Option<Instant>,
    ) -> CallResult<DeleteResponse> {
        require_key(&req.key)?;
        let db = self.lookup(&req.database, deadline)?;

        Ok(match db.delete(&req.key) {
            Ok(()) => DeleteResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => DeleteResponse {
                success: false,
                error: e.to_string(),
            },
        })
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    /// Resolve the database and start the pipeline for `req`
    pub fn stream_get(&self, req: StreamGetRequest) -> CallResult<ResultStream> {
        let db = self.lookup(&req.database, None)?;
        db.stream(req.query).map_err(|e| {
            RpcStatus::new(e.status_code(), format!("failed to start stream: {}", e))
        })
    }

    /// Wire form of a streamed item; a fault ends the call instead
    pub fn item_frame(item: ResultItem) -> CallResult<StreamGetResponse> {
        match item {
            ResultItem::Value { key, value } => Ok(StreamGetResponse {
                key,
                value,
                error: String::new(),
            }),
            ResultItem::Error { key, message } => Ok(StreamGetResponse {
                key,
                value: Vec::new(),
                error: message,
            }),
            ResultItem::Fault { message } => {
                Err(RpcStatus::internal(format!("stream error: {}", message)))
            }
        }
    }

    fn serve_stream<S: ResponseSink>(
        &self,
        req: StreamGetRequest,
        deadline: Option<Instant>,
        sink: &mut S,
    ) -> Result<()> {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return sink.send(Response::Status(RpcStatus::deadline_exceeded()));
        }

        let database = req.database.clone();
        let mut stream = match self.stream_get(req) {
            Ok(stream) => stream,
            Err(status) => return sink.send(Response::Status(status)),
        };

        let mut sent = 0usize;
        loop {
            let next = match deadline {
                Some(d) => stream.recv_deadline(d),
                None => stream.recv(),
            };

            match next {
                Recv::Item(item) => match Self::item_frame(item) {
                    Ok(frame) => {
                        if let Err(e) = sink.send(Response::Item(frame)) {
                            let state = stream.finish();
                            tracing::debug!(
                                "Stream on '{}' cancelled after {} items ({:?}): {}",
                                database,
                                sent,
                                state,
                                e
                            );
                            return Err(TenantError::StreamTransport(e.to_string()));
                        }
                        sent += 1;
                    }
                    Err(status) => {
                        stream.finish();
                        tracing::warn!("Stream on '{}' failed: {}", database, status.message);
                        return sink.send(Response::Status(status));
                    }
                },
                Recv::TimedOut => {
                    stream.finish();
                    tracing::debug!("Stream on '{}' hit its deadline", database);
                    return sink.send(Response::Status(RpcStatus::deadline_exceeded()));
                }
                Recv::Finished => {
                    // Only a fully produced stream ends with `End`
                    let response = match stream.finish() {
                        PipelineState::Completed => Response::End,
                        PipelineState::Failed => {
                            Response::Status(RpcStatus::internal("stream producer failed"))
                        }
                        state => Response::Status(RpcStatus::internal(format!(
                            "stream ended early ({:?})",
                            state
                        ))),
                    };
                    tracing::trace!("Stream on '{}' finished with {} items", database, sent);
                    return sink.send(response);
                }
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn lookup(
        &self,
        database: &str,
        deadline: Option<Instant>,
    ) -> CallResult<Arc<Database<E>>> {
        let db = self.manager.resolve(database).map_err(|e| {
            RpcStatus::new(e.status_code(), format!("failed to get database: {}", e))
        })?;

        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(RpcStatus::deadline_exceeded());
        }
        Ok(db)
    }
}

fn require_key(key: &[u8]) -> CallResult<()> {
    if key.is_empty() {
        return Err(RpcStatus::invalid_argument("key cannot be empty"));
    }
    Ok(())
}
