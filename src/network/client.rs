//! Blocking client
//!
//! One request at a time over a single connection. A call the server ends
//! with a status frame comes back as [`TenantError::Rpc`].

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use crate::error::{Result, TenantError};
use crate::pipeline::Query;
use crate::protocol::{
    read_response, write_request, DeleteRequest, DeleteResponse, GetRequest, GetResponse,
    PutRequest, PutResponse, Request, RequestEnvelope, Response, StreamGetRequest,
    StreamGetResponse,
};

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    timeout_ms: u64,

    /// Set when a stream was abandoned or the connection failed mid-call;
    /// the framing can no longer be trusted
    broken: bool,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| TenantError::Network(format!("failed to connect: {}", e)))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            timeout_ms: 0,
            broken: false,
        })
    }

    /// Per-call deadline sent with every request; 0 = none
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn ping(&mut self) -> Result<()> {
        match self.call(Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub fn put(&mut self, database: &str, key: &[u8], value: &[u8]) -> Result<PutResponse> {
        let request = Request::Put(PutRequest {
            database: database.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        match self.call(request)? {
            Response::Put(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    pub fn get(&mut self, database: &str, key: &[u8]) -> Result<GetResponse> {
        let request = Request::Get(GetRequest {
            database: database.to_string(),
            key: key.to_vec(),
        });
        match self.call(request)? {
            Response::Get(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    pub fn delete(&mut self, database: &str, key: &[u8]) -> Result<DeleteResponse> {
        let request = Request::Delete(DeleteRequest {
            database: database.to_string(),
            key: key.to_vec(),
        });
        match self.call(request)? {
            Response::Delete(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    /// Start a streaming read; items arrive as the iterator is advanced
    ///
    /// Dropping the stream before it ends cancels the call and closes the
    /// connection.
    pub fn stream_get(&mut self, database: &str, query: Query) -> Result<ClientStream<'_>> {
        let request = Request::StreamGet(StreamGetRequest {
            database: database.to_string(),
            query,
        });
        self.send(request)?;
        Ok(ClientStream {
            client: self,
            done: false,
        })
    }

    /// Collect a whole prefix scan
    pub fn scan_prefix(
        &mut self,
        database: &str,
        prefix: &[u8],
    ) -> Result<Vec<StreamGetResponse>> {
        self.stream_get(database, Query::Prefix(prefix.to_vec()))?.collect()
    }

    /// Collect a whole multi-key fetch
    pub fn get_multiple(
        &mut self,
        database: &str,
        keys: Vec<Vec<u8>>,
    ) -> Result<Vec<StreamGetResponse>> {
        self.stream_get(database, Query::Keys(keys))?.collect()
    }

    fn send(&mut self, request: Request) -> Result<()> {
        if self.broken {
            return Err(TenantError::Network("connection is closed".to_string()));
        }
        let envelope = RequestEnvelope::with_timeout(request, self.timeout_ms);
        write_request(&mut self.writer, &envelope).inspect_err(|_| self.broken = true)
    }

    fn recv(&mut self) -> Result<Response> {
        read_response(&mut self.reader).inspect_err(|_| self.broken = true)
    }

    /// Send one request and read its single response
    fn call(&mut self, request: Request) -> Result<Response> {
        self.send(request)?;
        match self.recv()? {
            Response::Status(status) => Err(status.into()),
            response => Ok(response),
        }
    }

    fn abandon(&mut self) {
        self.broken = true;
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

/// Items of one streaming call
pub struct ClientStream<'a> {
    client: &'a mut Client,
    done: bool,
}

impl Iterator for ClientStream<'_> {
    type Item = Result<StreamGetResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let outcome = match self.client.recv() {
            Ok(Response::Item(item)) => return Some(Ok(item)),
            Ok(Response::End) => None,
            Ok(Response::Status(status)) => Some(Err(status.into())),
            Ok(other) => {
                self.client.broken = true;
                Some(Err(unexpected(&other)))
            }
            Err(e) => Some(Err(e)),
        };
        self.done = true;
        outcome
    }
}

impl Drop for ClientStream<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!("Abandoning unfinished stream");
            self.client.abandon();
        }
    }
}

fn unexpected(response: &Response) -> TenantError {
    TenantError::Protocol(format!("Unexpected response: {:?}", response.kind()))
}
