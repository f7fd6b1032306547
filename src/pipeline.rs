//! Retrieval Pipeline
//!
//! Turns a bulk read into an ordered, incremental stream of [`ResultItem`]s.
//!
//! ## Shape
//! ```text
//!   producer thread                         consumer (connection thread)
//!   ───────────────                         ────────────────────────────
//!   iterator / point gets ──► bounded channel (capacity N) ──► ResultStream
//! ```
//!
//! - The producer blocks while the channel is full, so memory stays bounded
//!   no matter how large the scan is.
//! - Dropping the [`ResultStream`] disconnects the channel; the producer's
//!   next handoff fails and it exits, releasing its iterator.
//! - A slow consumer only pauses the producer. It never cuts the stream
//!   short.
//!
//! ## States
//! `Idle -> Producing -> {Draining, Completed, Failed}`. `Draining` means the
//! consumer went away before production finished.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Result, TenantError};
use crate::storage::EngineIterator;

/// What a streaming read asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    /// Every key starting with these bytes; empty matches all keys
    Prefix(Vec<u8>),

    /// These keys, in this order
    Keys(Vec<Vec<u8>>),
}

/// One unit of streamed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultItem {
    /// A key and its value
    Value { key: Vec<u8>, value: Vec<u8> },

    /// Reading this key failed; the stream goes on
    Error { key: Vec<u8>, message: String },

    /// The traversal itself failed; always the last item of a stream
    Fault { message: String },
}

impl ResultItem {
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            ResultItem::Value { key, .. } | ResultItem::Error { key, .. } => Some(key),
            ResultItem::Fault { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultItem::Value { .. })
    }
}

/// Lifecycle of one streaming call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Producing = 1,
    /// Consumer left early; producer stopped
    Draining = 2,
    Completed = 3,
    Failed = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Idle,
            1 => PipelineState::Producing,
            2 => PipelineState::Draining,
            3 => PipelineState::Completed,
            _ => PipelineState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PipelineState::Idle | PipelineState::Producing)
    }
}

/// Channel sizing for streams
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Items the producer may run ahead of the consumer
    pub capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions::from(&Config::default())
    }
}

impl From<&Config> for StreamOptions {
    fn from(config: &Config) -> Self {
        Self {
            capacity: config.stream_buffer.max(1),
        }
    }
}

/// Producer side of the handoff channel
pub struct Handoff {
    sender: Sender<ResultItem>,
}

impl Handoff {
    /// Hand one item to the consumer, waiting while the channel is full
    ///
    /// Fails only once the consumer has gone away.
    pub fn send(&self, item: ResultItem) -> Result<()> {
        self.sender
            .send(item)
            .map_err(|_| TenantError::StreamTransport("consumer disconnected".to_string()))
    }
}

/// Outcome of waiting for the next item
#[derive(Debug, PartialEq, Eq)]
pub enum Recv {
    Item(ResultItem),
    /// The producer finished and every item has been taken
    Finished,
    TimedOut,
}

/// Consumer side of one streaming call
pub struct ResultStream {
    receiver: Option<Receiver<ResultItem>>,
    producer: Option<JoinHandle<PipelineState>>,
    state: Arc<AtomicU8>,
}

impl ResultStream {
    /// Start `produce` on its own thread
    ///
    /// `produce` returns the terminal state it reached.
    pub fn spawn<F>(name: &str, options: StreamOptions, produce: F) -> Result<Self>
    where
        F: FnOnce(&Handoff) -> PipelineState + Send + 'static,
    {
        let (sender, receiver) = channel::bounded(options.capacity.max(1));
        let state = Arc::new(AtomicU8::new(PipelineState::Idle as u8));
        let producer_state = Arc::clone(&state);
        let handoff = Handoff { sender };

        let producer = thread::Builder::new()
            .name(format!("stream-{}", name))
            .spawn(move || {
                producer_state.store(PipelineState::Producing as u8, Ordering::SeqCst);
                let outcome = produce(&handoff);
                producer_state.store(outcome as u8, Ordering::SeqCst);
                outcome
            })?;

        Ok(Self {
            receiver: Some(receiver),
            producer: Some(producer),
            state,
        })
    }

    /// Block until the next item or the end of the stream
    pub fn recv(&mut self) -> Recv {
        match &self.receiver {
            Some(receiver) => match receiver.recv() {
                Ok(item) => Recv::Item(item),
                Err(_) => Recv::Finished,
            },
            None => Recv::Finished,
        }
    }

    /// Like `recv`, giving up at `deadline`
    pub fn recv_deadline(&mut self, deadline: Instant) -> Recv {
        match &self.receiver {
            Some(receiver) => match receiver.recv_deadline(deadline) {
                Ok(item) => Recv::Item(item),
                Err(RecvTimeoutError::Timeout) => Recv::TimedOut,
                Err(RecvTimeoutError::Disconnected) => Recv::Finished,
            },
            None => Recv::Finished,
        }
    }

    /// Current producer state
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Stop consuming and wait for the producer to exit
    ///
    /// After the last item this reports `Completed` or `Failed`; called
    /// earlier it cancels the stream and reports `Draining`.
    pub fn finish(mut self) -> PipelineState {
        self.receiver.take();
        match self.producer.take().map(JoinHandle::join) {
            Some(Ok(state)) => state,
            Some(Err(_)) => {
                tracing::error!("stream producer panicked");
                PipelineState::Failed
            }
            None => self.state(),
        }
    }

    /// Abandon the stream before its last item
    pub fn cancel(self) -> PipelineState {
        tracing::debug!("stream cancelled by consumer");
        self.finish()
    }
}

impl Iterator for ResultStream {
    type Item = ResultItem;

    fn next(&mut self) -> Option<ResultItem> {
        match self.recv() {
            Recv::Item(item) => Some(item),
            _ => None,
        }
    }
}

// =============================================================================
// Producers
// =============================================================================

/// Emit every entry whose key starts with `prefix`, in iterator order
///
/// A fault reported by the iterator after the loop becomes exactly one
/// trailing [`ResultItem::Fault`].
pub fn scan_prefix<I: EngineIterator>(mut iter: I, prefix: &[u8], out: &Handoff) -> PipelineState {
    iter.seek(prefix);

    while iter.valid() {
        let key = iter.key();
        if !key.starts_with(prefix) {
            break;
        }

        // The engine may reuse its buffers; hand out owned copies
        let item = ResultItem::Value {
            key: key.to_vec(),
            value: iter.value().to_vec(),
        };
        if let Err(e) = out.send(item) {
            tracing::debug!("prefix scan stopped: {}", e);
            return PipelineState::Draining;
        }
        iter.next();
    }

    if let Err(e) = iter.status() {
        let fault = ResultItem::Fault {
            message: e.to_string(),
        };
        if out.send(fault).is_err() {
            return PipelineState::Draining;
        }
        return PipelineState::Failed;
    }

    PipelineState::Completed
}

/// Look up each key in order
///
/// Found keys become `Value` items, read failures become `Error` items and
/// the fetch moves on, absent keys produce nothing.
pub fn fetch_keys<G>(keys: &[Vec<u8>], mut get: G, out: &Handoff) -> PipelineState
where
    G: FnMut(&[u8]) -> Result<Option<Vec<u8>>>,
{
    for key in keys {
        let item = match get(key) {
            Ok(Some(value)) => ResultItem::Value {
                key: key.clone(),
                value,
            },
            Ok(None) => continue,
            Err(e) => ResultItem::Error {
                key: key.clone(),
                message: e.to_string(),
            },
        };

        if let Err(e) = out.send(item) {
            tracing::debug!("multi-key fetch stopped: {}", e);
            return PipelineState::Draining;
        }
    }

    PipelineState::Completed
}
