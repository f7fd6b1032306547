//! Storage Handle
//!
//! One open engine bound to one logical database directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TenantError};
use crate::pipeline::{self, PipelineState, Query, ResultItem, ResultStream, StreamOptions};
use crate::storage::{EngineOptions, LsmEngine, ReadOptions, StorageEngine, WriteOptions};

/// An open logical database
///
/// Only [`DbManager`](crate::manager::DbManager) creates and closes these;
/// everyone else borrows an `Arc` for the duration of a call.
pub struct Database<E: StorageEngine = LsmEngine> {
    name: String,
    path: PathBuf,
    engine: E,
    read_options: ReadOptions,
    write_options: WriteOptions,
    stream_options: StreamOptions,
    closed: AtomicBool,
}

impl<E: StorageEngine> Database<E> {
    /// Open (creating if needed) the engine at `path`
    pub(crate) fn open(
        name: &str,
        path: &Path,
        engine_options: &EngineOptions,
        stream_options: StreamOptions,
    ) -> Result<Self> {
        let engine = E::open(path, engine_options).map_err(|e| TenantError::StorageOpen {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            engine,
            read_options: ReadOptions::default(),
            write_options: WriteOptions::default(),
            stream_options,
            closed: AtomicBool::new(false),
        })
    }

    /// Unconditional upsert
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.engine
            .put(key, value, &self.write_options)
            .map_err(|e| TenantError::StorageWrite(e.to_string()))
    }

    /// `Ok(None)` when the key is absent
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.engine
            .get(key, &self.read_options)
            .map_err(|e| TenantError::StorageRead(e.to_string()))
    }

    /// Deleting an absent key succeeds
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.engine
            .delete(key, &self.write_options)
            .map_err(|e| TenantError::StorageWrite(e.to_string()))
    }

    /// Stream every key starting with `prefix`, in key order
    pub fn scan_by_prefix(self: &Arc<Self>, prefix: &[u8]) -> Result<ResultStream> {
        self.ensure_open()?;
        let db = Arc::clone(self);
        let prefix = prefix.to_vec();

        ResultStream::spawn(&self.name, self.stream_options, move |out| {
            match db.engine.iter() {
                Ok(iter) => pipeline::scan_prefix(iter, &prefix, out),
                Err(e) => {
                    let fault = ResultItem::Fault {
                        message: TenantError::IteratorFault(e.to_string()).to_string(),
                    };
                    match out.send(fault) {
                        Ok(()) => PipelineState::Failed,
                        Err(_) => PipelineState::Draining,
                    }
                }
            }
        })
    }

    /// Stream the values of `keys` that exist, in the given order
    pub fn get_multiple(self: &Arc<Self>, keys: Vec<Vec<u8>>) -> Result<ResultStream> {
        self.ensure_open()?;
        let db = Arc::clone(self);

        ResultStream::spawn(&self.name, self.stream_options, move |out| {
            pipeline::fetch_keys(&keys, |key| db.get(key), out)
        })
    }

    /// Run either kind of query
    pub fn stream(self: &Arc<Self>, query: Query) -> Result<ResultStream> {
        match query {
            Query::Prefix(prefix) => self.scan_by_prefix(&prefix),
            Query::Keys(keys) => self.get_multiple(keys),
        }
    }

    /// Release the engine; later calls fail with `Closed`
    ///
    /// Only the first call does anything.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.engine.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying engine (for inspection in tests and tools)
    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TenantError::Closed);
        }
        Ok(())
    }
}

impl<E: StorageEngine> std::fmt::Debug for Database<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
