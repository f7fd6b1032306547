//! Instance Manager
//!
//! Maps logical database names to open [`Database`] handles.
//!
//! ## Responsibilities
//! - Validate database names
//! - Open a database lazily on first reference
//! - Guarantee at most one handle per name
//! - Close every handle at shutdown

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Result, TenantError};
use crate::handle::Database;
use crate::pipeline::StreamOptions;
use crate::storage::{EngineOptions, LsmEngine, StorageEngine};

/// Registry of open databases
///
/// ## Concurrency:
/// - Lookups of known names share a read lock.
/// - Creating a database takes the write lock and re-checks the map, so two
///   callers racing on the same unseen name open it exactly once.
/// - `close_all` must only run once nothing else calls into the manager.
pub struct DbManager<E: StorageEngine = LsmEngine> {
    base_dir: PathBuf,
    engine_options: EngineOptions,
    stream_options: StreamOptions,
    databases: RwLock<HashMap<String, Arc<Database<E>>>>,
}

impl<E: StorageEngine> DbManager<E> {
    /// Manager rooted at `config.base_dir`
    pub fn new(config: &Config) -> Self {
        Self::with_options(
            &config.base_dir,
            EngineOptions::from(config),
            StreamOptions::from(config),
        )
    }

    pub fn with_options(
        base_dir: impl Into<PathBuf>,
        engine_options: EngineOptions,
        stream_options: StreamOptions,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            engine_options,
            stream_options,
            databases: RwLock::new(HashMap::new()),
        }
    }

    /// Return the handle for `name`, opening it on first use
    pub fn resolve(&self, name: &str) -> Result<Arc<Database<E>>> {
        validate_name(name)?;

        if let Some(db) = self.databases.read().get(name) {
            return Ok(Arc::clone(db));
        }

        let mut databases = self.databases.write();

        // Another caller may have opened it while we waited for the lock
        if let Some(db) = databases.get(name) {
            tracing::debug!("Database '{}' opened concurrently", name);
            return Ok(Arc::clone(db));
        }

        let path = self.base_dir.join(name);
        let db = Arc::new(Database::open(
            name,
            &path,
            &self.engine_options,
            self.stream_options,
        )?);

        tracing::info!("Opened database '{}' at {}", name, path.display());
        databases.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Close every handle and forget them; returns how many were closed
    ///
    /// Safe to call more than once.
    pub fn close_all(&self) -> usize {
        let mut databases = self.databases.write();
        let count = databases.len();

        for (name, db) in databases.drain() {
            match db.close() {
                Ok(()) => tracing::debug!("Closed database '{}'", name),
                Err(e) => tracing::warn!("Failed to close database '{}' cleanly: {}", name, e),
            }
        }

        if count > 0 {
            tracing::info!("Closed {} database(s)", count);
        }
        count
    }

    /// Names of the open databases, sorted
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.databases.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.databases.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.read().is_empty()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create the base directory up front so a bad path fails at startup
    pub fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

/// A name must be non-empty and a single path component
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TenantError::Validation(
            "database name cannot be empty".to_string(),
        ));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(TenantError::Validation(format!(
            "database name '{}' must be a single path component",
            name
        )));
    }
    Ok(())
}
