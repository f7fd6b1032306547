//! Error types for TenantKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::protocol::StatusCode;

/// Result type alias using TenantError
pub type Result<T> = std::result::Result<T, TenantError>;

/// Unified error type for TenantKV operations
#[derive(Debug, Error)]
pub enum TenantError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Request Validation
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Failed to open database at '{path}': {message}")]
    StorageOpen { path: String, message: String },

    #[error("Read failed: {0}")]
    StorageRead(String),

    #[error("Write failed: {0}")]
    StorageWrite(String),

    #[error("Iterator error: {0}")]
    IteratorFault(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Streaming / Network Errors
    // -------------------------------------------------------------------------
    #[error("Stream transport error: {0}")]
    StreamTransport(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A call rejected by the remote side with a status code
    #[error("{code}: {message}")]
    Rpc { code: StatusCode, message: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for TenantError {
    fn from(err: bincode::Error) -> Self {
        TenantError::Serialization(err.to_string())
    }
}

impl TenantError {
    /// Status code a request-level failure is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            TenantError::Validation(_) | TenantError::StorageOpen { .. } => {
                StatusCode::InvalidArgument
            }
            TenantError::Closed => StatusCode::Unavailable,
            TenantError::Rpc { code, .. } => *code,
            _ => StatusCode::Internal,
        }
    }
}
