//! Error types for AtlasRMS
//!
//! Provides a unified error type for all record store operations.

use thiserror::Error;

use crate::types::RecordId;

/// Result type alias using RmsError
pub type Result<T> = std::result::Result<T, RmsError>;

/// Unified error type for AtlasRMS operations
#[derive(Debug, Error)]
pub enum RmsError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("Record store not found: {name}")]
    NotFound { name: String },

    #[error("Invalid record store name: length {len} is outside 1..=32")]
    InvalidName { len: usize },

    #[error("Record store is in use: {name}")]
    InUse { name: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Invalid record id: {0}")]
    InvalidId(RecordId),

    #[error("Record store is not open")]
    NotOpen,

    #[error("Record store is full: {requested} bytes requested, {available} available")]
    Full { requested: u64, available: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Enumeration Errors
    // -------------------------------------------------------------------------
    #[error("No more records in enumeration")]
    NoMoreRecords,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Record store corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
