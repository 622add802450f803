//! Memd protocol error types
//!
//! This module defines the error type shared by the codec, the handlers,
//! the storage layer and the DCP engine. Every variant maps to the wire
//! status code a client receives when the error surfaces in a response.

use thiserror::Error;

use crate::memd::constants::{
    MAX_BODY_LEN, STATUS_AUTH_ERROR, STATUS_EINVAL, STATUS_ERANGE, STATUS_INTERNAL_ERROR,
    STATUS_KEY_EEXISTS, STATUS_KEY_ENOENT, STATUS_NOT_MY_VBUCKET, STATUS_NOT_SUPPORTED,
    STATUS_NO_BUCKET, STATUS_UNKNOWN_COMMAND,
};

/// Errors that can occur while serving memd traffic
#[derive(Error, Debug)]
pub enum MemdError {
    /// Frame header or body could not be interpreted
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame body exceeds the accepted maximum
    #[error("Frame too large: {0} bytes (maximum {MAX_BODY_LEN})")]
    FrameTooLarge(usize),

    /// No handler registered for this opcode
    #[error("Unknown command: 0x{0:02x}")]
    UnknownCommand(u8),

    /// IO error occurred during network operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request arguments are invalid for the command
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Command requires a selected bucket
    #[error("No bucket selected")]
    NoBucket,

    /// Named bucket does not exist
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// This node does not own the addressed vbucket in the required role
    #[error("Not my vbucket: {0}")]
    NotMyVbucket(u16),

    /// Document does not exist
    #[error("Document not found")]
    KeyNotFound,

    /// Document exists (ADD) or CAS mismatch
    #[error("Document exists")]
    KeyExists,

    /// Sequence number bounds are inconsistent
    #[error("Sequence range invalid: start {start} > end {end}")]
    InvalidRange { start: u64, end: u64 },

    /// Authentication failed or is required
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Command is valid but not supported in this context
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The connection's outbound side is gone
    #[error("Transport closed")]
    TransportClosed,

    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization of a config/manifest payload failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MemdError {
    /// Convert this error to the status code sent back to the client
    pub fn to_status_code(&self) -> u16 {
        match self {
            MemdError::UnknownCommand(_) => STATUS_UNKNOWN_COMMAND,
            MemdError::InvalidFrame(_) | MemdError::InvalidArguments(_) => STATUS_EINVAL,
            MemdError::NoBucket => STATUS_NO_BUCKET,
            MemdError::BucketNotFound(_) | MemdError::KeyNotFound => STATUS_KEY_ENOENT,
            MemdError::NotMyVbucket(_) => STATUS_NOT_MY_VBUCKET,
            MemdError::KeyExists => STATUS_KEY_EEXISTS,
            MemdError::InvalidRange { .. } => STATUS_ERANGE,
            MemdError::AuthFailed(_) => STATUS_AUTH_ERROR,
            MemdError::NotSupported(_) => STATUS_NOT_SUPPORTED,
            MemdError::FrameTooLarge(_)
            | MemdError::Io(_)
            | MemdError::TransportClosed
            | MemdError::Storage(_)
            | MemdError::InvalidConfig(_)
            | MemdError::Serialization(_) => STATUS_INTERNAL_ERROR,
        }
    }

    /// Whether the error points at a server-side fault rather than a client mistake
    ///
    /// Server faults are logged at warn level, client errors at debug level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            MemdError::Io(_)
                | MemdError::Storage(_)
                | MemdError::InvalidConfig(_)
                | MemdError::Serialization(_)
        )
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        MemdError::Storage(msg.into())
    }

    pub fn invalid_args(msg: impl Into<String>) -> Self {
        MemdError::InvalidArguments(msg.into())
    }
}

/// Result type alias for memd operations
pub type Result<T> = std::result::Result<T, MemdError>;
