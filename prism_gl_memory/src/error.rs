//! Error types for the PrismGL memory subsystem
//!
//! This module defines the error types used throughout the crate,
//! covering GL-level failures, transfer failures, and contract misuse.

use std::fmt;

/// Result type for PrismGL memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// PrismGL memory errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (framebuffer incomplete, buffer map failure, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, allocator, etc.)
    InvalidResource(String),

    /// Initialization failed (registry, context thread)
    InitializationFailed(String),

    /// Operation is not supported by the context or violates a usage contract
    UnsupportedOperation(String),

    /// Backing byte sizes do not match for a respecifying copy
    SizeMismatch(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::UnsupportedOperation(msg) => write!(f, "Unsupported operation: {}", msg),
            Error::SizeMismatch(msg) => write!(f, "Size mismatch: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
