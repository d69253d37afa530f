//! Error types for atomstore
//!
//! Provides a unified error type for all operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for store operations
///
/// `Io` keeps the underlying `io::Error` intact so callers can still
/// inspect `ErrorKind::NotFound` / `ErrorKind::AlreadyExists`.
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Facade Errors
    // -------------------------------------------------------------------------
    /// `read_existing` on a file that is not there.
    #[error("{file} does not exist")]
    Missing { file: String },

    /// A validator rejected the document.
    #[error("{0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Optimistic Locking Errors
    // -------------------------------------------------------------------------
    /// Raised before any I/O: versioned writes require a JSON object.
    #[error(
        "with optimistic locking enabled the written data must be a JSON object, \
         got a value of the \"{actual}\" type"
    )]
    TypeMismatch { actual: &'static str },

    /// A revision was supplied for a file that was never versioned.
    #[error(
        "revision ({payload}) cannot be supplied when updating the not yet versioned file \"{file}\""
    )]
    UnversionedTarget { file: String, payload: u64 },

    /// Stored and payload revisions diverged.
    #[error(
        "\"{file}\" has been updated by another process; revisions of the stored ({stored}) \
         and payload ({payload}) data don't match"
    )]
    RevisionConflict {
        file: String,
        /// Stored revision, or "none" when the stored document is unversioned.
        stored: String,
        /// Payload revision, or "none" when absent/malformed.
        payload: String,
    },

    // -------------------------------------------------------------------------
    // Atomic Write Errors
    // -------------------------------------------------------------------------
    /// The rename step of an atomic write failed. Carries the secondary
    /// unlink failure, if cleaning up the temp file failed too.
    #[error("failed to rename \"{tmp}\" => \"{target}\": {source}")]
    AtomicCommit {
        tmp: String,
        target: String,
        source: io::Error,
        unlink_error: Option<io::Error>,
    },

    // -------------------------------------------------------------------------
    // Cross-Process Lock Errors
    // -------------------------------------------------------------------------
    #[error("timed out acquiring lock \"{lock_file}\" after {elapsed:?}")]
    LockTimeout {
        lock_file: String,
        elapsed: Duration,
    },
}

impl StoreError {
    /// True when the underlying cause is a not-found I/O error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}
