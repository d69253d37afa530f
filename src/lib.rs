//! # atomstore
//!
//! An atomic single-file document store with:
//! - Temp-file-write-then-rename atomic replacement
//! - Revision-based optimistic concurrency control
//! - Per-path FIFO write ordering within the process
//! - Advisory cross-process locking
//! - Pluggable filesystem backends (real disk or in-memory)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Store<E> facade                        │
//! │        (serialize / adapter / validators / re-read)          │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │ versioned writes            │
//!                 ▼                             │
//!        ┌─────────────────┐                    │
//!        │  FileLock       │ <file>.lock        │
//!        │  + revision     │ resolve next rev   │
//!        └────────┬────────┘                    │
//!                 │                             │
//!                 ▼                             ▼
//!        ┌─────────────────────────────────────────┐
//!        │          write_file_atomic              │
//!        │   per-path FIFO queue → temp + rename   │
//!        └────────────────────┬────────────────────┘
//!                             │
//!                             ▼
//!        ┌─────────────────────────────────────────┐
//!        │   RetryFs over Fs (DiskFs / MemFs)      │
//!        └─────────────────────────────────────────┘
//! ```
//!
//! A reader never observes a partially written file: the filesystem
//! presents either the old complete file or the new complete file at
//! any instant. Concurrent writers cannot silently lose updates: a
//! versioned write must claim the currently stored revision, and the
//! lock + resolve + write sequence is the unit of atomicity for
//! revision assignment.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod fs;
pub mod atomic;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{AtomicWriteOptions, LockOptions, RetryPolicy, RetryRule};
pub use fs::{DiskFs, FileMeta, Fs, FsFile, MemFs, RetryFs};
pub use atomic::write_file_atomic;
pub use store::{Adapter, Store, StoreBuilder, Validator};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of atomstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
