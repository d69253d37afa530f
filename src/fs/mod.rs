//! Filesystem capability layer
//!
//! The store core never touches `std::fs` directly; it consumes the
//! [`Fs`] trait so backends can be swapped (real disk, in-memory, or a
//! decorator such as [`RetryFs`]).
//!
//! ## Error contract
//!
//! Every method returns `io::Result` and must surface a not-found
//! condition as `io::ErrorKind::NotFound` and an already-exists
//! condition (relevant to `mkdir` and `create_new`) as
//! `io::ErrorKind::AlreadyExists`. The core dispatches on those kinds.

mod disk;
mod mem;
mod retry;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub use disk::DiskFs;
pub use mem::MemFs;
pub use retry::RetryFs;

/// File metadata as observed by `stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Size in bytes (0 for directories on some backends)
    pub len: u64,

    /// Permission bits (unix mode; 0 where not applicable)
    pub mode: u32,

    /// Owner user id (0 where not applicable)
    pub uid: u32,

    /// Owner group id (0 where not applicable)
    pub gid: u32,

    /// Whether the path is a directory
    pub is_dir: bool,
}

/// An open writable file handle
///
/// Closing is dropping; close failures are swallowed by `Drop`, which is
/// exactly the contract the atomic writer wants (the descriptor may
/// already be invalid after an earlier error).
pub trait FsFile: Write + Send {
    /// Flush file contents and metadata to the storage device.
    fn sync_all(&mut self) -> io::Result<()>;
}

/// The capability set the store core depends on
///
/// All methods take `&self`; backends manage their own synchronization
/// and must be `Send + Sync`.
pub trait Fs: Send + Sync {
    /// Stat a path.
    fn stat(&self, path: &Path) -> io::Result<FileMeta>;

    /// Open a file for reading.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Open a file for writing, creating or truncating it.
    fn open_write(&self, path: &Path) -> io::Result<Box<dyn FsFile>>;

    /// Create a file that must not already exist (O_EXCL semantics).
    /// Surfaces `AlreadyExists` when it does.
    fn create_new(&self, path: &Path) -> io::Result<()>;

    /// Read a whole file into memory.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace a whole file's contents (non-atomically).
    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Rename `from` onto `to`, replacing `to` if present.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file. Surfaces `NotFound` when absent.
    fn unlink(&self, path: &Path) -> io::Result<()>;

    /// Set permission bits.
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Set owner/group.
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;

    /// Resolve a path to its canonical form, following symlinks.
    fn realpath(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create a single directory. Surfaces `AlreadyExists` and, for a
    /// missing parent, `NotFound`.
    fn mkdir(&self, path: &Path) -> io::Result<()>;
}

/// Lexically absolutize a path against the current working directory
/// without touching the filesystem (no symlink resolution).
///
/// Equivalent relative and absolute spellings of the same location must
/// map to the same key, both for the per-path write queue and for the
/// in-memory backend's storage keys.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    // Normalize "." and ".." components lexically.
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
