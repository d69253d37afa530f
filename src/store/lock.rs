//! Cross-Process Lock
//!
//! An advisory lock bracketing the resolve-revision + atomic-write
//! sequence, implemented as a sibling `<file>.lock` artifact created
//! exclusively through the store's own filesystem capability (so
//! in-memory-backed stores lock in memory). Well-behaved participants
//! respect it; the OS does not enforce it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::LockOptions;
use crate::error::{Result, StoreError};
use crate::fs::Fs;

const LOCK_SUFFIX: &str = ".lock";

/// Held advisory lock; released unconditionally on drop.
pub struct FileLock {
    fs: Arc<dyn Fs>,
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquire the lock for `target`, polling while it is held
    /// elsewhere. `options.timeout == None` polls indefinitely.
    pub fn acquire(fs: Arc<dyn Fs>, target: &Path, options: &LockOptions) -> Result<Self> {
        let lock_path = lock_path_for(target);
        let started = Instant::now();

        loop {
            match fs.create_new(&lock_path) {
                Ok(()) => {
                    debug!(lock = %lock_path.display(), "lock acquired");
                    return Ok(Self { fs, lock_path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let elapsed = started.elapsed();
                    if let Some(timeout) = options.timeout {
                        if elapsed >= timeout {
                            return Err(StoreError::LockTimeout {
                                lock_file: lock_path.display().to_string(),
                                elapsed,
                            });
                        }
                    }
                    std::thread::sleep(options.poll_interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        match self.fs.unlink(&self.lock_path) {
            Ok(()) => debug!(lock = %self.lock_path.display(), "lock released"),
            Err(error) => warn!(
                lock = %self.lock_path.display(),
                %error,
                "failed to remove lock file"
            ),
        }
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}
