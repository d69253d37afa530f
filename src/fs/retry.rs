//! Transient-error retry decorator
//!
//! Wraps another [`Fs`] so that designated transient error kinds on
//! designated platforms are retried with backoff before giving up.
//! Errors matching no rule, or occurring on non-applicable platforms,
//! propagate immediately; once elapsed time exceeds the rule's timeout
//! the original error is surfaced unchanged.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::config::RetryPolicy;

use super::{FileMeta, Fs, FsFile};

/// Retry-wrapping filesystem decorator
pub struct RetryFs {
    inner: Arc<dyn Fs>,
    policy: RetryPolicy,
}

impl RetryFs {
    pub fn new(inner: Arc<dyn Fs>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn with_retry<T>(&self, op: &'static str, mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
        let started = Instant::now();
        loop {
            let error = match f() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            match self.policy.matching(&error) {
                Some(rule) if started.elapsed() < rule.retry_timeout => {
                    debug!(
                        op,
                        kind = ?error.kind(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "transient filesystem error, retrying"
                    );
                    std::thread::sleep(rule.retry_interval);
                }
                _ => return Err(error),
            }
        }
    }
}

impl Fs for RetryFs {
    fn stat(&self, path: &Path) -> io::Result<FileMeta> {
        self.with_retry("stat", || self.inner.stat(path))
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        self.with_retry("open_read", || self.inner.open_read(path))
    }

    fn open_write(&self, path: &Path) -> io::Result<Box<dyn FsFile>> {
        self.with_retry("open_write", || self.inner.open_write(path))
    }

    fn create_new(&self, path: &Path) -> io::Result<()> {
        self.with_retry("create_new", || self.inner.create_new(path))
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.with_retry("read_file", || self.inner.read_file(path))
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.with_retry("write_file", || self.inner.write_file(path, data))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.with_retry("rename", || self.inner.rename(from, to))
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        self.with_retry("unlink", || self.inner.unlink(path))
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.with_retry("chmod", || self.inner.chmod(path, mode))
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        self.with_retry("chown", || self.inner.chown(path, uid, gid))
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        self.with_retry("realpath", || self.inner.realpath(path))
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.with_retry("mkdir", || self.inner.mkdir(path))
    }
}
