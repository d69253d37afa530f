//! Atomic File Writer
//!
//! Replaces a file's contents by writing a uniquely named sibling temp
//! file and renaming it over the target, so a reader only ever observes
//! the old complete file or the new complete file.
//!
//! ## Write Path
//!
//! ```text
//! write_file_atomic(path, bytes)
//!        │
//!        ▼
//! ┌──────────────────┐   per resolved absolute path, FIFO
//! │  per-path queue  │──────────────────────────────────┐
//! └──────────────────┘                                  │
//!        ▼                                              │
//! ┌──────────────────┐   transient errors retried       │
//! │     RetryFs      │   per the retry policy           │
//! └──────────────────┘                                  │
//!        ▼                                              ▼
//!  stat → temp name → write (+fsync) → chown/chmod → rename
//! ```
//!
//! The temp file is an acquired resource: it is unlinked on every
//! failure path, including panics, via a drop guard.

pub mod queue;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::config::AtomicWriteOptions;
use crate::error::{Result, StoreError};
use crate::fs::{Fs, RetryFs};

/// Per-process invocation counter feeding the temp-name hash.
static INVOCATION: AtomicU64 = AtomicU64::new(0);

/// Derive a sibling temp-file name extremely unlikely to collide:
/// a crc32 over the process id, a per-process invocation counter and
/// the current time, appended to the base path.
fn temp_file_name(base: &Path) -> PathBuf {
    let invocation = INVOCATION.fetch_add(1, Ordering::SeqCst);
    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&invocation.to_le_bytes());
    hasher.update(&now_nanos.to_le_bytes());

    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{:08x}", hasher.finalize()));
    PathBuf::from(name)
}

/// Unlinks the temp file unless disarmed; covers early returns and
/// panics between temp-file creation and commit.
struct TempGuard<'a> {
    fs: &'a RetryFs,
    path: &'a Path,
    armed: bool,
}

impl<'a> TempGuard<'a> {
    fn new(fs: &'a RetryFs, path: &'a Path) -> Self {
        Self {
            fs,
            path,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(error) = self.fs.unlink(self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    tmp = %self.path.display(),
                    %error,
                    "failed to clean up temp file"
                );
            }
        }
    }
}

/// Atomically replace the contents of `path` with `data`.
///
/// Serialized per resolved absolute path (writes to different paths run
/// concurrently), retried per `options.retry` for transient errors, and
/// guaranteed to leave no temp file behind on any failure path.
///
/// The parent directory must already exist; a zero-length payload is
/// valid.
pub fn write_file_atomic(
    fs: &Arc<dyn Fs>,
    path: &Path,
    data: &[u8],
    options: &AtomicWriteOptions,
) -> Result<()> {
    queue::with_path_queue(path, || {
        let fs = RetryFs::new(Arc::clone(fs), options.retry.clone());
        replace_contents(&fs, path, data, options)
    })
}

fn replace_contents(
    fs: &RetryFs,
    path: &Path,
    data: &[u8],
    options: &AtomicWriteOptions,
) -> Result<()> {
    // A missing target means a fresh file; anything else propagates.
    let existing = match fs.stat(path) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    // Write the replacement beside the real file, not beside a symlink.
    let base = if existing.is_some() {
        fs.realpath(path)?
    } else {
        path.to_path_buf()
    };
    let tmp = temp_file_name(&base);
    let mut guard = TempGuard::new(fs, &tmp);

    {
        let mut file = fs.open_write(&tmp)?;
        let written = file.write_all(data).and_then(|_| {
            if options.fsync {
                file.sync_all()
            } else {
                Ok(())
            }
        });
        // Close by drop; close failures are swallowed, but the original
        // write/fsync error still propagates.
        drop(file);
        written?;
    }

    if let Some(meta) = existing {
        if !options.disable_chown {
            fs.chown(&tmp, meta.uid, meta.gid)?;
        }
        if !options.disable_chmod {
            fs.chmod(&tmp, meta.mode)?;
        }
    }

    match fs.rename(&tmp, path) {
        Ok(()) => {
            guard.disarm();
            debug!(target = %path.display(), bytes = data.len(), "atomic write committed");
            Ok(())
        }
        Err(rename_error) => {
            // Best effort; an unlink failure must not mask the rename failure.
            let unlink_error = fs.unlink(&tmp).err();
            guard.disarm();
            Err(StoreError::AtomicCommit {
                tmp: tmp.display().to_string(),
                target: path.display().to_string(),
                source: rename_error,
                unlink_error,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_names_are_unique_and_sibling() {
        let base = Path::new("/data/doc.json");
        let a = temp_file_name(base);
        let b = temp_file_name(base);
        assert_ne!(a, b);
        assert_eq!(a.parent(), base.parent());
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("doc.json."));
    }
}
