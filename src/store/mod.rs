//! Document Store facade
//!
//! Composes the atomic writer, revision controller and cross-process
//! lock with the external collaborators (serialization, adapter,
//! validators) into read/write/remove operations on one logical
//! document file.
//!
//! ## Write Path
//!
//! 1. Type guard (versioned writes require a JSON object) — before any I/O
//! 2. Validators, in order, first rejection wins
//! 3. Parent directory ensured (recursive, tolerating concurrent creation)
//! 4. Under optimistic locking: advisory lock → resolve next revision →
//!    atomic write → re-read; otherwise atomic write → re-read
//!
//! The returned document is always the re-read committed state, so the
//! caller observes exactly what is now persisted, including the
//! assigned revision.

pub mod lock;
pub mod revision;

use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::atomic::write_file_atomic;
use crate::config::{AtomicWriteOptions, LockOptions};
use crate::error::{Result, StoreError};
use crate::fs::{absolutize, DiskFs, Fs};

use self::lock::FileLock;
use self::revision::{json_type_name, resolve_next_revision, revision_of, REVISION_FIELD};

/// Byte-level content adapter applied around the raw persisted payload
/// (compression, encryption, ...), outside the atomic-write boundary.
pub trait Adapter: Send + Sync {
    fn encode(&self, data: Vec<u8>) -> Result<Vec<u8>>;
    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>>;
}

/// Field-level validator; a `Some(reason)` rejects the document.
pub trait Validator<E>: Send + Sync {
    fn validate(&self, data: &E) -> Option<String>;
}

impl<E, F> Validator<E> for F
where
    F: Fn(&E) -> Option<String> + Send + Sync,
{
    fn validate(&self, data: &E) -> Option<String> {
        self(data)
    }
}

/// A single-file document store
///
/// Immutable once built; clones share the filesystem backend, adapter
/// and validators but no mutable state. Reconfigure via
/// [`Store::to_builder`].
pub struct Store<E> {
    file: PathBuf,
    fs: Arc<dyn Fs>,
    adapter: Option<Arc<dyn Adapter>>,
    validators: Vec<Arc<dyn Validator<E>>>,
    optimistic_locking: bool,
    atomic_options: AtomicWriteOptions,
    lock_options: LockOptions,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Store<E> {
    fn clone(&self) -> Self {
        Self {
            file: self.file.clone(),
            fs: Arc::clone(&self.fs),
            adapter: self.adapter.clone(),
            validators: self.validators.clone(),
            optimistic_locking: self.optimistic_locking,
            atomic_options: self.atomic_options.clone(),
            lock_options: self.lock_options.clone(),
            _entity: PhantomData,
        }
    }
}

/// Builder for [`Store`]
///
/// Born with a file path, so every configuration it can produce has one.
pub struct StoreBuilder<E> {
    store: Store<E>,
}

impl<E> StoreBuilder<E> {
    /// Start a configuration for the given target file. The path is
    /// resolved to an absolute form immediately.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            store: Store {
                file: absolutize(&file.into()),
                fs: Arc::new(DiskFs::new()),
                adapter: None,
                validators: Vec::new(),
                optimistic_locking: false,
                atomic_options: AtomicWriteOptions::default(),
                lock_options: LockOptions::default(),
                _entity: PhantomData,
            },
        }
    }

    /// Retarget the configuration at another file.
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.store.file = absolutize(&file.into());
        self
    }

    /// Swap the filesystem backend.
    pub fn fs(mut self, fs: Arc<dyn Fs>) -> Self {
        self.store.fs = fs;
        self
    }

    /// Set (or clear) the content adapter.
    pub fn adapter(mut self, adapter: Option<Arc<dyn Adapter>>) -> Self {
        self.store.adapter = adapter;
        self
    }

    /// Append a validator; validators run in registration order.
    pub fn validator(mut self, validator: Arc<dyn Validator<E>>) -> Self {
        self.store.validators.push(validator);
        self
    }

    /// Replace the validator list.
    pub fn validators(mut self, validators: Vec<Arc<dyn Validator<E>>>) -> Self {
        self.store.validators = validators;
        self
    }

    /// Enable or disable revision-based conflict detection.
    pub fn optimistic_locking(mut self, enabled: bool) -> Self {
        self.store.optimistic_locking = enabled;
        self
    }

    /// Override atomic-write options (fsync, chmod/chown preservation,
    /// retry policy).
    pub fn atomic_options(mut self, options: AtomicWriteOptions) -> Self {
        self.store.atomic_options = options;
        self
    }

    /// Override cross-process lock options.
    pub fn lock_options(mut self, options: LockOptions) -> Self {
        self.store.lock_options = options;
        self
    }

    pub fn build(self) -> Store<E> {
        self.store
    }
}

impl<E> Store<E> {
    /// Start building a store for the given target file.
    pub fn builder(file: impl Into<PathBuf>) -> StoreBuilder<E> {
        StoreBuilder::new(file)
    }

    /// Reconfigure: a builder seeded with this store's options. The file
    /// path carries over, so the produced store always has one.
    pub fn to_builder(&self) -> StoreBuilder<E> {
        StoreBuilder {
            store: self.clone(),
        }
    }

    /// The absolute target file path.
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn fs(&self) -> &Arc<dyn Fs> {
        &self.fs
    }

    pub fn adapter(&self) -> Option<&Arc<dyn Adapter>> {
        self.adapter.as_ref()
    }

    pub fn optimistic_locking(&self) -> bool {
        self.optimistic_locking
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }
}

impl<E: Serialize + DeserializeOwned> Store<E> {
    /// True iff the file can be opened for reading; a missing file is
    /// `false`, any other failure propagates.
    pub fn readable(&self) -> Result<bool> {
        match self.fs.open_read(&self.file) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the stored document, or `None` when the file is absent.
    pub fn read(&self) -> Result<Option<E>> {
        self.read_with(None)
    }

    /// Like [`read`](Self::read) with a per-call adapter override.
    pub fn read_with(&self, adapter: Option<&Arc<dyn Adapter>>) -> Result<Option<E>> {
        let bytes = match self.read_raw(adapter)? {
            None => return Ok(None),
            Some(bytes) => bytes,
        };
        let data: E = serde_json::from_slice(&bytes)?;
        self.run_validators(&data, "Reading validation: ")?;
        Ok(Some(data))
    }

    /// Read the stored document, failing when the file is absent.
    pub fn read_existing(&self) -> Result<E> {
        self.read_existing_with(None)
    }

    /// Like [`read_existing`](Self::read_existing) with a per-call
    /// adapter override.
    pub fn read_existing_with(&self, adapter: Option<&Arc<dyn Adapter>>) -> Result<E> {
        self.read_with(adapter)?.ok_or_else(|| StoreError::Missing {
            file: self.file.display().to_string(),
        })
    }

    /// Persist `data` and return the committed document as re-read from
    /// the file (including the assigned revision, under optimistic
    /// locking). The caller's value is never mutated.
    pub fn write(&self, data: &E) -> Result<E> {
        self.write_with(data, None)
    }

    /// Like [`write`](Self::write), decoding the currently stored
    /// document with `read_adapter` while resolving the next revision.
    /// Used when re-encoding a file that was written with a different
    /// adapter.
    pub fn write_with(&self, data: &E, read_adapter: Option<&Arc<dyn Adapter>>) -> Result<E> {
        let value = serde_json::to_value(data)?;

        if self.optimistic_locking && !value.is_object() {
            return Err(StoreError::TypeMismatch {
                actual: json_type_name(&value),
            });
        }

        self.run_validators(data, "Writing validation: ")?;
        self.ensure_parent_dir()?;

        if !self.optimistic_locking {
            self.persist(&value)?;
            return self.read_existing();
        }

        // The lock brackets resolve + write: two processes cannot both
        // observe the same stored revision and commit.
        let _lock = FileLock::acquire(Arc::clone(&self.fs), &self.file, &self.lock_options)?;
        let stored = self.read_stored_value(read_adapter)?;
        let next = resolve_next_revision(
            &self.file.display().to_string(),
            stored.as_ref(),
            revision_of(&value),
        )?;

        let mut versioned = value;
        if let Some(object) = versioned.as_object_mut() {
            object.insert(REVISION_FIELD.to_string(), next.into());
        }
        debug!(file = %self.file.display(), revision = next, "committing versioned write");
        self.persist(&versioned)?;
        self.read_existing()
    }

    /// Run all validators in order, stopping at the first rejection.
    pub fn validate(&self, data: &E) -> Result<()> {
        self.run_validators(data, "")
    }

    /// Unlink the file. A missing file is an error, not a no-op.
    pub fn remove(&self) -> Result<()> {
        self.fs.unlink(&self.file)?;
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn run_validators(&self, data: &E, prefix: &str) -> Result<()> {
        for validator in &self.validators {
            if let Some(reason) = validator.validate(data) {
                return Err(StoreError::Validation(format!("{prefix}{reason}")));
            }
        }
        Ok(())
    }

    /// Adapter-decoded raw file contents, `None` when absent.
    fn read_raw(&self, adapter: Option<&Arc<dyn Adapter>>) -> Result<Option<Vec<u8>>> {
        if !self.readable()? {
            return Ok(None);
        }
        let bytes = self.fs.read_file(&self.file)?;
        match adapter.or(self.adapter.as_ref()) {
            Some(adapter) => Ok(Some(adapter.decode(bytes)?)),
            None => Ok(Some(bytes)),
        }
    }

    /// The stored document as raw JSON; the revision controller only
    /// needs its `_rev` field, so typed validators are not involved.
    fn read_stored_value(&self, adapter: Option<&Arc<dyn Adapter>>) -> Result<Option<Value>> {
        match self.read_raw(adapter)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        }
    }

    fn persist(&self, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let bytes = match &self.adapter {
            Some(adapter) => adapter.encode(bytes)?,
            None => bytes,
        };
        write_file_atomic(&self.fs, &self.file, &bytes, &self.atomic_options)
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        let dir = match self.file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => return Ok(()),
        };
        match self.fs.stat(dir) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.mkdir_recursive(dir),
            Err(e) => Err(e.into()),
        }
    }

    /// Create `dir` and any missing ancestors, top-down, tolerating
    /// directories concurrently created by another process.
    fn mkdir_recursive(&self, dir: &Path) -> Result<()> {
        let mut missing: Vec<PathBuf> = Vec::new();
        let mut current = Some(dir);

        while let Some(path) = current {
            if path.as_os_str().is_empty() {
                break;
            }
            match self.fs.stat(path) {
                Ok(meta) if meta.is_dir => break,
                Ok(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("not a directory: {}", path.display()),
                    )
                    .into())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    missing.push(path.to_path_buf());
                }
                Err(e) => return Err(e.into()),
            }
            current = path.parent();
        }

        for path in missing.iter().rev() {
            match self.fs.mkdir(path) {
                Ok(()) => {}
                // Another process may have created it meanwhile.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
