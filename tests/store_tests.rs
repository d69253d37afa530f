//! Store facade tests
//!
//! Versioning scenarios, validators, adapters and cloning, run against
//! the in-memory backend (and the disk backend where the behavior is
//! backend-specific).

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use atomstore::{Adapter, Fs, LockOptions, MemFs, Result, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Doc {
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    rev: Option<u64>,
    value: i64,
}

impl Doc {
    fn new(value: i64) -> Self {
        Self { rev: None, value }
    }

    fn at(rev: u64, value: i64) -> Self {
        Self {
            rev: Some(rev),
            value,
        }
    }
}

fn mem_store(file: &str) -> (Store<Doc>, MemFs) {
    let fs = MemFs::new();
    fs.mkdir_all(std::path::Path::new("/data")).unwrap();
    let store = Store::builder(file)
        .fs(Arc::new(fs.clone()))
        .optimistic_locking(true)
        .build();
    (store, fs)
}

// =============================================================================
// Builder / Accessors
// =============================================================================

#[test]
fn builder_defaults() {
    let store: Store<Doc> = Store::builder("/data/doc.json").build();
    assert_eq!(store.file(), std::path::Path::new("/data/doc.json"));
    assert!(!store.optimistic_locking());
    assert!(store.adapter().is_none());
    assert_eq!(store.validator_count(), 0);
}

#[test]
fn builder_resolves_relative_paths() {
    let store: Store<Doc> = Store::builder("relative/doc.json").build();
    assert!(store.file().is_absolute());
}

// =============================================================================
// Read / Write / Remove
// =============================================================================

#[test]
fn fresh_path_is_not_readable() {
    let (store, _) = mem_store("/data/fresh.json");
    assert!(!store.readable().unwrap());
    assert!(store.read().unwrap().is_none());

    let err = store.read_existing().unwrap_err();
    assert!(matches!(err, StoreError::Missing { .. }));
    assert!(err.to_string().contains("/data/fresh.json"));
}

#[test]
fn unversioned_round_trip() {
    let fs = MemFs::new();
    fs.mkdir_all(std::path::Path::new("/data")).unwrap();
    let store: Store<Doc> = Store::builder("/data/plain.json")
        .fs(Arc::new(fs))
        .build();

    let doc = Doc::new(7);
    let written = store.write(&doc).unwrap();
    assert_eq!(written, doc);
    assert_eq!(store.read().unwrap(), Some(doc));
    assert!(store.readable().unwrap());

    store.remove().unwrap();
    assert!(!store.readable().unwrap());
}

#[test]
fn remove_missing_file_fails() {
    let (store, _) = mem_store("/data/nothing.json");
    let err = store.remove().unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn parent_directories_are_created_recursively() {
    let fs = MemFs::new();
    let store: Store<Doc> = Store::builder("/deep/a/b/c/doc.json")
        .fs(Arc::new(fs.clone()))
        .build();

    store.write(&Doc::new(1)).unwrap();
    assert_eq!(store.read_existing().unwrap(), Doc::new(1));
    assert!(fs.paths().contains(&"/deep/a/b/c".into()));
}

// =============================================================================
// Versioning Scenarios
// =============================================================================

#[test]
fn scenario_a_fresh_versioned_write_gets_revision_zero() {
    let (store, _) = mem_store("/data/a.json");
    let stored = store.write(&Doc::new(1)).unwrap();
    assert_eq!(stored, Doc::at(0, 1));
}

#[test]
fn scenario_b_matching_revision_increments() {
    let (store, _) = mem_store("/data/b.json");
    store.write(&Doc::new(1)).unwrap();
    let stored = store.write(&Doc::at(0, 2)).unwrap();
    assert_eq!(stored, Doc::at(1, 2));
}

#[test]
fn scenario_c_stale_revision_conflicts_and_leaves_file_untouched() {
    let (store, _) = mem_store("/data/c.json");
    store.write(&Doc::new(1)).unwrap();
    let committed = store.write(&Doc::at(0, 2)).unwrap();
    assert_eq!(committed.rev, Some(1));

    let err = store.write(&Doc::at(5, 3)).unwrap_err();
    assert!(matches!(err, StoreError::RevisionConflict { .. }));
    let message = err.to_string();
    assert!(message.contains("(5)"), "message: {message}");
    assert!(message.contains("(1)"), "message: {message}");

    // The stored document is unaffected by the rejected write.
    assert_eq!(store.read_existing().unwrap(), Doc::at(1, 2));
}

#[test]
fn scenario_d_non_object_payload_rejected_before_any_io() {
    let fs = MemFs::new();
    let store: Store<i64> = Store::builder("/numbers/value.json")
        .fs(Arc::new(fs.clone()))
        .optimistic_locking(true)
        .build();

    let err = store.write(&42).unwrap_err();
    assert!(matches!(err, StoreError::TypeMismatch { actual: "number" }));
    assert!(err.to_string().contains("number"));

    // No directory or file was created.
    assert_eq!(fs.paths(), vec![std::path::PathBuf::from("/")]);
}

#[test]
fn array_payload_rejected_under_versioning() {
    let fs = MemFs::new();
    let store: Store<Vec<i64>> = Store::builder("/data/list.json")
        .fs(Arc::new(fs))
        .optimistic_locking(true)
        .build();
    let err = store.write(&vec![1, 2, 3]).unwrap_err();
    assert!(matches!(err, StoreError::TypeMismatch { actual: "array" }));
}

#[test]
fn fresh_file_keeps_claimed_revision() {
    let (store, _) = mem_store("/data/claimed.json");
    let stored = store.write(&Doc::at(123, 1)).unwrap();
    assert_eq!(stored, Doc::at(123, 1));

    let next = store.write(&stored).unwrap();
    assert_eq!(next, Doc::at(124, 1));
}

#[test]
fn revision_on_never_versioned_file_is_rejected() {
    let fs = MemFs::new();
    fs.mkdir_all(std::path::Path::new("/data")).unwrap();
    let plain: Store<Doc> = Store::builder("/data/unversioned.json")
        .fs(Arc::new(fs.clone()))
        .build();
    plain.write(&Doc::new(1)).unwrap();

    let versioned = plain.to_builder().optimistic_locking(true).build();
    let err = versioned.write(&Doc::at(3, 2)).unwrap_err();
    assert!(matches!(err, StoreError::UnversionedTarget { payload: 3, .. }));
}

#[test]
fn disabling_locking_allows_arbitrary_revisions() {
    let (store, _) = mem_store("/data/unlocked.json");
    store.write(&Doc::new(1)).unwrap();

    let unlocked = store.to_builder().optimistic_locking(false).build();
    let stored = unlocked.write(&Doc::at(41, 9)).unwrap();
    assert_eq!(stored, Doc::at(41, 9));
    assert_eq!(store.read_existing().unwrap(), Doc::at(41, 9));
}

#[test]
fn no_lost_updates_under_concurrent_writers() {
    let (store, _) = mem_store("/data/contended.json");
    let store = Arc::new(
        store
            .to_builder()
            .lock_options(
                LockOptions::default().poll_interval(std::time::Duration::from_millis(5)),
            )
            .build(),
    );
    store.write(&Doc::new(0)).unwrap();

    let threads = 8;
    std::thread::scope(|scope| {
        for _ in 0..threads {
            let store = Arc::clone(&store);
            scope.spawn(move || loop {
                let current = store.read_existing().unwrap();
                let next = Doc {
                    rev: current.rev,
                    value: current.value + 1,
                };
                match store.write(&next) {
                    Ok(_) => break,
                    Err(StoreError::RevisionConflict { .. }) => continue,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            });
        }
    });

    let end = store.read_existing().unwrap();
    assert_eq!(end.rev, Some(threads as u64));
    assert_eq!(end.value, threads as i64);
}

// =============================================================================
// Validators
// =============================================================================

fn reject_negative(doc: &Doc) -> Option<String> {
    if doc.value < 0 {
        Some(format!("negative value: {}", doc.value))
    } else {
        None
    }
}

#[test]
fn writing_validation_blocks_persistence() {
    let (store, _) = mem_store("/data/validated.json");
    let store = store
        .to_builder()
        .validator(Arc::new(reject_negative))
        .build();

    let err = store.write(&Doc::new(-1)).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(
        err.to_string(),
        "Writing validation: negative value: -1"
    );
    assert!(!store.readable().unwrap());

    store.write(&Doc::new(1)).unwrap();
}

#[test]
fn reading_validation_runs_after_deserialization() {
    let (store, _) = mem_store("/data/read-validated.json");
    store.write(&Doc::new(-5)).unwrap();

    let strict = store
        .to_builder()
        .validator(Arc::new(reject_negative))
        .build();
    let err = strict.read().unwrap_err();
    assert_eq!(err.to_string(), "Reading validation: negative value: -5");
}

#[test]
fn validators_run_in_order_first_rejection_wins() {
    let calls: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let calls = Arc::clone(&calls);
        move |_: &Doc| {
            calls.lock().unwrap().push("first");
            Some("first says no".to_string())
        }
    };
    let second = {
        let calls = Arc::clone(&calls);
        move |_: &Doc| {
            calls.lock().unwrap().push("second");
            None
        }
    };

    let (store, _) = mem_store("/data/ordered.json");
    let store = store
        .to_builder()
        .validator(Arc::new(first))
        .validator(Arc::new(second))
        .build();

    let err = store.validate(&Doc::new(1)).unwrap_err();
    assert_eq!(err.to_string(), "first says no");
    assert_eq!(*calls.lock().unwrap(), vec!["first"]);
}

// =============================================================================
// Adapter
// =============================================================================

/// Flips every byte; enough to make the raw file unparseable as JSON.
struct XorAdapter;

impl Adapter for XorAdapter {
    fn encode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        Ok(data.iter().map(|b| b ^ 0xff).collect())
    }

    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        Ok(data.iter().map(|b| b ^ 0xff).collect())
    }
}

#[test]
fn adapter_encodes_persisted_bytes() {
    let (store, fs) = mem_store("/data/adapted.json");
    let store = store
        .to_builder()
        .adapter(Some(Arc::new(XorAdapter)))
        .build();

    store.write(&Doc::new(3)).unwrap();

    let raw = fs
        .read_file(std::path::Path::new("/data/adapted.json"))
        .unwrap();
    assert!(serde_json::from_slice::<serde_json::Value>(&raw).is_err());
    assert_eq!(store.read_existing().unwrap(), Doc::at(0, 3));

    // Without the adapter the stored bytes are opaque.
    let plain = store.to_builder().adapter(None).build();
    assert!(matches!(
        plain.read().unwrap_err(),
        StoreError::Serialization(_)
    ));
}

#[test]
fn write_with_read_adapter_re_encodes_a_file() {
    let (store, _) = mem_store("/data/recode.json");
    let adapter: Arc<dyn Adapter> = Arc::new(XorAdapter);
    let adapted = store
        .to_builder()
        .adapter(Some(Arc::clone(&adapter)))
        .build();
    let stored = adapted.write(&Doc::new(1)).unwrap();

    // Re-encode as plain JSON: decode the stored revision with the old
    // adapter, persist without one.
    let plain = adapted.to_builder().adapter(None).build();
    let recoded = plain.write_with(&stored, Some(&adapter)).unwrap();
    assert_eq!(recoded, Doc::at(1, 1));
    assert_eq!(plain.read_existing().unwrap(), Doc::at(1, 1));
}

// =============================================================================
// Clone / Reconfigure
// =============================================================================

#[test]
fn to_builder_retains_the_file_path() {
    let (store, _) = mem_store("/data/cloned.json");
    let clone = store.to_builder().optimistic_locking(false).build();
    assert_eq!(clone.file(), store.file());
    assert!(!clone.optimistic_locking());
    assert!(store.optimistic_locking());
}

#[test]
fn clones_share_no_document_state() {
    let (store, _) = mem_store("/data/independent.json");
    let clone = store.clone();
    store.write(&Doc::new(1)).unwrap();
    assert_eq!(clone.read_existing().unwrap(), Doc::at(0, 1));
}

// =============================================================================
// Disk Backend
// =============================================================================

#[test]
fn disk_round_trip_with_versioning() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nested").join("doc.json");
    let store: Store<Doc> = Store::builder(&file).optimistic_locking(true).build();

    let stored = store.write(&Doc::new(10)).unwrap();
    assert_eq!(stored, Doc::at(0, 10));
    let stored = store.write(&stored).unwrap();
    assert_eq!(stored, Doc::at(1, 10));

    // No temp or lock artifacts remain beside the target.
    let siblings: Vec<_> = std::fs::read_dir(file.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(siblings, vec![std::ffi::OsString::from("doc.json")]);

    store.remove().unwrap();
    assert!(!store.readable().unwrap());
}
