//! Optimistic Concurrency Controller
//!
//! Revision bookkeeping for versioned documents: a monotonic,
//! non-negative counter embedded in the document's `_rev` field. A
//! writer must have observed the latest revision to proceed; staleness
//! is rejected rather than merged (strict single-writer-wins).

use serde_json::Value;

use crate::error::{Result, StoreError};

/// JSON field carrying the revision counter.
pub const REVISION_FIELD: &str = "_rev";

/// Extract a well-formed revision (non-negative integer) from a JSON
/// object; anything else counts as "unversioned".
pub fn revision_of(value: &Value) -> Option<u64> {
    value.as_object()?.get(REVISION_FIELD)?.as_u64()
}

/// Runtime JSON type name, used in pre-I/O type-guard errors.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolve the revision the next successful write must carry.
///
/// - Nothing stored: the payload's claimed revision, or `0`.
/// - Stored document unversioned but the payload claims a revision:
///   the file was never versioned, reject.
/// - Revisions absent or diverging: concurrent update, reject citing
///   both values.
/// - Revisions equal: `stored + 1`.
pub fn resolve_next_revision(
    file: &str,
    stored: Option<&Value>,
    payload_revision: Option<u64>,
) -> Result<u64> {
    let stored = match stored {
        None => return Ok(payload_revision.unwrap_or(0)),
        Some(value) => value,
    };

    let stored_revision = revision_of(stored);

    match (stored_revision, payload_revision) {
        (None, Some(payload)) => Err(StoreError::UnversionedTarget {
            file: file.to_string(),
            payload,
        }),
        (Some(stored), Some(payload)) if stored == payload => Ok(stored + 1),
        (stored, payload) => Err(StoreError::RevisionConflict {
            file: file.to_string(),
            stored: display_revision(stored),
            payload: display_revision(payload),
        }),
    }
}

fn display_revision(revision: Option<u64>) -> String {
    match revision {
        Some(value) => value.to_string(),
        None => "none".to_string(),
    }
}
