//! Per-path write queue
//!
//! Serializes actions targeting the same resolved absolute path,
//! first-come-first-served; actions on different paths run fully
//! concurrently. The queue map is the only process-wide mutable state
//! besides the temp-name invocation counter: entries are created lazily
//! on first enqueue and deleted as soon as the last pending action for a
//! path finishes, so idle paths retain no memory.
//!
//! Advancement is unconditional — the next action starts whether the
//! previous one succeeded, failed or panicked.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::fs::absolutize;

struct QueueState {
    /// Tickets in arrival order; the front ticket is the running action.
    tickets: VecDeque<u64>,
    condvar: Arc<Condvar>,
}

static QUEUES: OnceLock<Mutex<HashMap<PathBuf, QueueState>>> = OnceLock::new();
static NEXT_TICKET: AtomicU64 = AtomicU64::new(0);

fn queues() -> &'static Mutex<HashMap<PathBuf, QueueState>> {
    QUEUES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Run `action` once every previously enqueued action for the same
/// resolved absolute path has completed.
pub fn with_path_queue<T>(path: &Path, action: impl FnOnce() -> T) -> T {
    let key = absolutize(path);
    let ticket = NEXT_TICKET.fetch_add(1, Ordering::SeqCst);

    let condvar = {
        let mut map = queues().lock();
        let state = map.entry(key.clone()).or_insert_with(|| QueueState {
            tickets: VecDeque::new(),
            condvar: Arc::new(Condvar::new()),
        });
        state.tickets.push_back(ticket);
        let condvar = Arc::clone(&state.condvar);
        trace!(path = %key.display(), ticket, pending = state.tickets.len(), "enqueued");

        // Wait until this ticket reaches the front of its path's queue.
        while map
            .get(&key)
            .map(|state| state.tickets.front() != Some(&ticket))
            .unwrap_or(false)
        {
            condvar.wait(&mut map);
        }
        condvar
    };

    // Advance the queue on every exit path, panics included.
    let _advance = AdvanceGuard {
        key: key.clone(),
        condvar,
    };

    action()
}

struct AdvanceGuard {
    key: PathBuf,
    condvar: Arc<Condvar>,
}

impl Drop for AdvanceGuard {
    fn drop(&mut self) {
        let mut map = queues().lock();
        if let Some(state) = map.get_mut(&self.key) {
            state.tickets.pop_front();
            if state.tickets.is_empty() {
                map.remove(&self.key);
                trace!(path = %self.key.display(), "queue drained");
            } else {
                self.condvar.notify_all();
            }
        }
    }
}

/// Number of actions pending or running for a path (for testing/debugging).
pub fn pending(path: &Path) -> usize {
    let key = absolutize(path);
    queues()
        .lock()
        .get(&key)
        .map(|state| state.tickets.len())
        .unwrap_or(0)
}
