//! Trailing-edge debounce timers for save scheduling.
//!
//! Every recorded change (re)arms a countdown; the save fires only once a
//! quiet period elapses. Timers are keyed by `(document, change class)` so a
//! title edit and a content edit debounce independently without cancelling
//! each other.
//!
//! The scheduler owns its timers outright and signals expiry over a channel —
//! no UI-framework lifecycle is involved, and every transition (`arm`,
//! `cancel`, expiry) is reachable from a plain function call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sketchflow_types::DocumentId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Which debounce delay applies to a change.
///
/// Metadata edits (titles) persist on a short delay; full content snapshots
/// ride a longer one. Callers choose per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeClass {
    Metadata,
    Content,
}

impl ChangeClass {
    pub const ALL: [ChangeClass; 2] = [ChangeClass::Metadata, ChangeClass::Content];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeClass::Metadata => "metadata",
            ChangeClass::Content => "content",
        }
    }
}

/// Emitted on the scheduler channel when a timer expires un-cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceFired {
    pub document_id: DocumentId,
    pub class: ChangeClass,
}

#[derive(Debug)]
struct TimerSlot {
    /// Identifies the arm() call that owns this slot. A timer task only
    /// fires if its generation still matches — re-arming supersedes it.
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Restartable per-document countdown timers.
#[derive(Debug)]
pub struct DebounceScheduler {
    timers: Arc<DashMap<(DocumentId, ChangeClass), TimerSlot>>,
    tx: mpsc::UnboundedSender<DebounceFired>,
    generations: AtomicU64,
}

impl DebounceScheduler {
    /// Create a scheduler that reports expiries on `tx`.
    pub fn new(tx: mpsc::UnboundedSender<DebounceFired>) -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            tx,
            generations: AtomicU64::new(0),
        }
    }

    /// (Re)start the countdown for a document/class pair.
    ///
    /// Any previously armed timer for the same pair is superseded without
    /// firing — classic trailing-edge debounce. Must be called from within a
    /// Tokio runtime.
    pub fn arm(&self, document_id: DocumentId, class: ChangeClass, delay: Duration) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let key = (document_id, class);

        // Publish the new generation before spawning so the timer task can
        // never observe a stale slot.
        if let Some(prev) = self.timers.insert(
            key,
            TimerSlot {
                generation,
                handle: None,
            },
        ) && let Some(handle) = prev.handle
        {
            handle.abort();
        }

        let timers = Arc::clone(&self.timers);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_armed = timers
                .remove_if(&key, |_, slot| slot.generation == generation)
                .is_some();
            if still_armed {
                trace!(document = %document_id.short(), class = class.as_str(), "debounce expired");
                let _ = tx.send(DebounceFired { document_id, class });
            }
        });

        match self.timers.get_mut(&key) {
            Some(mut slot) if slot.generation == generation => {
                slot.handle = Some(handle);
            }
            // Superseded (or already fired) between insert and here.
            _ => handle.abort(),
        }
    }

    /// Clear a pending timer without firing it.
    ///
    /// Returns `true` if a timer was armed. Used when a document is discarded
    /// without saving, e.g. on a read-only toggle.
    pub fn cancel(&self, document_id: &DocumentId, class: ChangeClass) -> bool {
        match self.timers.remove(&(*document_id, class)) {
            Some((_, slot)) => {
                if let Some(handle) = slot.handle {
                    handle.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Clear all pending timers for a document, across both delay classes.
    pub fn cancel_all(&self, document_id: &DocumentId) {
        for class in ChangeClass::ALL {
            self.cancel(document_id, class);
        }
    }

    pub fn is_armed(&self, document_id: &DocumentId, class: ChangeClass) -> bool {
        self.timers.contains_key(&(*document_id, class))
    }

    /// Number of currently armed timers.
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            if let Some(handle) = entry.value().handle.as_ref() {
                handle.abort();
            }
        }
    }
}
