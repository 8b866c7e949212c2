//! Per-document save status for UI indication.
//!
//! Reads are synchronous and lock-free relative to the save path: the state
//! visible here reflects the latest transition at the moment the triggering
//! event was processed, so an indicator never renders a stale tick.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sketchflow_types::DocumentId;
use tracing::trace;

use crate::events::{FlowBus, SaveFlow};

/// Save status of a tracked document.
///
/// Transitions: `Clean → Dirty` on any recorded change; `Dirty → Saving` when
/// a save goes in flight; `Saving → Clean` on success with no interleaved
/// edit, `Saving → Dirty` when a newer snapshot was buffered mid-flight,
/// `Saving → SaveFailed` on error. A new edit moves `SaveFailed → Dirty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SaveState {
    #[default]
    Clean,
    Dirty,
    Saving,
    SaveFailed,
}

impl SaveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveState::Clean => "clean",
            SaveState::Dirty => "dirty",
            SaveState::Saving => "saving",
            SaveState::SaveFailed => "save_failed",
        }
    }

    /// Whether unsaved changes exist in this state.
    pub fn has_unsaved_changes(&self) -> bool {
        !matches!(self, SaveState::Clean)
    }
}

/// Tracks [`SaveState`] per document and broadcasts transitions.
#[derive(Debug)]
pub struct DirtyStateTracker {
    states: DashMap<DocumentId, SaveState>,
    bus: FlowBus<SaveFlow>,
}

impl DirtyStateTracker {
    /// Create a tracker that announces transitions on `bus`.
    pub fn new(bus: FlowBus<SaveFlow>) -> Self {
        Self {
            states: DashMap::new(),
            bus,
        }
    }

    /// Start tracking a document as `Clean`.
    pub fn track(&self, id: DocumentId) {
        self.states.insert(id, SaveState::Clean);
    }

    /// Stop tracking a document.
    pub fn untrack(&self, id: &DocumentId) {
        self.states.remove(id);
    }

    /// Current state; untracked documents read as `Clean`.
    pub fn state(&self, id: &DocumentId) -> SaveState {
        self.states.get(id).map(|s| *s).unwrap_or_default()
    }

    pub fn is_dirty(&self, id: &DocumentId) -> bool {
        self.state(id).has_unsaved_changes()
    }

    /// Apply a transition, publishing `DirtyChanged` if the state moved.
    pub fn set(&self, id: DocumentId, state: SaveState) {
        let changed = match self.states.get_mut(&id) {
            Some(mut current) => {
                if *current == state {
                    false
                } else {
                    trace!(
                        document = %id.short(),
                        from = current.as_str(),
                        to = state.as_str(),
                        "save state transition"
                    );
                    *current = state;
                    true
                }
            }
            // Untracked documents carry no indicator.
            None => false,
        };

        if changed {
            self.bus.publish(SaveFlow::DirtyChanged {
                document_id: id,
                state,
            });
        }
    }

    /// IDs of documents whose state is not `Clean`.
    pub fn unsaved_ids(&self) -> Vec<DocumentId> {
        self.states
            .iter()
            .filter(|entry| entry.value().has_unsaved_changes())
            .map(|entry| *entry.key())
            .collect()
    }
}
