//! Latest-wins change buffering for open documents.
//!
//! Rapid successive edits to the same document collapse into one pending
//! snapshot; intermediate states are never persisted or recoverable once
//! superseded. The buffer also remembers the last snapshot confirmed saved,
//! which is what dirtiness is computed against.

use dashmap::DashMap;
use sketchflow_types::{DocumentId, DocumentKind, Snapshot};

/// Outcome of recording a change into the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The snapshot was buffered; the document is now dirty at `revision`.
    Recorded { revision: u64 },
    /// The snapshot equals the last persisted one — nothing to save.
    Unchanged,
    /// The document is read-only; mutation paths are disabled.
    ReadOnly,
    /// The document is not tracked by this buffer.
    Untracked,
}

/// A buffered snapshot paired with the revision counter it was recorded at.
///
/// The revision lets the flush coordinator detect edits that arrive while a
/// save is in flight: if the buffer's revision has advanced past the one
/// captured at save time, the saved snapshot was superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub snapshot: Snapshot,
    pub revision: u64,
}

/// Per-document buffer state.
#[derive(Debug)]
struct DocBuffer {
    kind: DocumentKind,
    /// Latest recorded snapshot, if it differs from `last_persisted`.
    pending: Option<Snapshot>,
    /// Last snapshot confirmed saved by the gateway.
    last_persisted: Option<Snapshot>,
    /// Bumped on every recorded change.
    revision: u64,
    /// Revision of `last_persisted`.
    persisted_revision: u64,
    read_only: bool,
}

impl DocBuffer {
    fn new(kind: DocumentKind, last_persisted: Option<Snapshot>) -> Self {
        Self {
            kind,
            pending: None,
            last_persisted,
            revision: 0,
            persisted_revision: 0,
            read_only: false,
        }
    }

    fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }
}

/// Holds the most recent snapshot per open document.
///
/// All operations are synchronous and short; entries are owned exclusively by
/// the coordinator that tracks the document.
#[derive(Debug, Default)]
pub struct ChangeBuffer {
    docs: DashMap<DocumentId, DocBuffer>,
}

impl ChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a document.
    ///
    /// `last_persisted` seeds change detection — typically the snapshot the
    /// document was loaded with. Re-tracking an already tracked document
    /// resets its buffer state.
    pub fn track(&self, id: DocumentId, kind: DocumentKind, last_persisted: Option<Snapshot>) {
        self.docs.insert(id, DocBuffer::new(kind, last_persisted));
    }

    /// Stop tracking a document, dropping any unsaved snapshot.
    pub fn untrack(&self, id: &DocumentId) -> bool {
        self.docs.remove(id).is_some()
    }

    pub fn is_tracked(&self, id: &DocumentId) -> bool {
        self.docs.contains_key(id)
    }

    /// Number of tracked documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// All tracked document IDs.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.docs.iter().map(|entry| *entry.key()).collect()
    }

    /// Record the latest snapshot for a document, overwriting any previous
    /// pending snapshot (latest-wins).
    ///
    /// A snapshot equal to the last persisted one clears the pending state:
    /// the document reverted to its saved content and there is nothing left
    /// to write.
    pub fn record_change(&self, id: &DocumentId, snapshot: Snapshot) -> RecordOutcome {
        let Some(mut doc) = self.docs.get_mut(id) else {
            return RecordOutcome::Untracked;
        };
        if doc.read_only {
            return RecordOutcome::ReadOnly;
        }
        if doc.last_persisted.as_ref() == Some(&snapshot) {
            doc.pending = None;
            doc.revision = doc.persisted_revision;
            return RecordOutcome::Unchanged;
        }
        doc.pending = Some(snapshot);
        doc.revision += 1;
        RecordOutcome::Recorded { revision: doc.revision }
    }

    /// The pending snapshot for a document, if it is dirty.
    pub fn pending(&self, id: &DocumentId) -> Option<PendingSnapshot> {
        let doc = self.docs.get(id)?;
        doc.pending.as_ref().map(|snapshot| PendingSnapshot {
            snapshot: snapshot.clone(),
            revision: doc.revision,
        })
    }

    /// Confirm that the snapshot recorded at `revision` was persisted.
    ///
    /// `last_persisted` advances only if no newer snapshot has been buffered
    /// since — otherwise the newer one supersedes and the document stays
    /// dirty. Returns `true` if the document is clean afterwards.
    pub fn mark_persisted(&self, id: &DocumentId, revision: u64, snapshot: Snapshot) -> bool {
        let Some(mut doc) = self.docs.get_mut(id) else {
            return false;
        };
        if doc.revision != revision {
            // Superseded mid-flight; the pending snapshot is newer.
            return false;
        }
        doc.last_persisted = Some(snapshot);
        doc.persisted_revision = revision;
        doc.pending = None;
        true
    }

    pub fn is_dirty(&self, id: &DocumentId) -> bool {
        self.docs.get(id).map(|doc| doc.is_dirty()).unwrap_or(false)
    }

    /// Current revision counter for a document.
    pub fn revision(&self, id: &DocumentId) -> Option<u64> {
        self.docs.get(id).map(|doc| doc.revision)
    }

    /// Last snapshot confirmed persisted.
    pub fn last_persisted(&self, id: &DocumentId) -> Option<Snapshot> {
        self.docs.get(id).and_then(|doc| doc.last_persisted.clone())
    }

    pub fn kind(&self, id: &DocumentId) -> Option<DocumentKind> {
        self.docs.get(id).map(|doc| doc.kind)
    }

    pub fn set_read_only(&self, id: &DocumentId, read_only: bool) -> bool {
        match self.docs.get_mut(id) {
            Some(mut doc) => {
                doc.read_only = read_only;
                true
            }
            None => false,
        }
    }

    pub fn is_read_only(&self, id: &DocumentId) -> bool {
        self.docs.get(id).map(|doc| doc.read_only).unwrap_or(false)
    }

    /// IDs of all dirty documents (used by flush-all).
    pub fn dirty_ids(&self) -> Vec<DocumentId> {
        self.docs
            .iter()
            .filter(|entry| entry.value().is_dirty())
            .map(|entry| *entry.key())
            .collect()
    }
}
