//! The auto-save coordinator: gates every persistence call.
//!
//! Edits land in the [`ChangeBuffer`], the [`DebounceScheduler`] waits out
//! the quiet period, and this module's state machine issues the actual
//! gateway calls — strictly sequential per document, so a stale snapshot can
//! never overwrite a newer one.
//!
//! # State Machine
//!
//! ```text
//! +----------------+
//! |      Idle      | no save in flight
//! +-------+--------+
//!         | request_save() with a dirty buffer
//!         v
//! +----------------+
//! |     Saving     | one gateway call in flight
//! +-------+--------+
//!         | request_save() while in flight
//!         v
//! +------------------------+
//! | SavingWithFollowup     | queued; resolves into a follow-up save
//! +------------------------+
//! ```
//!
//! When the in-flight call resolves and a newer snapshot was buffered
//! mid-flight, the driver immediately issues a follow-up save with it — no
//! second debounce wait. Saves for different documents are fully independent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use sketchflow_types::{DocumentId, DocumentKind, ServerState, Snapshot};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::buffer::{ChangeBuffer, RecordOutcome};
use crate::cache::SnapshotCache;
use crate::config::AutoSaveConfig;
use crate::debounce::{ChangeClass, DebounceFired, DebounceScheduler};
use crate::events::{FlowBus, SaveFlow, Subscription};
use crate::gateway::{PersistenceGateway, SaveError};
use crate::tracker::{DirtyStateTracker, SaveState};

/// Per-document flush state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    /// No save in flight.
    Idle,
    /// One gateway call in flight.
    Saving,
    /// In flight, with a queued request to run again on resolution.
    SavingWithFollowup,
}

/// Result of a save request that ran to completion without a gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot recorded at `revision` was persisted.
    Saved { revision: u64, server: ServerState },
    /// Nothing to save — the document was already clean.
    AlreadyClean,
    /// The document is read-only; saving is disabled.
    ReadOnly,
    /// The document is not tracked by this coordinator.
    Untracked,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub saves_started: u64,
    pub saves_succeeded: u64,
    pub saves_failed: u64,
    pub retries: u64,
    pub tracked_documents: usize,
}

#[derive(Debug, Default)]
struct Stats {
    saves_started: AtomicU64,
    saves_succeeded: AtomicU64,
    saves_failed: AtomicU64,
    retries: AtomicU64,
}

/// Flush state machine cell for one document.
///
/// `idle` is bumped every time the phase returns to `Idle`, waking tasks
/// awaiting an in-flight save; `last_error` holds the most recent terminal
/// failure so those waiters can report it.
struct PhaseCell {
    phase: Mutex<FlushPhase>,
    idle: watch::Sender<u64>,
    last_error: Mutex<Option<SaveError>>,
}

impl PhaseCell {
    fn new() -> Arc<Self> {
        let (idle, _) = watch::channel(0);
        Arc::new(Self {
            phase: Mutex::new(FlushPhase::Idle),
            idle,
            last_error: Mutex::new(None),
        })
    }
}

/// Coordinates debounced, at-most-one-in-flight persistence for a set of
/// open documents.
///
/// Cheap to clone; all clones share state. Must be created within a Tokio
/// runtime — the coordinator spawns a dispatch task that turns debounce
/// expiries into save requests.
#[derive(Clone)]
pub struct AutoSaveCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: AutoSaveConfig,
    buffer: ChangeBuffer,
    tracker: DirtyStateTracker,
    scheduler: DebounceScheduler,
    gateway: Arc<dyn PersistenceGateway>,
    cache: Option<Arc<dyn SnapshotCache>>,
    bus: FlowBus<SaveFlow>,
    phases: DashMap<DocumentId, Arc<PhaseCell>>,
    stats: Stats,
}

impl AutoSaveCoordinator {
    /// Create a coordinator without a secondary snapshot cache.
    pub fn new(gateway: Arc<dyn PersistenceGateway>, config: AutoSaveConfig) -> Self {
        Self::build(gateway, None, config)
    }

    /// Create a coordinator that also writes unsaved snapshots to `cache`.
    pub fn with_cache(
        gateway: Arc<dyn PersistenceGateway>,
        cache: Arc<dyn SnapshotCache>,
        config: AutoSaveConfig,
    ) -> Self {
        Self::build(gateway, Some(cache), config)
    }

    fn build(
        gateway: Arc<dyn PersistenceGateway>,
        cache: Option<Arc<dyn SnapshotCache>>,
        config: AutoSaveConfig,
    ) -> Self {
        let bus = FlowBus::new(config.event_capacity);
        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceFired>();

        let inner = Arc::new(Inner {
            scheduler: DebounceScheduler::new(tx),
            tracker: DirtyStateTracker::new(bus.clone()),
            buffer: ChangeBuffer::new(),
            gateway,
            cache,
            bus,
            phases: DashMap::new(),
            stats: Stats::default(),
            config,
        });

        // Dispatch task: debounce expiry -> save request. Holds only a weak
        // reference so dropping the last coordinator clone shuts it down.
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(fired) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                tokio::spawn(async move {
                    if let Err(error) = inner.save_now(fired.document_id).await {
                        warn!(
                            document = %fired.document_id.short(),
                            class = fired.class.as_str(),
                            %error,
                            "debounced save failed"
                        );
                    }
                });
            }
        });

        Self { inner }
    }

    // =========================================================================
    // Document lifecycle
    // =========================================================================

    /// Register a document with the coordinator.
    ///
    /// `last_persisted` seeds change detection — pass the snapshot the editor
    /// was loaded with so an unedited document reads clean. Re-activating an
    /// already tracked document resets its buffer state.
    pub fn activate(&self, id: DocumentId, kind: DocumentKind, last_persisted: Option<Snapshot>) {
        self.inner.buffer.track(id, kind, last_persisted);
        self.inner.tracker.track(id);
        self.inner.phases.entry(id).or_insert_with(PhaseCell::new);
        info!(document = %id.short(), kind = kind.as_str(), "document activated");
        self.inner.bus.publish(SaveFlow::Activated {
            document_id: id,
            kind,
        });
    }

    /// Flush a document and release its state (the flush-on-switch path).
    ///
    /// On save failure the document stays tracked with its buffered snapshot
    /// intact, so the caller can warn the user and retry or [`discard`].
    ///
    /// [`discard`]: AutoSaveCoordinator::discard
    pub async fn deactivate(&self, id: DocumentId) -> Result<SaveOutcome, SaveError> {
        let outcome = self.flush_now(id).await?;
        if let Some(cache) = self.inner.cache.clone() {
            // The server copy is now authoritative; drop the local fallback.
            tokio::spawn(async move {
                if let Err(error) = cache.clear(&id).await {
                    warn!(document = %id.short(), %error, "snapshot cache clear failed");
                }
            });
        }
        self.release(id);
        Ok(outcome)
    }

    /// Release a document without saving, dropping any unsaved snapshot.
    ///
    /// The snapshot cache entry is kept as a recovery net.
    pub fn discard(&self, id: DocumentId) {
        self.release(id);
    }

    fn release(&self, id: DocumentId) {
        self.inner.scheduler.cancel_all(&id);
        let was_tracked = self.inner.buffer.untrack(&id);
        self.inner.tracker.untrack(&id);
        self.inner.phases.remove(&id);
        if was_tracked {
            info!(document = %id.short(), "document deactivated");
            self.inner.bus.publish(SaveFlow::Deactivated { document_id: id });
        }
    }

    /// Toggle read-only. Enabling it cancels pending timers and disables all
    /// mutation and save paths.
    pub fn set_read_only(&self, id: DocumentId, read_only: bool) {
        self.inner.buffer.set_read_only(&id, read_only);
        if read_only {
            self.inner.scheduler.cancel_all(&id);
        }
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Record the latest snapshot for a document and (re)arm its debounce
    /// timer for the given change class.
    pub fn record_change(
        &self,
        id: DocumentId,
        snapshot: Snapshot,
        class: ChangeClass,
    ) -> RecordOutcome {
        let outcome = self.inner.buffer.record_change(&id, snapshot.clone());
        match &outcome {
            RecordOutcome::Recorded { .. } => {
                // While a save is in flight the indicator stays `Saving`; the
                // driver resolves it to Dirty/Clean on completion.
                if self.inner.phase(&id) == FlushPhase::Idle {
                    self.inner.tracker.set(id, SaveState::Dirty);
                }
                self.inner
                    .scheduler
                    .arm(id, class, self.inner.config.delay_for(class));

                if let Some(cache) = self.inner.cache.clone() {
                    tokio::spawn(async move {
                        if let Err(error) = cache.store(id, &snapshot).await {
                            warn!(document = %id.short(), %error, "snapshot cache write failed");
                        }
                    });
                }
            }
            RecordOutcome::Unchanged => {
                // Content reverted to the persisted snapshot: a save of this
                // class would be redundant.
                self.inner.scheduler.cancel(&id, class);
                if !self.inner.buffer.is_dirty(&id) && self.inner.phase(&id) == FlushPhase::Idle {
                    self.inner.tracker.set(id, SaveState::Clean);
                }
            }
            RecordOutcome::ReadOnly | RecordOutcome::Untracked => {}
        }
        outcome
    }

    // =========================================================================
    // Flushing
    // =========================================================================

    /// Request a save of the current buffered snapshot.
    ///
    /// Called by the debounce dispatch on timer expiry; also the building
    /// block of [`flush_now`](AutoSaveCoordinator::flush_now). If a save is
    /// already in flight the request is queued as a follow-up and this call
    /// waits for the final resolution.
    pub async fn request_save(&self, id: DocumentId) -> Result<SaveOutcome, SaveError> {
        self.inner.save_now(id).await
    }

    /// Cancel pending debounce timers and save immediately.
    ///
    /// Awaitable: resolves once the flush completed (or failed), so a page
    /// navigation can block on it. Flushing a clean document is a no-op.
    pub async fn flush_now(&self, id: DocumentId) -> Result<SaveOutcome, SaveError> {
        self.inner.scheduler.cancel_all(&id);
        self.inner.save_now(id).await
    }

    /// Flush every dirty document, sequentially.
    ///
    /// Clean documents are skipped without a gateway call. Returns one entry
    /// per flushed document.
    pub async fn flush_all(&self) -> Vec<(DocumentId, Result<SaveOutcome, SaveError>)> {
        let mut results = Vec::new();
        for id in self.inner.buffer.dirty_ids() {
            let result = self.flush_now(id).await;
            results.push((id, result));
        }
        results
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Current save state; untracked documents read as `Clean`.
    pub fn state(&self, id: &DocumentId) -> SaveState {
        self.inner.tracker.state(id)
    }

    pub fn is_dirty(&self, id: &DocumentId) -> bool {
        self.inner.buffer.is_dirty(id)
    }

    pub fn is_tracked(&self, id: &DocumentId) -> bool {
        self.inner.buffer.is_tracked(id)
    }

    /// Subscribe to save lifecycle events matching a subject pattern.
    pub fn subscribe(&self, pattern: &str) -> Subscription<SaveFlow> {
        self.inner.bus.subscribe(pattern)
    }

    /// Load the cached snapshot for a document, if a cache is configured.
    ///
    /// Used to offer recovery of unsaved work after a crash. Never consulted
    /// by the dirty computation.
    pub async fn recover(&self, id: DocumentId) -> Option<Snapshot> {
        let cache = self.inner.cache.as_ref()?;
        match cache.load(&id).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(document = %id.short(), %error, "snapshot cache read failed");
                None
            }
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            saves_started: self.inner.stats.saves_started.load(Ordering::Relaxed),
            saves_succeeded: self.inner.stats.saves_succeeded.load(Ordering::Relaxed),
            saves_failed: self.inner.stats.saves_failed.load(Ordering::Relaxed),
            retries: self.inner.stats.retries.load(Ordering::Relaxed),
            tracked_documents: self.inner.buffer.len(),
        }
    }
}

impl Inner {
    fn phase_cell(&self, id: &DocumentId) -> Option<Arc<PhaseCell>> {
        self.phases.get(id).map(|cell| Arc::clone(cell.value()))
    }

    fn phase(&self, id: &DocumentId) -> FlushPhase {
        self.phase_cell(id)
            .map(|cell| *cell.phase.lock())
            .unwrap_or(FlushPhase::Idle)
    }

    /// Save the latest buffered snapshot, serializing against any in-flight
    /// save for the same document.
    async fn save_now(&self, id: DocumentId) -> Result<SaveOutcome, SaveError> {
        let Some(cell) = self.phase_cell(&id) else {
            return Ok(SaveOutcome::Untracked);
        };
        if self.buffer.is_read_only(&id) {
            return Ok(SaveOutcome::ReadOnly);
        }

        let mut idle_rx = cell.idle.subscribe();
        loop {
            let became_driver = {
                let mut phase = cell.phase.lock();
                match *phase {
                    FlushPhase::Idle => {
                        if !self.buffer.is_dirty(&id) {
                            return Ok(SaveOutcome::AlreadyClean);
                        }
                        *phase = FlushPhase::Saving;
                        true
                    }
                    FlushPhase::Saving => {
                        *phase = FlushPhase::SavingWithFollowup;
                        false
                    }
                    FlushPhase::SavingWithFollowup => false,
                }
            };

            if became_driver {
                return self.drive(&cell, id).await;
            }

            // Another task is driving this document; wait for it to go idle,
            // then report its result or take over the remaining work.
            if idle_rx.changed().await.is_err() {
                // Document released while we waited.
                return Ok(SaveOutcome::Untracked);
            }
            if !self.buffer.is_dirty(&id) {
                return Ok(SaveOutcome::AlreadyClean);
            }
            if let Some(error) = cell.last_error.lock().clone() {
                return Err(error);
            }
        }
    }

    /// Drive saves for one document until no newer snapshot remains.
    ///
    /// Only one driver exists per document at a time (the task that moved the
    /// phase from `Idle` to `Saving`), which is what makes gateway calls
    /// strictly sequential.
    async fn drive(&self, cell: &Arc<PhaseCell>, id: DocumentId) -> Result<SaveOutcome, SaveError> {
        *cell.last_error.lock() = None;
        let mut last_result = Ok(SaveOutcome::AlreadyClean);

        loop {
            let Some(pending) = self.buffer.pending(&id) else {
                *cell.phase.lock() = FlushPhase::Idle;
                break;
            };

            self.tracker.set(id, SaveState::Saving);
            self.stats.saves_started.fetch_add(1, Ordering::Relaxed);
            self.bus.publish(SaveFlow::SaveStarted {
                document_id: id,
                revision: pending.revision,
            });

            match self.save_with_retry(id, &pending.snapshot).await {
                Ok(server) => {
                    let clean =
                        self.buffer
                            .mark_persisted(&id, pending.revision, pending.snapshot.clone());
                    self.stats.saves_succeeded.fetch_add(1, Ordering::Relaxed);
                    self.bus.publish(SaveFlow::SaveSucceeded {
                        document_id: id,
                        revision: pending.revision,
                        server,
                    });
                    // A newer snapshot buffered mid-flight supersedes this
                    // one; the document stays dirty and gets a follow-up.
                    self.tracker.set(
                        id,
                        if clean { SaveState::Clean } else { SaveState::Dirty },
                    );
                    last_result = Ok(SaveOutcome::Saved {
                        revision: pending.revision,
                        server,
                    });
                }
                Err(error) => {
                    warn!(
                        document = %id.short(),
                        kind = error.kind().as_str(),
                        %error,
                        "save failed"
                    );
                    self.stats.saves_failed.fetch_add(1, Ordering::Relaxed);
                    self.tracker.set(id, SaveState::SaveFailed);
                    self.bus.publish(SaveFlow::SaveFailed {
                        document_id: id,
                        kind: error.kind(),
                        message: error.to_string(),
                    });
                    *cell.last_error.lock() = Some(error.clone());
                    last_result = Err(error);
                }
            }

            let go_again = {
                let mut phase = cell.phase.lock();
                let superseded = self.buffer.is_dirty(&id)
                    && self.buffer.revision(&id).unwrap_or(0) > pending.revision;
                if superseded {
                    // Follow-up save with the newest snapshot, immediately —
                    // no second debounce wait. A failed save with no newer
                    // snapshot stops here; the buffered content is retained
                    // for the next edit or manual flush.
                    *phase = FlushPhase::Saving;
                    true
                } else {
                    *phase = FlushPhase::Idle;
                    false
                }
            };
            if !go_again {
                break;
            }
        }

        cell.idle.send_modify(|generation| *generation += 1);
        last_result
    }

    /// One gateway call plus the bounded retry for transient errors.
    async fn save_with_retry(
        &self,
        id: DocumentId,
        payload: &Snapshot,
    ) -> Result<ServerState, SaveError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.gateway.save(id, payload).await {
                Ok(state) => return Ok(state),
                Err(error) if error.is_retryable() && attempt <= self.config.retry_limit => {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        document = %id.short(),
                        attempt,
                        %error,
                        "transient save failure, retrying"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}
