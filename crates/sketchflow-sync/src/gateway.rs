//! The persistence boundary: where snapshots leave the coordinator.
//!
//! The coordinator only requires the [`PersistenceGateway`] contract — the
//! real implementation lives with whatever serves the save endpoint (see
//! `sketchflow-store` for the SQLite-backed one). [`MemoryGateway`] is the
//! in-process implementation used by tests and embedding scenarios; it can
//! simulate latency and scripted failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sketchflow_types::{DocumentId, ServerState, Snapshot};
use thiserror::Error;

/// Error from a save attempt.
///
/// `Network` and `Server` are transient and eligible for the bounded retry;
/// `Validation` and `Auth` are surfaced immediately — retrying a malformed
/// payload or an expired session cannot succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaveError {
    #[error("network error: {0}")]
    Network(String),
    #[error("payload rejected: {0}")]
    Validation(String),
    #[error("authentication required: {0}")]
    Auth(String),
    #[error("server error: {0}")]
    Server(String),
}

impl SaveError {
    pub fn kind(&self) -> SaveErrorKind {
        match self {
            SaveError::Network(_) => SaveErrorKind::Network,
            SaveError::Validation(_) => SaveErrorKind::Validation,
            SaveError::Auth(_) => SaveErrorKind::Auth,
            SaveError::Server(_) => SaveErrorKind::Server,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// The kind of a [`SaveError`], without its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveErrorKind {
    Network,
    Validation,
    Auth,
    Server,
}

impl SaveErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveErrorKind::Network => "network",
            SaveErrorKind::Validation => "validation",
            SaveErrorKind::Auth => "auth",
            SaveErrorKind::Server => "server",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SaveErrorKind::Network | SaveErrorKind::Server)
    }
}

/// Abstract boundary to the save endpoint.
///
/// A gateway timeout must be reported as `SaveError::Network`; the
/// coordinator never cancels an issued call, it only decides what to do with
/// the result.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist `payload` as the latest snapshot of `document_id`.
    async fn save(
        &self,
        document_id: DocumentId,
        payload: &Snapshot,
    ) -> Result<ServerState, SaveError>;
}

// ============================================================================
// MemoryGateway
// ============================================================================

/// One recorded `save()` invocation.
#[derive(Debug, Clone)]
pub struct SaveCall {
    pub document_id: DocumentId,
    pub payload: Snapshot,
}

/// In-memory gateway with per-document revision counters.
///
/// Records every invocation, and can be scripted with artificial latency and
/// queued failures for exercising the coordinator's retry and follow-up
/// paths.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    saved: DashMap<DocumentId, (Snapshot, u64)>,
    calls: Mutex<Vec<SaveCall>>,
    queued_errors: Mutex<VecDeque<SaveError>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error; each queued error fails exactly one future call.
    pub fn push_error(&self, error: SaveError) {
        self.queued_errors.lock().push_back(error);
    }

    /// Delay every save by `latency` (None = resolve immediately).
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of `save()` invocations so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<SaveCall> {
        self.calls.lock().clone()
    }

    /// Payload of the most recent invocation.
    pub fn last_payload(&self, document_id: &DocumentId) -> Option<Snapshot> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|call| call.document_id == *document_id)
            .map(|call| call.payload.clone())
    }

    /// The stored snapshot for a document, if any save succeeded.
    pub fn saved(&self, document_id: &DocumentId) -> Option<Snapshot> {
        self.saved.get(document_id).map(|entry| entry.0.clone())
    }

    /// Current server-side revision for a document.
    pub fn revision(&self, document_id: &DocumentId) -> u64 {
        self.saved.get(document_id).map(|entry| entry.1).unwrap_or(0)
    }

    /// Highest number of concurrently in-flight saves observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn save(
        &self,
        document_id: DocumentId,
        payload: &Snapshot,
    ) -> Result<ServerState, SaveError> {
        self.calls.lock().push(SaveCall {
            document_id,
            payload: payload.clone(),
        });

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let result = match self.queued_errors.lock().pop_front() {
            Some(error) => Err(error),
            None => {
                let mut entry = self
                    .saved
                    .entry(document_id)
                    .or_insert_with(|| (payload.clone(), 0));
                entry.0 = payload.clone();
                entry.1 += 1;
                Ok(ServerState {
                    revision: entry.1,
                    saved_at: unix_now(),
                })
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
