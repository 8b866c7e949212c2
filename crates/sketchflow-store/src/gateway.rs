//! Store-side implementation of the persistence gateway.
//!
//! Maps store failures onto the coordinator's error taxonomy: an empty or
//! unknown-document payload is a `Validation` error (retrying cannot help),
//! anything else from SQLite is a `Server` error (eligible for the bounded
//! retry).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sketchflow_sync::{PersistenceGateway, SaveError};
use sketchflow_types::{DocumentId, ServerState, Snapshot};
use tracing::debug;

use crate::db::{StoreError, WorkspaceDb};

/// Thread-safe database handle shared with other store consumers.
pub type DbHandle = Arc<Mutex<WorkspaceDb>>;

/// [`PersistenceGateway`] backed by a [`WorkspaceDb`].
#[derive(Clone)]
pub struct StoreGateway {
    db: DbHandle,
}

impl StoreGateway {
    pub fn new(db: WorkspaceDb) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Wrap an existing shared handle.
    pub fn with_handle(db: DbHandle) -> Self {
        Self { db }
    }

    /// The underlying database handle.
    pub fn db(&self) -> DbHandle {
        Arc::clone(&self.db)
    }
}

#[async_trait]
impl PersistenceGateway for StoreGateway {
    async fn save(
        &self,
        document_id: DocumentId,
        payload: &Snapshot,
    ) -> Result<ServerState, SaveError> {
        if payload.is_empty() {
            return Err(SaveError::Validation("empty snapshot payload".into()));
        }

        let result = {
            let db = self
                .db
                .lock()
                .map_err(|_| SaveError::Server("store lock poisoned".into()))?;
            db.save_snapshot(&document_id, payload)
        };

        match result {
            Ok((revision, saved_at)) => {
                debug!(document = %document_id.short(), revision, "snapshot persisted");
                Ok(ServerState { revision, saved_at })
            }
            Err(StoreError::DocumentNotFound(id)) => {
                Err(SaveError::Validation(format!("unknown document {id}")))
            }
            Err(error) => Err(SaveError::Server(error.to_string())),
        }
    }
}
