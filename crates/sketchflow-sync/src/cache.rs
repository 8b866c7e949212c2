//! Best-effort secondary snapshot storage.
//!
//! A [`SnapshotCache`] keeps the latest buffered snapshot somewhere cheap and
//! local (memory, a scratch file) so work survives a crashed tab or process.
//! Cache writes are strictly write-behind: a cached snapshot never counts as
//! persisted, and dirty-state computation ignores the cache entirely. Only a
//! confirmed gateway save cleans a document.

use async_trait::async_trait;
use dashmap::DashMap;
use sketchflow_types::{DocumentId, Snapshot};
use thiserror::Error;

/// Error from a cache operation. Callers treat these as advisory — a failed
/// cache write is logged, never propagated into the save path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(String),
    #[error("cache encoding error: {0}")]
    Encoding(String),
}

/// Pluggable secondary-storage strategy for unsaved snapshots.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Store the latest snapshot for a document, overwriting any previous one.
    async fn store(&self, document_id: DocumentId, snapshot: &Snapshot) -> Result<(), CacheError>;

    /// Load the cached snapshot for a document, if present.
    async fn load(&self, document_id: &DocumentId) -> Result<Option<Snapshot>, CacheError>;

    /// Drop the cached snapshot for a document.
    async fn clear(&self, document_id: &DocumentId) -> Result<(), CacheError>;
}

/// In-memory cache. Survives nothing, but makes the write-behind path
/// observable in tests and serves single-process embedders.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<DocumentId, Snapshot>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SnapshotCache for MemoryCache {
    async fn store(&self, document_id: DocumentId, snapshot: &Snapshot) -> Result<(), CacheError> {
        self.entries.insert(document_id, snapshot.clone());
        Ok(())
    }

    async fn load(&self, document_id: &DocumentId) -> Result<Option<Snapshot>, CacheError> {
        Ok(self.entries.get(document_id).map(|entry| entry.value().clone()))
    }

    async fn clear(&self, document_id: &DocumentId) -> Result<(), CacheError> {
        self.entries.remove(document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_load_clear() {
        let cache = MemoryCache::new();
        let id = DocumentId::new();

        assert_eq!(cache.load(&id).await.unwrap(), None);

        cache.store(id, &Snapshot::new("draft")).await.unwrap();
        assert_eq!(cache.load(&id).await.unwrap(), Some(Snapshot::new("draft")));

        // Latest wins.
        cache.store(id, &Snapshot::new("newer")).await.unwrap();
        assert_eq!(cache.load(&id).await.unwrap(), Some(Snapshot::new("newer")));

        cache.clear(&id).await.unwrap();
        assert_eq!(cache.load(&id).await.unwrap(), None);
        assert!(cache.is_empty());
    }
}
