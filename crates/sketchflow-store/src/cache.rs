//! File-backed snapshot cache.
//!
//! One JSON file per document under a scratch directory. Serves the same
//! role browser localStorage does for the web editor: a best-effort local
//! copy of unsaved work, never consulted for dirty-state computation.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sketchflow_sync::{CacheError, SnapshotCache};
use sketchflow_types::{DocumentId, Snapshot};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    document_id: String,
    content: String,
    cached_at: i64,
}

/// Snapshot cache writing one `<id>.json` file per document.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    root: PathBuf,
}

impl JsonFileCache {
    /// Create a cache rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn entry_path(&self, id: &DocumentId) -> PathBuf {
        self.root.join(format!("{}.json", id.to_hex()))
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl SnapshotCache for JsonFileCache {
    async fn store(&self, document_id: DocumentId, snapshot: &Snapshot) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;

        let entry = CacheEntry {
            document_id: document_id.to_hex(),
            content: snapshot.as_str().to_string(),
            cached_at: unix_now(),
        };
        let bytes =
            serde_json::to_vec_pretty(&entry).map_err(|e| CacheError::Encoding(e.to_string()))?;

        tokio::fs::write(self.entry_path(&document_id), bytes)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))
    }

    async fn load(&self, document_id: &DocumentId) -> Result<Option<Snapshot>, CacheError> {
        let bytes = match tokio::fs::read(self.entry_path(document_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io(e.to_string())),
        };
        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Encoding(e.to_string()))?;
        Ok(Some(Snapshot::new(entry.content)))
    }

    async fn clear(&self, document_id: &DocumentId) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.entry_path(document_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e.to_string())),
        }
    }
}
