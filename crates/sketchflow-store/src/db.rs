//! SQLite persistence for workspace documents and their snapshots.
//!
//! One row per document, one row per document for its latest snapshot with a
//! monotonically increasing revision. Older snapshots are not kept — the
//! coordinator's latest-wins semantics make them unrecoverable anyway.

use std::path::Path;

use rusqlite::{Connection, params};
use sketchflow_types::{DocumentId, DocumentKind, ProjectId, Snapshot};
use thiserror::Error;

/// Error from the workspace store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),
    #[error("corrupt id in database: {0}")]
    CorruptId(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document metadata stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub project_id: ProjectId,
    pub kind: DocumentKind,
    pub title: String,
    pub created_at: i64,
}

/// The latest persisted snapshot of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub document_id: DocumentId,
    pub revision: u64,
    pub snapshot: Snapshot,
    pub saved_at: i64,
}

const SCHEMA: &str = r#"
-- Document records
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at INTEGER DEFAULT (unixepoch())
);
CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id, created_at);

-- Latest snapshot per document
CREATE TABLE IF NOT EXISTS snapshots (
    document_id TEXT PRIMARY KEY,
    revision INTEGER NOT NULL,
    content TEXT NOT NULL,
    saved_at INTEGER DEFAULT (unixepoch())
);
"#;

/// Database handle for workspace persistence.
pub struct WorkspaceDb {
    conn: Connection,
}

impl WorkspaceDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // =========================================================================
    // Document records
    // =========================================================================

    /// Create a new document record.
    pub fn create_document(&self, meta: &DocumentMeta) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO documents (id, project_id, kind, title)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                meta.id.to_hex(),
                meta.project_id.to_hex(),
                meta.kind.as_str(),
                meta.title,
            ],
        )?;
        Ok(())
    }

    /// Get a document by ID.
    pub fn get_document(&self, id: &DocumentId) -> StoreResult<Option<DocumentMeta>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, kind, title, created_at
             FROM documents WHERE id = ?1",
        )?;

        let mut rows = stmt.query(params![id.to_hex()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_meta(row)?)),
            None => Ok(None),
        }
    }

    /// List all documents in a project, oldest first.
    pub fn list_documents(&self, project_id: &ProjectId) -> StoreResult<Vec<DocumentMeta>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, kind, title, created_at
             FROM documents WHERE project_id = ?1 ORDER BY created_at, id",
        )?;

        let mut docs = Vec::new();
        let mut rows = stmt.query(params![project_id.to_hex()])?;
        while let Some(row) = rows.next()? {
            docs.push(row_to_meta(row)?);
        }
        Ok(docs)
    }

    pub fn document_exists(&self, id: &DocumentId) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE id = ?1",
            params![id.to_hex()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Rename a document.
    pub fn rename_document(&self, id: &DocumentId, title: &str) -> StoreResult<()> {
        let updated = self.conn.execute(
            "UPDATE documents SET title = ?1 WHERE id = ?2",
            params![title, id.to_hex()],
        )?;
        if updated == 0 {
            return Err(StoreError::DocumentNotFound(*id));
        }
        Ok(())
    }

    /// Delete a document and its snapshot.
    pub fn delete_document(&self, id: &DocumentId) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM snapshots WHERE document_id = ?1",
            params![id.to_hex()],
        )?;
        self.conn.execute(
            "DELETE FROM documents WHERE id = ?1",
            params![id.to_hex()],
        )?;
        Ok(())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Persist the latest snapshot of a document, bumping its revision.
    ///
    /// Returns the new revision and save timestamp. The document record must
    /// exist first.
    pub fn save_snapshot(&self, id: &DocumentId, snapshot: &Snapshot) -> StoreResult<(u64, i64)> {
        if !self.document_exists(id)? {
            return Err(StoreError::DocumentNotFound(*id));
        }

        let (revision, saved_at): (i64, i64) = self.conn.query_row(
            "INSERT INTO snapshots (document_id, revision, content)
             VALUES (?1, 1, ?2)
             ON CONFLICT(document_id) DO UPDATE SET
                 revision = revision + 1,
                 content = excluded.content,
                 saved_at = unixepoch()
             RETURNING revision, saved_at",
            params![id.to_hex(), snapshot.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((revision as u64, saved_at))
    }

    /// Get the latest snapshot of a document.
    pub fn get_snapshot(&self, id: &DocumentId) -> StoreResult<Option<StoredSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT document_id, revision, content, saved_at
             FROM snapshots WHERE document_id = ?1",
        )?;

        let mut rows = stmt.query(params![id.to_hex()])?;
        match rows.next()? {
            Some(row) => {
                let id_str: String = row.get(0)?;
                let revision: i64 = row.get(1)?;
                let content: String = row.get(2)?;
                Ok(Some(StoredSnapshot {
                    document_id: parse_id(&id_str)?,
                    revision: revision as u64,
                    snapshot: Snapshot::new(content),
                    saved_at: row.get(3)?,
                }))
            }
            None => Ok(None),
        }
    }
}

fn parse_id(s: &str) -> StoreResult<DocumentId> {
    DocumentId::parse(s).map_err(|_| StoreError::CorruptId(s.to_string()))
}

fn row_to_meta(row: &rusqlite::Row<'_>) -> StoreResult<DocumentMeta> {
    let id_str: String = row.get(0)?;
    let project_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    Ok(DocumentMeta {
        id: parse_id(&id_str)?,
        project_id: ProjectId::parse(&project_str)
            .map_err(|_| StoreError::CorruptId(project_str.clone()))?,
        kind: DocumentKind::from_str(&kind_str).unwrap_or(DocumentKind::Canvas),
        title: row.get(3)?,
        created_at: row.get(4)?,
    })
}
