//! Document content types: kind, snapshot, and server acknowledgment state.

use serde::{Deserialize, Serialize};

/// Type of editable document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Drawing canvas (scene snapshot).
    Canvas,
    /// Rich-text document (node-tree snapshot).
    Document,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Canvas => "canvas",
            DocumentKind::Document => "document",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "canvas" => Some(DocumentKind::Canvas),
            "document" => Some(DocumentKind::Document),
            _ => None,
        }
    }
}

/// An opaque serialized representation of a document's content.
///
/// The coordinator never inspects snapshot contents — it only compares them
/// for equality to detect dirtiness. The shape (scene JSON, node tree, plain
/// title text) is owned by the editing surface that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    /// The serialized content.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Snapshot {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Snapshot {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Server-side acknowledgment of a persisted snapshot.
///
/// Returned by the persistence gateway on a successful save. `revision` is
/// monotonically increasing per document; `saved_at` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    pub revision: u64,
    pub saved_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [DocumentKind::Canvas, DocumentKind::Document] {
            assert_eq!(DocumentKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(DocumentKind::from_str("spreadsheet"), None);
    }

    #[test]
    fn test_snapshot_equality() {
        let a = Snapshot::new("{\"shapes\":[]}");
        let b = Snapshot::from("{\"shapes\":[]}");
        assert_eq!(a, b);
        assert_ne!(a, Snapshot::new("{\"shapes\":[1]}"));
    }

    #[test]
    fn test_snapshot_empty() {
        assert!(Snapshot::new("").is_empty());
        assert_eq!(Snapshot::new("abc").len(), 3);
    }
}
