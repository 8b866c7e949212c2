//! Typed identifiers for documents, projects, and editing clients.
//!
//! All ID types wrap UUIDv7 (time-ordered, globally unique). They serialize
//! transparently and display as standard UUID text for logging. The `short()`
//! form (first 8 hex chars) is for human-facing UI — never used as a lookup
//! key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A document identifier (UUIDv7). One per canvas or text document.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(uuid::Uuid);

/// A project identifier (UUIDv7). Documents are grouped under projects.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(uuid::Uuid);

/// An editing-client identifier (UUIDv7). One per connected editor session.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters — for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// The raw 16 bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Reconstruct from 16 bytes.
            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(b))
            }

            /// A nil / zero ID — for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(DocumentId, "DocumentId");
impl_typed_id!(ProjectId, "ProjectId");
impl_typed_id!(ClientId, "ClientId");

// ── ProjectId sentinels ─────────────────────────────────────────────────────

/// Fixed namespace for deriving deterministic ProjectIds via UUIDv5.
const SKETCHFLOW_PROJECT_NS: uuid::Uuid = uuid::uuid!("3f5a9b2c-8d14-4e76-b0a9-6c2e1d7f4a58");

impl ProjectId {
    /// The well-known "scratch" project.
    ///
    /// Used for documents created outside any explicit project (quick
    /// sketches, untitled drafts). Deterministic: same value every time
    /// (UUIDv5 derived from `b"scratch"`).
    pub fn scratch() -> Self {
        Self(uuid::Uuid::new_v5(&SKETCHFLOW_PROJECT_NS, b"scratch"))
    }
}
