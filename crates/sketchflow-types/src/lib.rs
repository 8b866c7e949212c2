//! # sketchflow-types
//!
//! Shared identity and content types for SketchFlow workspaces.
//!
//! Everything revolves around the [`DocumentId`]: a workspace holds canvases
//! and rich-text documents, each identified by a UUIDv7 and edited through
//! opaque [`Snapshot`] blobs. These types carry no behavior beyond identity,
//! equality, and serialization — the auto-save machinery lives in
//! `sketchflow-sync` and persistence in `sketchflow-store`.

pub mod document;
pub mod ids;

pub use document::{DocumentKind, ServerState, Snapshot};
pub use ids::{ClientId, DocumentId, ProjectId};
