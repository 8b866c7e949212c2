//! # sketchflow-store
//!
//! SQLite-backed workspace persistence for SketchFlow.
//!
//! [`WorkspaceDb`] holds document records and their latest snapshots;
//! [`StoreGateway`] exposes it through the coordinator's persistence gateway
//! contract; [`JsonFileCache`] is the file-backed secondary snapshot cache.

pub mod cache;
pub mod db;
pub mod gateway;

pub use cache::JsonFileCache;
pub use db::{DocumentMeta, StoreError, StoreResult, StoredSnapshot, WorkspaceDb};
pub use gateway::{DbHandle, StoreGateway};
