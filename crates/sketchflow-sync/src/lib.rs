//! # sketchflow-sync
//!
//! The workspace auto-save coordinator.
//!
//! Sits between an editable surface (drawing canvas or rich-text document)
//! and a persistence endpoint, turning a stream of local edits into a
//! correctly-ordered, debounced, at-most-one-in-flight series of save
//! requests.
//!
//! Control flow: an edit lands in the [`ChangeBuffer`] → the
//! [`DebounceScheduler`] (re)arms → on quiet timeout the
//! [`AutoSaveCoordinator`] saves the latest buffered snapshot through the
//! [`PersistenceGateway`] → the [`DirtyStateTracker`] is cleared on success,
//! left dirty on failure. Saves for the same document are strictly
//! sequential; saves for different documents are fully independent.
//!
//! The gateway is the only hard boundary — `sketchflow-store` provides the
//! SQLite-backed implementation, [`MemoryGateway`] the in-process one.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod events;
pub mod gateway;
pub mod tracker;

pub use buffer::{ChangeBuffer, PendingSnapshot, RecordOutcome};
pub use cache::{CacheError, MemoryCache, SnapshotCache};
pub use config::{AutoSaveConfig, ConfigError};
pub use coordinator::{AutoSaveCoordinator, CoordinatorStats, FlushPhase, SaveOutcome};
pub use debounce::{ChangeClass, DebounceFired, DebounceScheduler};
pub use events::{FlowBus, FlowMessage, HasSubject, SaveFlow, Subscription, matches_pattern};
pub use gateway::{MemoryGateway, PersistenceGateway, SaveCall, SaveError, SaveErrorKind};
pub use tracker::{DirtyStateTracker, SaveState};
