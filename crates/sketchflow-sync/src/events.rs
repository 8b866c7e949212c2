//! Typed pub/sub bus for save lifecycle events.
//!
//! The coordinator emits [`SaveFlow`] events over an explicitly injected bus
//! instead of signaling through any ambient global channel, so UI wiring is
//! deterministic and testable. Subscribers filter by subject pattern.
//!
//! # Pattern Matching
//!
//! Patterns use dot-separated tokens with wildcards:
//! - `*` matches exactly one token: `save.*` matches `save.failed` but not
//!   `document.activated`
//! - `>` matches one or more tokens (only at end): `save.>` matches every
//!   save subject
//! - Exact match otherwise

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sketchflow_types::{DocumentId, DocumentKind, ServerState};
use tokio::sync::broadcast;

use crate::gateway::SaveErrorKind;
use crate::tracker::SaveState;

// ============================================================================
// Pattern Matching
// ============================================================================

/// Check if a subject matches a pattern.
///
/// `*` matches exactly one token, `>` matches one or more trailing tokens.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.').peekable();
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => {
                // `>` only matches when it is the final pattern token.
                return pattern_tokens.peek().is_none();
            }
            (Some("*"), Some(_)) => {}
            (Some(token), Some(subject_token)) => {
                if token != subject_token {
                    return false;
                }
            }
            (None, None) => return true,
            // One side exhausted before the other.
            _ => return false,
        }
    }
}

// ============================================================================
// Flow Messages
// ============================================================================

/// Trait for payloads that know their subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

/// A message published to the flow bus.
#[derive(Clone, Debug)]
pub struct FlowMessage<T> {
    /// The subject (derived from the payload).
    pub subject: String,
    /// The payload data.
    pub payload: T,
    /// When this message was published.
    pub timestamp: Instant,
}

impl<T: HasSubject> FlowMessage<T> {
    pub fn new(payload: T) -> Self {
        let subject = payload.subject().to_string();
        Self {
            subject,
            payload,
            timestamp: Instant::now(),
        }
    }
}

// ============================================================================
// Save Flow Events
// ============================================================================

/// Save lifecycle events emitted by the auto-save coordinator.
///
/// `DirtyChanged` drives per-document "unsaved changes" indicators;
/// `SaveFailed` carries the error kind so the UI can distinguish a
/// re-authentication prompt from a transient failure banner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SaveFlow {
    /// A document's dirty/save state changed.
    DirtyChanged {
        document_id: DocumentId,
        state: SaveState,
    },

    /// A save request went in flight carrying the snapshot at `revision`.
    SaveStarted {
        document_id: DocumentId,
        revision: u64,
    },

    /// The gateway confirmed a save.
    SaveSucceeded {
        document_id: DocumentId,
        revision: u64,
        server: ServerState,
    },

    /// A save failed terminally (after any bounded retry).
    SaveFailed {
        document_id: DocumentId,
        kind: SaveErrorKind,
        message: String,
    },

    /// A document was registered with the coordinator.
    Activated {
        document_id: DocumentId,
        kind: DocumentKind,
    },

    /// A document was released from the coordinator.
    Deactivated { document_id: DocumentId },
}

impl SaveFlow {
    /// Get the subject string for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::DirtyChanged { .. } => "save.dirty",
            Self::SaveStarted { .. } => "save.started",
            Self::SaveSucceeded { .. } => "save.succeeded",
            Self::SaveFailed { .. } => "save.failed",
            Self::Activated { .. } => "document.activated",
            Self::Deactivated { .. } => "document.deactivated",
        }
    }

    /// Get the document ID for this event.
    pub fn document_id(&self) -> DocumentId {
        match self {
            Self::DirtyChanged { document_id, .. }
            | Self::SaveStarted { document_id, .. }
            | Self::SaveSucceeded { document_id, .. }
            | Self::SaveFailed { document_id, .. }
            | Self::Activated { document_id, .. }
            | Self::Deactivated { document_id } => *document_id,
        }
    }
}

impl HasSubject for SaveFlow {
    fn subject(&self) -> &str {
        SaveFlow::subject(self)
    }
}

// ============================================================================
// FlowBus
// ============================================================================

/// Type-parameterized pub/sub bus for a specific flow domain.
///
/// Uses a broadcast channel internally for multi-subscriber delivery.
/// Subscribers receive only messages matching their pattern.
#[derive(Debug)]
pub struct FlowBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<FlowMessage<T>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> FlowBus<T> {
    /// Create a new flow bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + HasSubject + 'static> FlowBus<T> {
    /// Publish a payload to the bus.
    ///
    /// Returns the number of subscribers that received the message.
    pub fn publish(&self, payload: T) -> usize {
        self.tx.send(FlowMessage::new(payload)).unwrap_or(0)
    }

    /// Subscribe to messages matching a pattern.
    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + 'static> Clone for FlowBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A subscription to a [`FlowBus`] with pattern filtering.
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Receive the next matching message, waiting if necessary.
    ///
    /// Returns `None` if the channel is closed.
    pub async fn recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        pattern = %self.pattern,
                        lagged = n,
                        "save flow subscription lagged behind"
                    );
                }
            }
        }
    }

    /// Try to receive the next matching message without blocking.
    pub fn try_recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(
                        pattern = %self.pattern,
                        lagged = n,
                        "save flow subscription lagged behind"
                    );
                }
            }
        }
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("save.dirty", "save.dirty"));
        assert!(matches_pattern("save.*", "save.failed"));
        assert!(!matches_pattern("save.*", "document.activated"));
        assert!(matches_pattern("save.>", "save.failed"));
        assert!(matches_pattern(">", "document.activated"));
        assert!(!matches_pattern("save.*", "save"));
        assert!(!matches_pattern("save.>", "save"));
        assert!(!matches_pattern("save.dirty", "save.dirty.extra"));
    }

    #[tokio::test]
    async fn test_publish_subscribe_filtering() {
        let bus: FlowBus<SaveFlow> = FlowBus::new(16);
        let mut failures = bus.subscribe("save.failed");
        let mut all = bus.subscribe(">");

        let id = DocumentId::new();
        bus.publish(SaveFlow::DirtyChanged {
            document_id: id,
            state: SaveState::Dirty,
        });
        bus.publish(SaveFlow::SaveFailed {
            document_id: id,
            kind: SaveErrorKind::Network,
            message: "connection reset".into(),
        });

        let msg = failures.recv().await.unwrap();
        assert_eq!(msg.subject, "save.failed");
        assert_eq!(msg.payload.document_id(), id);

        assert_eq!(all.recv().await.unwrap().subject, "save.dirty");
        assert_eq!(all.recv().await.unwrap().subject, "save.failed");
    }

    #[tokio::test]
    async fn test_try_recv_skips_non_matching() {
        let bus: FlowBus<SaveFlow> = FlowBus::new(16);
        let mut sub = bus.subscribe("document.*");

        let id = DocumentId::new();
        bus.publish(SaveFlow::SaveStarted {
            document_id: id,
            revision: 1,
        });
        assert!(sub.try_recv().is_none());

        bus.publish(SaveFlow::Deactivated { document_id: id });
        let msg = sub.try_recv().unwrap();
        assert_eq!(msg.subject, "document.deactivated");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus: FlowBus<SaveFlow> = FlowBus::new(4);
        let delivered = bus.publish(SaveFlow::Deactivated {
            document_id: DocumentId::new(),
        });
        assert_eq!(delivered, 0);
    }
}
