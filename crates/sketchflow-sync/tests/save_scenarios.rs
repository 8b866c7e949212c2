//! End-to-end scenarios for the auto-save coordinator against the in-memory
//! gateway: debounce timing, follow-up saves, failure surfacing, and the
//! at-most-one-in-flight guarantee.

use std::sync::Arc;
use std::time::Duration;

use sketchflow_sync::{
    AutoSaveConfig, AutoSaveCoordinator, ChangeClass, MemoryGateway, SaveError, SaveErrorKind,
    SaveFlow, SaveOutcome, SaveState,
};
use sketchflow_types::{DocumentId, DocumentKind, Snapshot};

/// Short delays for tests that exercise debounce expiry itself.
fn fast_config() -> AutoSaveConfig {
    AutoSaveConfig {
        metadata_delay_ms: 40,
        content_delay_ms: 120,
        retry_limit: 1,
        event_capacity: 64,
    }
}

/// Long delays for tests that flush explicitly — no timer ever interferes.
fn manual_config() -> AutoSaveConfig {
    AutoSaveConfig {
        metadata_delay_ms: 2_000,
        content_delay_ms: 5_000,
        retry_limit: 1,
        event_capacity: 64,
    }
}

fn setup(config: AutoSaveConfig) -> (AutoSaveCoordinator, Arc<MemoryGateway>, DocumentId) {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = AutoSaveCoordinator::new(gateway.clone(), config);
    let id = DocumentId::new();
    coordinator.activate(id, DocumentKind::Canvas, None);
    (coordinator, gateway, id)
}

// ============================================================================
// Debounce scenarios
// ============================================================================

/// A single change with no further edits saves exactly once after the quiet
/// period, carrying that change.
#[tokio::test]
async fn scenario_single_change_saves_once() {
    let (coordinator, gateway, id) = setup(fast_config());

    coordinator.record_change(id, Snapshot::new("A"), ChangeClass::Content);
    assert_eq!(coordinator.state(&id), SaveState::Dirty);
    assert_eq!(gateway.call_count(), 0);

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(gateway.saved(&id), Some(Snapshot::new("A")));
    assert_eq!(coordinator.state(&id), SaveState::Clean);
}

/// A burst of edits faster than the debounce delay collapses into exactly one
/// save carrying the latest snapshot.
#[tokio::test]
async fn scenario_burst_collapses_to_latest() {
    let (coordinator, gateway, id) = setup(fast_config());

    coordinator.record_change(id, Snapshot::new("A"), ChangeClass::Content);
    tokio::time::sleep(Duration::from_millis(30)).await;
    coordinator.record_change(id, Snapshot::new("B"), ChangeClass::Content);
    tokio::time::sleep(Duration::from_millis(30)).await;
    coordinator.record_change(id, Snapshot::new("C"), ChangeClass::Content);

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(gateway.saved(&id), Some(Snapshot::new("C")));
    assert_eq!(coordinator.state(&id), SaveState::Clean);
}

/// Metadata edits ride the short delay class, independent of the longer
/// content delay.
#[tokio::test]
async fn scenario_metadata_uses_short_delay() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = AutoSaveCoordinator::new(
        gateway.clone(),
        AutoSaveConfig {
            metadata_delay_ms: 40,
            content_delay_ms: 5_000,
            ..fast_config()
        },
    );
    let id = DocumentId::new();
    coordinator.activate(id, DocumentKind::Document, None);

    coordinator.record_change(id, Snapshot::new("renamed"), ChangeClass::Metadata);
    tokio::time::sleep(Duration::from_millis(400)).await;

    // Saved well before the content delay would have elapsed.
    assert_eq!(gateway.call_count(), 1);
    assert_eq!(gateway.saved(&id), Some(Snapshot::new("renamed")));
}

/// Flushing cancels the armed timer: no second save fires after the delay.
#[tokio::test]
async fn scenario_flush_cancels_pending_timer() {
    let (coordinator, gateway, id) = setup(fast_config());

    coordinator.record_change(id, Snapshot::new("A"), ChangeClass::Content);
    let outcome = coordinator.flush_now(id).await.unwrap();
    assert!(matches!(
        outcome,
        SaveOutcome::Saved { .. } | SaveOutcome::AlreadyClean
    ));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(gateway.call_count(), 1);
    assert_eq!(gateway.saved(&id), Some(Snapshot::new("A")));
}

// ============================================================================
// In-flight behavior
// ============================================================================

/// An edit recorded while a save is in flight triggers a follow-up save with
/// the newest snapshot immediately after the first resolves.
#[tokio::test]
async fn scenario_late_edit_gets_followup() {
    let (coordinator, gateway, id) = setup(manual_config());
    gateway.set_latency(Some(Duration::from_millis(150)));

    coordinator.record_change(id, Snapshot::new("C"), ChangeClass::Content);
    let flusher = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.flush_now(id).await })
    };

    // Let the first save go in flight, then edit.
    tokio::time::sleep(Duration::from_millis(40)).await;
    coordinator.record_change(id, Snapshot::new("D"), ChangeClass::Content);
    assert_eq!(coordinator.state(&id), SaveState::Saving);

    let outcome = flusher.await.unwrap().unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved { .. }));

    let payloads: Vec<Snapshot> = gateway.calls().into_iter().map(|c| c.payload).collect();
    assert_eq!(payloads, vec![Snapshot::new("C"), Snapshot::new("D")]);
    assert_eq!(gateway.saved(&id), Some(Snapshot::new("D")));
    assert_eq!(coordinator.state(&id), SaveState::Clean);
    assert_eq!(gateway.max_in_flight(), 1);
}

/// No two gateway calls for one document are ever concurrently pending, no
/// matter how many flushes race.
#[tokio::test]
async fn property_at_most_one_in_flight() {
    let (coordinator, gateway, id) = setup(manual_config());
    gateway.set_latency(Some(Duration::from_millis(50)));

    coordinator.record_change(id, Snapshot::new("v1"), ChangeClass::Content);

    let mut handles = Vec::new();
    for n in 0..5 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.record_change(
                id,
                Snapshot::new(format!("racer-{n}")),
                ChangeClass::Content,
            );
            coordinator.flush_now(id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(gateway.max_in_flight(), 1);
    assert_eq!(coordinator.state(&id), SaveState::Clean);
    assert!(!coordinator.is_dirty(&id));
}

/// Flushing a clean document is a no-op: no gateway call.
#[tokio::test]
async fn property_idempotent_flush() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = AutoSaveCoordinator::new(gateway.clone(), manual_config());
    let id = DocumentId::new();
    coordinator.activate(id, DocumentKind::Document, Some(Snapshot::new("loaded")));

    assert_eq!(
        coordinator.flush_now(id).await.unwrap(),
        SaveOutcome::AlreadyClean
    );
    assert_eq!(
        coordinator.flush_now(id).await.unwrap(),
        SaveOutcome::AlreadyClean
    );
    assert_eq!(gateway.call_count(), 0);
}

// ============================================================================
// Failure handling
// ============================================================================

/// A validation failure is terminal: no retry, one error event, snapshot
/// retained.
#[tokio::test]
async fn scenario_validation_error_not_retried() {
    let (coordinator, gateway, id) = setup(manual_config());
    let mut errors = coordinator.subscribe("save.failed");

    gateway.push_error(SaveError::Validation("malformed scene".into()));
    coordinator.record_change(id, Snapshot::new("bad"), ChangeClass::Content);

    let error = coordinator.flush_now(id).await.unwrap_err();
    assert_eq!(error.kind(), SaveErrorKind::Validation);

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(coordinator.state(&id), SaveState::SaveFailed);
    assert!(coordinator.is_dirty(&id));

    let event = errors.try_recv().expect("one failure event");
    match event.payload {
        SaveFlow::SaveFailed { kind, .. } => assert_eq!(kind, SaveErrorKind::Validation),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(errors.try_recv().is_none());
}

/// An auth failure propagates for re-authentication instead of being
/// silently retried.
#[tokio::test]
async fn scenario_auth_error_propagates() {
    let (coordinator, gateway, id) = setup(manual_config());

    gateway.push_error(SaveError::Auth("session expired".into()));
    coordinator.record_change(id, Snapshot::new("work"), ChangeClass::Content);

    let error = coordinator.flush_now(id).await.unwrap_err();
    assert_eq!(error.kind(), SaveErrorKind::Auth);
    assert_eq!(gateway.call_count(), 1);
    assert_eq!(coordinator.state(&id), SaveState::SaveFailed);
}

/// A transient network failure gets exactly one immediate retry.
#[tokio::test]
async fn scenario_network_error_retried_once() {
    let (coordinator, gateway, id) = setup(manual_config());

    gateway.push_error(SaveError::Network("connection reset".into()));
    coordinator.record_change(id, Snapshot::new("v1"), ChangeClass::Content);

    let outcome = coordinator.flush_now(id).await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved { .. }));
    assert_eq!(gateway.call_count(), 2);
    assert_eq!(coordinator.stats().retries, 1);
    assert_eq!(coordinator.state(&id), SaveState::Clean);
}

/// Exhausting the bounded retry leaves the document failed with its snapshot
/// buffered; the next manual flush re-attempts and recovers.
#[tokio::test]
async fn property_dirty_round_trip() {
    let (coordinator, gateway, id) = setup(manual_config());

    coordinator.record_change(id, Snapshot::new("v1"), ChangeClass::Content);
    assert_eq!(coordinator.state(&id), SaveState::Dirty);
    coordinator.flush_now(id).await.unwrap();
    assert_eq!(coordinator.state(&id), SaveState::Clean);

    // Initial attempt and its retry both fail.
    gateway.push_error(SaveError::Network("reset".into()));
    gateway.push_error(SaveError::Network("reset again".into()));
    coordinator.record_change(id, Snapshot::new("v2"), ChangeClass::Content);

    let error = coordinator.flush_now(id).await.unwrap_err();
    assert_eq!(error.kind(), SaveErrorKind::Network);
    assert_eq!(coordinator.state(&id), SaveState::SaveFailed);
    assert!(coordinator.is_dirty(&id));

    // Buffered snapshot is still the source of truth for the next attempt.
    let outcome = coordinator.flush_now(id).await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Saved { .. }));
    assert_eq!(gateway.saved(&id), Some(Snapshot::new("v2")));
    assert_eq!(coordinator.state(&id), SaveState::Clean);
}

// ============================================================================
// Flush-all
// ============================================================================

/// `flush_all` saves each dirty document exactly once and skips clean ones.
#[tokio::test]
async fn scenario_flush_all_skips_clean() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = AutoSaveCoordinator::new(gateway.clone(), manual_config());

    let clean = DocumentId::new();
    let dirty_a = DocumentId::new();
    let dirty_b = DocumentId::new();
    coordinator.activate(clean, DocumentKind::Canvas, Some(Snapshot::new("saved")));
    coordinator.activate(dirty_a, DocumentKind::Canvas, None);
    coordinator.activate(dirty_b, DocumentKind::Document, None);

    coordinator.record_change(dirty_a, Snapshot::new("a"), ChangeClass::Content);
    coordinator.record_change(dirty_b, Snapshot::new("b"), ChangeClass::Content);

    let results = coordinator.flush_all().await;
    assert_eq!(results.len(), 2);
    for (_, result) in &results {
        assert!(matches!(result, Ok(SaveOutcome::Saved { .. })));
    }

    assert_eq!(gateway.call_count(), 2);
    assert_eq!(gateway.saved(&dirty_a), Some(Snapshot::new("a")));
    assert_eq!(gateway.saved(&dirty_b), Some(Snapshot::new("b")));
    assert_eq!(gateway.saved(&clean), None);
}

// ============================================================================
// Event surface
// ============================================================================

/// A successful save emits the full Dirty -> Saving -> Clean indicator
/// sequence plus started/succeeded events.
#[tokio::test]
async fn scenario_event_sequence() {
    let (coordinator, _gateway, id) = setup(manual_config());
    let mut dirty = coordinator.subscribe("save.dirty");
    let mut lifecycle = coordinator.subscribe("save.*");

    coordinator.record_change(id, Snapshot::new("v1"), ChangeClass::Content);
    coordinator.flush_now(id).await.unwrap();

    let states: Vec<SaveState> = std::iter::from_fn(|| {
        dirty.try_recv().map(|msg| match msg.payload {
            SaveFlow::DirtyChanged { state, .. } => state,
            other => panic!("unexpected event: {other:?}"),
        })
    })
    .collect();
    assert_eq!(
        states,
        vec![SaveState::Dirty, SaveState::Saving, SaveState::Clean]
    );

    let subjects: Vec<String> =
        std::iter::from_fn(|| lifecycle.try_recv().map(|msg| msg.subject)).collect();
    assert_eq!(
        subjects,
        vec![
            "save.dirty".to_string(),
            "save.dirty".to_string(),
            "save.started".to_string(),
            "save.succeeded".to_string(),
            "save.dirty".to_string(),
        ]
    );
}
