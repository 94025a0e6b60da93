//! Integration tests for the session registry.
//!
//! Everything here drives the spawned actor through `RegistryHandle`,
//! the same interface the connection tasks and the bus forwarder use.

use std::time::Duration;

use chrono::Utc;
use pharma_core::{FarmaciaId, Notificacion, NotificacionId, TipoNotificacion};
use pharma_protocol::ServerMessage;
use pharmad::registry::{spawn_registry, RegistryError, RegistryHandle, SessionEvent};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

/// Admits `identity` and returns the push queue and revocation token the
/// connection task would hold on to.
async fn admit(
    handle: &RegistryHandle,
    id: i64,
    identity: &str,
) -> (mpsc::Receiver<ServerMessage>, CancellationToken) {
    let (tx, rx) = mpsc::channel(8);
    let token = CancellationToken::new();
    handle
        .admit(FarmaciaId::new(id), identity, tx, token.clone())
        .await
        .expect("admission should succeed");
    (rx, token)
}

fn notificacion(farmacia: i64, mensaje: &str) -> Notificacion {
    Notificacion {
        id: NotificacionId::new(1),
        farmacia_id: FarmaciaId::new(farmacia),
        tipo: TipoNotificacion::ProximoVencimiento,
        mensaje: mensaje.to_string(),
        codigo: Some("A-100".to_string()),
        leida: false,
        creado_en: Utc::now(),
    }
}

/// Next lifecycle event, failing the test on a silent stream.
async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("should receive event within timeout")
        .expect("event stream should stay open")
}

// ============================================================================
// Basic Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_admit_and_lookup() {
    let handle = spawn_registry();
    let (_rx, _token) = admit(&handle, 1, "farmacia central").await;

    let view = handle
        .lookup("farmacia central")
        .await
        .expect("session should be found");
    assert_eq!(view.farmacia_id, FarmaciaId::new(1));
    assert_eq!(view.identity, "farmacia central");

    assert_eq!(handle.count().await, 1);
    assert!(handle.is_connected());
}

#[tokio::test]
async fn test_remove_releases_the_identity() {
    let handle = spawn_registry();
    let (_rx, _token) = admit(&handle, 1, "farmacia norte").await;

    handle
        .remove("farmacia norte")
        .await
        .expect("removal should succeed");
    assert!(handle.lookup("farmacia norte").await.is_none());
    assert_eq!(handle.count().await, 0);

    // The identity is free for the reconnect.
    let (_rx, _token) = admit(&handle, 1, "farmacia norte").await;
    assert_eq!(handle.count().await, 1);
}

#[tokio::test]
async fn test_remove_unknown_session_errors() {
    let handle = spawn_registry();

    let result = handle.remove("fantasma").await;
    assert!(
        matches!(result, Err(RegistryError::SessionNotFound(_))),
        "expected SessionNotFound, got {result:?}"
    );
}

#[tokio::test]
async fn test_duplicate_identity_is_rejected() {
    let handle = spawn_registry();
    let (_rx, token) = admit(&handle, 1, "farmacia central").await;

    let (tx2, _rx2) = mpsc::channel(8);
    let result = handle
        .admit(
            FarmaciaId::new(1),
            "farmacia central",
            tx2,
            CancellationToken::new(),
        )
        .await;

    assert!(
        matches!(result, Err(RegistryError::DuplicateSession(ref i)) if i == "farmacia central"),
        "expected DuplicateSession, got {result:?}"
    );

    // The rejection must not disturb the session that was there first.
    assert!(handle.lookup("farmacia central").await.is_some());
    assert!(!token.is_cancelled());
    assert_eq!(handle.count().await, 1);
}

#[tokio::test]
async fn test_same_farmacia_cannot_hold_two_identities() {
    let handle = spawn_registry();
    let (_rx, _token) = admit(&handle, 7, "farmacia sur").await;

    // Renamed mid-session: same farmacia id, new spelling.
    let (tx2, _rx2) = mpsc::channel(8);
    let result = handle
        .admit(
            FarmaciaId::new(7),
            "farmacia del sur",
            tx2,
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(RegistryError::DuplicateSession(_))));
}

// ============================================================================
// Delivery Tests
// ============================================================================

#[tokio::test]
async fn test_deliver_reaches_the_live_session() {
    let handle = spawn_registry();
    let (mut rx, _token) = admit(&handle, 3, "farmacia este").await;

    let delivered = handle
        .deliver(FarmaciaId::new(3), notificacion(3, "vence pronto"))
        .await;
    assert!(delivered, "a live session should take the push");

    let pushed = timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("push should arrive within timeout")
        .expect("push queue should stay open");
    match pushed {
        ServerMessage::Notificacion { notificacion } => {
            assert_eq!(notificacion.mensaje, "vence pronto");
        }
        other => panic!("expected Notificacion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_deliver_to_offline_farmacia_reports_false() {
    let handle = spawn_registry();

    let delivered = handle
        .deliver(FarmaciaId::new(99), notificacion(99, "nadie conectado"))
        .await;
    assert!(!delivered, "no session, no push");
}

#[tokio::test]
async fn test_deliver_preserves_publish_order() {
    let handle = spawn_registry();
    let (mut rx, _token) = admit(&handle, 4, "farmacia oeste").await;

    assert!(handle.deliver(FarmaciaId::new(4), notificacion(4, "primero")).await);
    assert!(handle.deliver(FarmaciaId::new(4), notificacion(4, "segundo")).await);

    for esperado in ["primero", "segundo"] {
        match rx.recv().await.expect("push queue should stay open") {
            ServerMessage::Notificacion { notificacion } => {
                assert_eq!(notificacion.mensaje, esperado);
            }
            other => panic!("expected Notificacion, got {other:?}"),
        }
    }
}

// ============================================================================
// Revocation Tests
// ============================================================================

#[tokio::test]
async fn test_force_close_cancels_the_session_token() {
    let handle = spawn_registry();
    let (_rx, token) = admit(&handle, 5, "farmacia vieja").await;

    assert!(handle.force_close("farmacia vieja").await);
    assert!(token.is_cancelled(), "revocation must cancel the token");
    assert!(handle.lookup("farmacia vieja").await.is_none());

    // Second close finds nothing.
    assert!(!handle.force_close("farmacia vieja").await);
}

// ============================================================================
// Query Tests
// ============================================================================

#[tokio::test]
async fn test_connected_identities_are_sorted() {
    let handle = spawn_registry();
    let mut guards = Vec::new();
    for (id, identity) in [(1, "zeta"), (2, "alfa"), (3, "media")] {
        guards.push(admit(&handle, id, identity).await);
    }

    assert_eq!(handle.connected().await, vec!["alfa", "media", "zeta"]);
}

#[tokio::test]
async fn test_count_follows_admissions_and_removals() {
    let handle = spawn_registry();
    let _a = admit(&handle, 1, "una").await;
    let _b = admit(&handle, 2, "dos").await;
    assert_eq!(handle.count().await, 2);

    handle.remove("una").await.expect("removal should succeed");
    assert_eq!(handle.count().await, 1);
}

// ============================================================================
// Event Subscription Tests
// ============================================================================

#[tokio::test]
async fn test_admission_event_reaches_subscribers() {
    let handle = spawn_registry();
    let mut rx = handle.subscribe();

    let (_push, _token) = admit(&handle, 6, "farmacia andina").await;

    match next_event(&mut rx).await {
        SessionEvent::Admitted {
            farmacia_id,
            identity,
        } => {
            assert_eq!(farmacia_id, FarmaciaId::new(6));
            assert_eq!(identity, "farmacia andina");
        }
        other => panic!("expected Admitted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_removal_and_revocation_events_carry_the_identity() {
    let handle = spawn_registry();
    let mut rx = handle.subscribe();

    let (_push, _token) = admit(&handle, 6, "farmacia andina").await;
    let _ = next_event(&mut rx).await; // Admitted

    handle
        .remove("farmacia andina")
        .await
        .expect("removal should succeed");
    match next_event(&mut rx).await {
        SessionEvent::Removed { identity } => assert_eq!(identity, "farmacia andina"),
        other => panic!("expected Removed, got {other:?}"),
    }

    let (_push, _token) = admit(&handle, 6, "farmacia andina").await;
    let _ = next_event(&mut rx).await; // Admitted

    assert!(handle.force_close("farmacia andina").await);
    match next_event(&mut rx).await {
        SessionEvent::ForceClosed { identity } => assert_eq!(identity, "farmacia andina"),
        other => panic!("expected ForceClosed, got {other:?}"),
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_admissions_agree_on_one_winner() {
    let handle = spawn_registry();

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let h = handle.clone();
        tasks.push(tokio::spawn(async move {
            let (tx, rx) = mpsc::channel(8);
            let result = h
                .admit(
                    FarmaciaId::new(1),
                    "farmacia central",
                    tx,
                    CancellationToken::new(),
                )
                .await;
            // Keep the queue alive so a win stays a live session.
            (result, rx)
        }));
    }

    let mut admitted = 0;
    let mut guards = Vec::new();
    for task in tasks {
        let (result, rx) = task.await.expect("task should complete");
        match result {
            Ok(()) => admitted += 1,
            Err(RegistryError::DuplicateSession(_)) => {}
            Err(other) => panic!("unexpected admission error: {other:?}"),
        }
        guards.push(rx);
    }

    assert_eq!(admitted, 1, "exactly one connection wins the identity");
    assert_eq!(handle.count().await, 1);
}

#[tokio::test]
async fn test_cloned_handles_share_the_actor() {
    let handle = spawn_registry();
    let clone = handle.clone();

    let (_rx, _token) = admit(&handle, 8, "compartida").await;

    assert!(clone.lookup("compartida").await.is_some());
    assert!(handle.is_connected());
    assert!(clone.is_connected());
}
