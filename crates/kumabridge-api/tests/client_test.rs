// Integration tests for `SocketClient` against the in-process fake server.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use kumabridge_api::testing::{FakeServer, ServerScript};
use kumabridge_api::{ConnectionState, Error, EventReceiver, ReconnectConfig, SocketClient, SocketEvent};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        max_retries: None,
    }
}

async fn setup(script: ServerScript) -> (FakeServer, SocketClient, EventReceiver) {
    let server = FakeServer::start(script).await;
    let (client, events) =
        SocketClient::connect(&server.url(), fast_reconnect(), CancellationToken::new()).unwrap();
    (server, client, events)
}

async fn next_event(events: &mut EventReceiver) -> SocketEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a socket event")
        .expect("event channel closed")
}

async fn wait_connected(events: &mut EventReceiver) {
    loop {
        if let SocketEvent::Connected { .. } = next_event(events).await {
            return;
        }
    }
}

// ── Handshake & pushes ──────────────────────────────────────────────

#[tokio::test]
async fn test_connects_and_forwards_pushes_in_order() {
    let (server, client, mut events) = setup(
        ServerScript::open()
            .with_event("monitorList", vec![json!({"1": {"id": 1, "name": "A"}})])
            .with_event("deleteMonitorFromList", vec![json!(1)]),
    )
    .await;

    let SocketEvent::Connected { sid } = next_event(&mut events).await else {
        panic!("expected connected event first");
    };
    assert_eq!(sid.as_deref(), Some("fake-1"));
    assert!(client.is_connected());
    assert_eq!(server.sessions(), 1);

    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Event {
            name: "monitorList".into(),
            args: vec![json!({"1": {"id": 1, "name": "A"}})],
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Event {
            name: "deleteMonitorFromList".into(),
            args: vec![json!(1)],
        }
    );

    server.push("updateMonitorIntoList", vec![json!({"x": {"id": 2}})]);
    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Event {
            name: "updateMonitorIntoList".into(),
            args: vec![json!({"x": {"id": 2}})],
        }
    );
}

#[tokio::test]
async fn test_login_challenge_is_forwarded() {
    let (_server, _client, mut events) =
        setup(ServerScript::login_required("admin", "secret")).await;

    wait_connected(&mut events).await;
    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Event {
            name: "loginRequired".into(),
            args: Vec::new(),
        }
    );
}

// ── Acknowledgements ────────────────────────────────────────────────

#[tokio::test]
async fn test_emit_with_ack_resolves_with_ack_args() {
    let (server, client, mut events) =
        setup(ServerScript::open().with_ack("add", json!({"ok": true, "monitorID": 7}))).await;
    wait_connected(&mut events).await;

    let ack = client
        .emit_with_ack("add", vec![json!({"name": "web"})])
        .await
        .unwrap();

    assert_eq!(ack, vec![json!({"ok": true, "monitorID": 7})]);
    assert_eq!(client.pending_acks(), 0);

    let received = server.received_named("add");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].args, vec![json!({"name": "web"})]);
    assert!(received[0].ack_id.is_some());
}

#[tokio::test]
async fn test_emit_without_ack_is_delivered() {
    let (server, client, mut events) = setup(ServerScript::open()).await;
    wait_connected(&mut events).await;

    client.emit("hello", vec![json!("world")]).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while server.received_named("hello").is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(server.received_named("hello")[0].ack_id, None);
}

#[tokio::test]
async fn test_late_ack_after_timeout_is_ignored() {
    let (_server, client, mut events) = setup(
        ServerScript::open()
            .with_ack("slow", json!({"ok": true}))
            .with_ack_delay(Duration::from_millis(200)),
    )
    .await;
    wait_connected(&mut events).await;

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        client.emit_with_ack("slow", vec![json!({})]),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(client.pending_acks(), 0);

    // Let the late ack arrive; the connection must stay usable.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(client.is_connected());

    let ack = tokio::time::timeout(
        Duration::from_secs(5),
        client.emit_with_ack("slow", vec![json!({})]),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(ack, vec![json!({"ok": true})]);
}

#[tokio::test]
async fn test_disconnect_fails_pending_ack_and_reconnects() {
    let (server, client, mut events) = setup(ServerScript::open()).await;
    wait_connected(&mut events).await;

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.emit_with_ack("never", vec![json!({})]).await })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.pending_acks() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    server.disconnect_all();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::Disconnected { .. })), "got {result:?}");

    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Disconnected {
            reason: "io server disconnect".into(),
        }
    );
    wait_connected(&mut events).await;
    assert_eq!(server.sessions(), 2);
}

#[tokio::test]
async fn test_emits_racing_a_disconnect_never_hang() {
    let (server, client, mut events) = setup(ServerScript::open()).await;
    wait_connected(&mut events).await;

    let waiters: Vec<_> = (0..40u64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(i)).await;
                client.emit_with_ack("never", vec![json!(i)]).await
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    server.refuse_connections(true);
    server.disconnect_all();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("emit still waiting after the session ended")
            .unwrap();
        assert!(
            matches!(result, Err(Error::Disconnected { .. } | Error::NotConnected)),
            "got {result:?}"
        );
    }
    assert_eq!(client.pending_acks(), 0);
}

// ── Connection state ────────────────────────────────────────────────

#[tokio::test]
async fn test_emit_while_disconnected_is_rejected() {
    let server = FakeServer::start(ServerScript::open()).await;
    server.refuse_connections(true);
    let (client, mut events) =
        SocketClient::connect(&server.url(), fast_reconnect(), CancellationToken::new()).unwrap();

    let SocketEvent::Disconnected { .. } = next_event(&mut events).await else {
        panic!("expected a failed connection attempt");
    };
    assert!(matches!(client.state(), ConnectionState::Reconnecting { .. }));

    let err = client.emit_with_ack("add", vec![json!({})]).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
    assert!(err.is_unavailable());

    server.refuse_connections(false);
    wait_connected(&mut events).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_missing_pings_end_the_session() {
    let (_server, _client, mut events) = setup(
        ServerScript::open()
            .with_ping(Duration::from_millis(100), Duration::from_millis(50))
            .without_pings(),
    )
    .await;
    wait_connected(&mut events).await;

    let SocketEvent::Disconnected { reason } = next_event(&mut events).await else {
        panic!("expected the ping watchdog to end the session");
    };
    assert!(reason.contains("150ms"), "unexpected reason: {reason}");
}

#[tokio::test]
async fn test_retry_limit_closes_client() {
    let server = FakeServer::start(ServerScript::open()).await;
    server.refuse_connections(true);
    let reconnect = ReconnectConfig {
        max_retries: Some(1),
        ..fast_reconnect()
    };
    let (client, _events) =
        SocketClient::connect(&server.url(), reconnect, CancellationToken::new()).unwrap();

    let mut state = client.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Closed),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(client.is_closed());
}

#[tokio::test]
async fn test_shutdown_closes_client() {
    let (_server, client, mut events) = setup(ServerScript::open()).await;
    wait_connected(&mut events).await;

    client.shutdown();

    let mut state = client.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Closed),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(client.state().to_string(), "closed");
}
