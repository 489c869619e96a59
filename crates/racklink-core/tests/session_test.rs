#![allow(clippy::unwrap_used)]

// Integration tests for `RealtimeSession`, driven through an in-memory
// bus link (and one real WebSocket loopback).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use racklink_api::{BusLink, BusPeer, RawFrame};
use racklink_core::{
    AckPattern, CommandEnvelope, CommandError, CoreError, DisconnectReason, EventKind,
    InboundEvent, RackCommand, RealtimeSession, SessionConfig, SessionState,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn token() -> SecretString {
    SecretString::from("user-1".to_owned())
}

/// Accept the handshake on `peer` and check it was the first frame.
async fn accept_handshake(peer: &mut BusPeer) {
    let hello = peer.recv_frame().await.unwrap();
    assert_eq!(hello.event, "authenticate");
    assert_eq!(hello.data["userId"], "user-1");
    assert!(peer.send_event("authenticated", json!({ "userId": "user-1" })).await);
}

async fn setup_with(config: SessionConfig) -> (RealtimeSession, BusPeer) {
    let (link, mut peer) = BusLink::pair(64);
    let session = RealtimeSession::new(config);

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_link(link, &token()).await })
    };
    accept_handshake(&mut peer).await;
    connecting.await.unwrap().unwrap();
    assert_eq!(session.current_state(), SessionState::Ready);

    (session, peer)
}

/// Short close grace: the in-memory peer never hangs up on its own.
fn test_config() -> SessionConfig {
    SessionConfig {
        close_grace: Duration::from_millis(100),
        ..SessionConfig::default()
    }
}

async fn setup() -> (RealtimeSession, BusPeer) {
    setup_with(test_config()).await
}

/// Wait until the session has registered `n` correlated requests.
async fn until_pending(session: &RealtimeSession, n: usize) {
    while session.pending_requests() < n {
        tokio::task::yield_now().await;
    }
}

fn tare(device: &str) -> CommandEnvelope {
    RackCommand::Tare.envelope(device)
}

// ── Ordering ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_queued_before_ready_follow_authenticate_in_order() {
    let (link, mut peer) = BusLink::pair(64);
    let session = RealtimeSession::default();

    session.send_command(&CommandEnvelope::new("rack-1", "first")).unwrap();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_link(link, &token()).await })
    };

    let hello = peer.recv_frame().await.unwrap();
    assert_eq!(hello.event, "authenticate");

    // Still authenticating: this one must also wait its turn.
    session.send_command(&CommandEnvelope::new("rack-1", "second")).unwrap();
    assert!(peer.send_event("authenticated", json!({})).await);
    connecting.await.unwrap().unwrap();

    session.send_command(&CommandEnvelope::new("rack-1", "third")).unwrap();

    let mut commands = Vec::new();
    for _ in 0..3 {
        let frame = peer.recv_frame().await.unwrap();
        assert_eq!(frame.event, "sendCommand");
        assert_eq!(frame.data["deviceId"], "rack-1");
        commands.push(frame.data["command"].as_str().unwrap().to_owned());
    }
    assert_eq!(commands, vec!["first", "second", "third"]);
}

// ── Correlated sends ────────────────────────────────────────────────

#[tokio::test]
async fn test_matching_ack_resolves_request() {
    let (session, mut peer) = setup().await;

    let waiting = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .send_command_await(
                    &tare("rack-1"),
                    RackCommand::Tare.expected_ack("rack-1"),
                    Duration::from_secs(5),
                )
                .await
        })
    };

    let sent = peer.recv_frame().await.unwrap();
    assert_eq!(sent.data["command"], "tare");

    // Another rack's answer must not settle it.
    peer.send_event(
        "commandResponse",
        json!({ "deviceId": "rack-2", "command": "tare", "success": true }),
    )
    .await;
    peer.send_event(
        "commandResponse",
        json!({ "deviceId": "rack-1", "command": "tare", "success": true }),
    )
    .await;

    let ack = waiting.await.unwrap().unwrap();
    assert_eq!(ack.device_id(), Some("rack-1"));
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_negative_ack_is_rejected() {
    let (session, mut peer) = setup().await;

    let waiting = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .send_command_await(&tare("rack-1"), EventKind::CommandResponse, Duration::from_secs(5))
                .await
        })
    };
    peer.recv_frame().await.unwrap();
    peer.send_event(
        "commandResponse",
        json!({ "deviceId": "rack-1", "success": false, "error": "scale busy" }),
    )
    .await;

    assert_eq!(
        waiting.await.unwrap().unwrap_err(),
        CommandError::Rejected {
            reason: "scale busy".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_silence_times_out_at_the_deadline() {
    let (session, mut peer) = setup().await;

    let started = tokio::time::Instant::now();
    let result = session
        .send_command_await(
            &tare("rack-1"),
            AckPattern::new(EventKind::CommandResponse).for_device("rack-1"),
            Duration::from_millis(2000),
        )
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result.unwrap_err(), CommandError::Timeout { timeout_ms: 2000 });
    assert!(elapsed >= Duration::from_millis(2000));
    assert!(elapsed < Duration::from_millis(2100), "took {elapsed:?}");
    assert_eq!(session.pending_requests(), 0);

    // The frame still went out.
    assert_eq!(peer.recv_frame().await.unwrap().event, "sendCommand");
}

// ── Handlers and subscribers ────────────────────────────────────────

#[tokio::test]
async fn test_handlers_fan_out_until_removed() {
    let (session, peer) = setup().await;
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();

    let first = {
        let seen = Arc::clone(&seen);
        session.on(EventKind::TelemetryUpdate, move |event| {
            seen.lock().unwrap().push(format!("first:{}", event.device_id().unwrap()));
        })
    };
    {
        let seen = Arc::clone(&seen);
        session.on(EventKind::TelemetryUpdate, move |event| {
            seen.lock().unwrap().push(format!("second:{}", event.device_id().unwrap()));
        });
    }
    {
        let seen = Arc::clone(&seen);
        session.on(EventKind::Alert, move |_| seen.lock().unwrap().push("alert".into()));
    }

    let mut events = session.subscribe();
    peer.send_event("update", json!({ "deviceId": "rack-1", "weight": 412.5 })).await;
    events.recv().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["first:rack-1", "second:rack-1"]);

    assert!(session.off(first));
    assert!(!session.off(first));

    peer.send_event("update", json!({ "deviceId": "rack-2", "weight": 0 })).await;
    events.recv().await.unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["first:rack-1", "second:rack-1", "second:rack-2"]
    );
}

#[tokio::test]
async fn test_garbage_and_unknown_frames_are_skipped() {
    let (session, peer) = setup().await;
    let mut events = session.subscribe();

    peer.send_text("not json").await;
    peer.send_event("firmwareGossip", json!({ "anything": true })).await;
    peer.send_event("deviceStatus", json!({ "deviceId": "rack-1" })).await;
    peer.send_event("deviceStatus", json!({ "deviceId": "rack-1", "isOnline": false })).await;

    let event = events.recv().await.unwrap();
    let InboundEvent::DeviceStatus(status) = event.as_ref() else {
        panic!("expected deviceStatus, got {event:?}");
    };
    assert!(!status.is_online);
    assert!(session.current_state().is_ready());
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_close_fails_pending_requests() {
    let (session, mut peer) = setup().await;

    let waiting = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .send_command_await(&tare("rack-1"), EventKind::CommandResponse, Duration::from_secs(60))
                .await
        })
    };
    until_pending(&session, 1).await;

    session.close().await;

    assert_eq!(waiting.await.unwrap().unwrap_err(), CommandError::SessionClosed);
    assert_eq!(
        session.current_state(),
        SessionState::Disconnected(Some(DisconnectReason::Closed))
    );
    assert!(matches!(
        session.send_command(&tare("rack-1")),
        Err(CoreError::SessionClosed)
    ));
    assert_eq!(
        session
            .send_command_await(&tare("rack-1"), EventKind::CommandResponse, Duration::from_secs(1))
            .await
            .unwrap_err(),
        CommandError::SessionClosed
    );

    // Writer is gone, so the link drains and ends.
    while peer.recv().await.is_some() {}
}

#[tokio::test]
async fn test_close_flushes_queued_commands() {
    let (session, mut peer) = setup().await;

    session.send_command(&tare("rack-1")).unwrap();
    session.send_command(&RackCommand::Restart.envelope("rack-1")).unwrap();
    session.close().await;

    assert_eq!(peer.recv_frame().await.unwrap().data["command"], "tare");
    assert_eq!(peer.recv_frame().await.unwrap().data["command"], "restart");
    assert!(peer.recv().await.is_none());
}

#[tokio::test]
async fn test_session_is_single_use() {
    let (session, _peer) = setup().await;
    session.close().await;

    let (link, _other) = BusLink::pair(4);
    assert!(matches!(
        session.connect_link(link, &token()).await,
        Err(CoreError::SessionSpent)
    ));
}

#[tokio::test]
async fn test_dropped_link_is_reported_as_lost() {
    let (session, peer) = setup().await;
    let mut state = session.state();

    drop(peer);

    let terminal = state.wait_for(SessionState::is_terminated).await.unwrap().clone();
    assert!(matches!(
        terminal,
        SessionState::Disconnected(Some(DisconnectReason::LinkLost(_)))
    ));
}

#[tokio::test]
async fn test_refused_authentication() {
    let (link, mut peer) = BusLink::pair(8);
    let session = RealtimeSession::default();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_link(link, &token()).await })
    };
    peer.recv_frame().await.unwrap();
    peer.send_event("unauthorized", json!({ "message": "unknown user" })).await;

    let err = connecting.await.unwrap().unwrap_err();
    assert!(
        matches!(&err, CoreError::AuthenticationFailed { message } if message == "unknown user"),
        "got {err:?}"
    );
    assert!(matches!(
        session.current_state(),
        SessionState::Disconnected(Some(DisconnectReason::AuthFailed(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_silent_bus_fails_authentication() {
    let (link, mut peer) = BusLink::pair(8);
    let session = RealtimeSession::new(SessionConfig {
        auth_timeout: Duration::from_millis(500),
        ..test_config()
    });

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_link(link, &token()).await })
    };
    peer.recv_frame().await.unwrap();

    let err = connecting.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::AuthenticationFailed { .. }), "got {err:?}");
    assert!(session.current_state().is_terminated());
}

// ── Real WebSocket ──────────────────────────────────────────────────

/// Minimal bus: accepts `authenticate`, then answers every `sendCommand`
/// with a positive `commandResponse`.
async fn spawn_bus() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let frame = RawFrame::decode(text.as_str()).unwrap();
            let reply = match frame.event.as_str() {
                "authenticate" => RawFrame::new("authenticated", json!({})),
                "sendCommand" => RawFrame::new(
                    "commandResponse",
                    json!({
                        "deviceId": frame.data["deviceId"],
                        "command": frame.data["command"],
                        "success": true
                    }),
                ),
                _ => continue,
            };
            ws.send(Message::text(reply.encode().unwrap())).await.unwrap();
        }
    });

    Url::parse(&format!("ws://{addr}/")).unwrap()
}

#[tokio::test]
async fn test_connect_over_websocket() {
    let url = spawn_bus().await;
    let session = RealtimeSession::default();

    session.connect(&url, &token()).await.unwrap();
    assert!(session.current_state().is_ready());

    let ack = session
        .send_command_await(
            &RackCommand::Identify.envelope("rack-9"),
            RackCommand::Identify.expected_ack("rack-9"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(ack.kind(), EventKind::CommandResponse);

    session.close().await;
}

#[tokio::test]
async fn test_connect_refused() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = Url::parse(&format!("ws://127.0.0.1:{port}/")).unwrap();
    let session = RealtimeSession::default();

    let err = session.connect(&url, &token()).await.unwrap_err();
    assert!(matches!(err, CoreError::ConnectionFailed { .. }), "got {err:?}");
    assert!(matches!(
        session.current_state(),
        SessionState::Disconnected(Some(DisconnectReason::ConnectFailed(_)))
    ));
}
