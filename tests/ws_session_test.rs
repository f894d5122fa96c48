//! Live session integration tests
//!
//! Drives `ChatConnection` against an in-process WebSocket server and
//! asserts on the published session events, the outbound frame shape,
//! and the reconnection bounds.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use chatwire::session::{
    ChatConnection, ChatRole, CloseReason, Endpoint, MessageId, ReconnectPolicy, ServerEvent,
    SessionEvent, Timeline,
};

use common::{accept_ws, bind_server, close_with, recv_close, recv_event, recv_text, send_json};

/// Short delays so reconnect tests run quickly.
fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        delay: Duration::from_millis(50),
    }
}

/// The session URL carries the chat id and token, and the server's
/// `connected` ack surfaces as an `Open` event.
#[tokio::test]
async fn test_connect_surfaces_session_ack() {
    let (listener, base) = bind_server().await;
    let endpoint = Endpoint::new(&base, "tok-1").unwrap();

    let server = tokio::spawn(async move {
        let (mut ws, uri) = accept_ws(&listener).await;
        assert_eq!(uri, "/ws/7?token=tok-1");
        send_json(&mut ws, json!({"type": "connected", "chat_id": 7})).await;

        let frame = recv_close(&mut ws).await;
        assert_eq!(frame.expect("expected a close frame").code, CloseCode::Normal);
    });

    let (connection, mut events) = ChatConnection::connect(&endpoint.session_url(7), fast_policy(3))
        .await
        .unwrap();
    assert!(connection.is_connected());

    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Open { chat_id: 7 }
    );

    connection.disconnect();
    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Closed {
            reason: CloseReason::Local
        }
    );
    assert!(!connection.is_connected());

    server.await.unwrap();
}

/// Outbound user messages serialize as a tagged `user_message` frame.
#[tokio::test]
async fn test_send_produces_user_message_frame() {
    let (listener, base) = bind_server().await;
    let endpoint = Endpoint::new(&base, "tok-1").unwrap();

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_ws(&listener).await;
        let raw = recv_text(&mut ws).await;
        let frame: serde_json::Value = serde_json::from_str(&raw).expect("invalid outbound JSON");
        assert_eq!(frame, json!({"type": "user_message", "message": "hi there"}));
        send_json(&mut ws, json!({"type": "message_received", "message": "hi there"})).await;

        let _ = recv_close(&mut ws).await;
    });

    let (connection, mut events) = ChatConnection::connect(&endpoint.session_url(1), fast_policy(3))
        .await
        .unwrap();

    connection.send("hi there").unwrap();
    // The echo confirms the frame arrived before we tear down.
    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Protocol(ServerEvent::MessageReceived {
            message: "hi there".to_string()
        })
    );
    connection.disconnect();
    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Closed {
            reason: CloseReason::Local
        }
    );

    server.await.unwrap();
}

/// A full assistant turn flows through the event stream and reduces to
/// the expected timeline.
#[tokio::test]
async fn test_assistant_turn_reaches_timeline() {
    let (listener, base) = bind_server().await;
    let endpoint = Endpoint::new(&base, "tok-1").unwrap();

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_ws(&listener).await;
        send_json(&mut ws, json!({"type": "connected", "chat_id": 3})).await;

        let raw = recv_text(&mut ws).await;
        let frame: serde_json::Value = serde_json::from_str(&raw).expect("invalid outbound JSON");
        assert_eq!(frame["message"], "hi");

        send_json(&mut ws, json!({"type": "message_received", "message": "hi"})).await;
        send_json(&mut ws, json!({"type": "ai_thinking", "message": "..."})).await;
        send_json(
            &mut ws,
            json!({"type": "ai_streaming", "partial_message": "Hel", "is_complete": false}),
        )
        .await;
        send_json(
            &mut ws,
            json!({"type": "ai_streaming", "partial_message": "Hello", "is_complete": false}),
        )
        .await;
        send_json(
            &mut ws,
            json!({"type": "ai_response", "message": "Hello!", "message_id": 7}),
        )
        .await;

        let _ = recv_close(&mut ws).await;
    });

    let (connection, mut events) = ChatConnection::connect(&endpoint.session_url(3), fast_policy(3))
        .await
        .unwrap();

    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Open { chat_id: 3 }
    );
    connection.send("hi").unwrap();

    let mut timeline = Timeline::new();
    loop {
        match recv_event(&mut events).await {
            SessionEvent::Protocol(event) => {
                let done = matches!(event, ServerEvent::AiResponse { .. });
                timeline.apply(&event);
                if done {
                    break;
                }
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    let messages = timeline.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert_eq!(messages[0].content, "hi");
    assert_eq!(messages[1].id, MessageId::Confirmed(7));
    assert_eq!(messages[1].content, "Hello!");
    assert!(messages.iter().all(|m| m.transient.is_none()));

    connection.disconnect();
    server.await.unwrap();
}

/// A normal server-side closure ends the session without reconnecting.
#[tokio::test]
async fn test_normal_close_ends_session() {
    let (listener, base) = bind_server().await;
    let endpoint = Endpoint::new(&base, "tok-1").unwrap();

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_ws(&listener).await;
        close_with(&mut ws, 1000).await;
    });

    let (connection, mut events) = ChatConnection::connect(&endpoint.session_url(1), fast_policy(3))
        .await
        .unwrap();

    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Closed {
            reason: CloseReason::Remote
        }
    );
    assert!(!connection.is_connected());

    // No further events after the final close.
    let trailing = tokio::time::timeout(Duration::from_millis(500), events.recv())
        .await
        .expect("event stream should have ended");
    assert!(trailing.is_none());

    server.await.unwrap();
}

/// Sending after the session ended reports no-connection and leaves
/// the timeline untouched.
#[tokio::test]
async fn test_send_without_connection_is_an_error() {
    let (listener, base) = bind_server().await;
    let endpoint = Endpoint::new(&base, "tok-1").unwrap();

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_ws(&listener).await;
        close_with(&mut ws, 1000).await;
    });

    let (connection, mut events) = ChatConnection::connect(&endpoint.session_url(1), fast_policy(3))
        .await
        .unwrap();
    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Closed {
            reason: CloseReason::Remote
        }
    );

    let timeline = Timeline::new();
    let err = connection.send("hi").unwrap_err();
    assert!(format!("{}", err).contains("No connection"));
    assert!(timeline.is_empty());

    server.await.unwrap();
}

/// After an abnormal closure the manager retries up to the configured
/// bound, then gives up for good.
#[tokio::test]
async fn test_reconnect_bound_is_respected() {
    let (listener, base) = bind_server().await;
    let endpoint = Endpoint::new(&base, "tok-1").unwrap();

    let server = tokio::spawn(async move {
        // First connection upgrades, then closes abnormally.
        let (mut ws, _) = accept_ws(&listener).await;
        close_with(&mut ws, 4000).await;
        drop(ws);

        // Refuse every retry by dropping the raw connection before the
        // upgrade; each refusal counts as one failed attempt.
        for _ in 0..3 {
            let (stream, _) = listener.accept().await.expect("expected a retry");
            drop(stream);
        }
    });

    let (_connection, mut events) =
        ChatConnection::connect(&endpoint.session_url(1), fast_policy(3))
            .await
            .unwrap();

    let mut reconnects = Vec::new();
    let reason = loop {
        match recv_event(&mut events).await {
            SessionEvent::Reconnecting { attempt } => reconnects.push(attempt),
            SessionEvent::TransportError { .. } => {}
            SessionEvent::Closed { reason } => break reason,
            other => panic!("unexpected event: {:?}", other),
        }
    };

    assert_eq!(reconnects, vec![1, 2, 3]);
    assert_eq!(reason, CloseReason::Exhausted);

    let trailing = tokio::time::timeout(Duration::from_millis(500), events.recv())
        .await
        .expect("event stream should have ended");
    assert!(trailing.is_none());

    server.await.unwrap();
}

/// An abnormal closure heals through a successful reconnect and the
/// replacement socket carries the session from there on.
#[tokio::test]
async fn test_abnormal_close_recovers_on_retry() {
    let (listener, base) = bind_server().await;
    let endpoint = Endpoint::new(&base, "tok-1").unwrap();

    let server = tokio::spawn(async move {
        let (mut first, _) = accept_ws(&listener).await;
        send_json(&mut first, json!({"type": "connected", "chat_id": 4})).await;
        close_with(&mut first, 4000).await;
        drop(first);

        let (mut second, _) = accept_ws(&listener).await;
        send_json(&mut second, json!({"type": "connected", "chat_id": 4})).await;

        let raw = recv_text(&mut second).await;
        let frame: serde_json::Value = serde_json::from_str(&raw).expect("invalid outbound JSON");
        assert_eq!(frame["message"], "after the drop");
        send_json(
            &mut second,
            json!({"type": "message_received", "message": "after the drop"}),
        )
        .await;

        let _ = recv_close(&mut second).await;
    });

    let (connection, mut events) = ChatConnection::connect(&endpoint.session_url(4), fast_policy(3))
        .await
        .unwrap();

    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Open { chat_id: 4 }
    );
    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Reconnecting { attempt: 1 }
    );
    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Open { chat_id: 4 }
    );

    connection.send("after the drop").unwrap();
    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Protocol(ServerEvent::MessageReceived {
            message: "after the drop".to_string()
        })
    );
    connection.disconnect();
    assert_eq!(
        recv_event(&mut events).await,
        SessionEvent::Closed {
            reason: CloseReason::Local
        }
    );

    server.await.unwrap();
}
