//! Shared helpers for session integration tests
//!
//! Provides a small in-process WebSocket server whose per-connection
//! behavior is scripted by each test, plus timeout-wrapped reads so a
//! wedged test fails instead of hanging.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use chatwire::session::SessionEvent;

pub type ServerWs = WebSocketStream<TcpStream>;

/// Bind a listener on an ephemeral port and return its HTTP base URL.
#[allow(dead_code)]
pub async fn bind_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no local addr");
    (listener, format!("http://{}", addr))
}

/// Accept one connection, upgrade it, and return the requested URI.
#[allow(dead_code)]
pub async fn accept_ws(listener: &TcpListener) -> (ServerWs, String) {
    let (stream, _) = listener
        .accept()
        .await
        .expect("failed to accept connection");

    let (uri_tx, mut uri_rx) = mpsc::unbounded_channel();
    let ws = accept_hdr_async(
        stream,
        move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(request.uri().to_string());
            Ok(response)
        },
    )
    .await
    .expect("websocket upgrade failed");

    let uri = uri_rx.try_recv().expect("upgrade callback did not run");
    (ws, uri)
}

/// Send one JSON value as a text frame.
#[allow(dead_code)]
pub async fn send_json(ws: &mut ServerWs, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string()))
        .await
        .expect("failed to send frame");
}

/// Read the next text frame, skipping control frames.
#[allow(dead_code)]
pub async fn recv_text(ws: &mut ServerWs) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed early")
            .expect("websocket read error");
        match frame {
            Message::Text(text) => return text,
            Message::Close(_) => panic!("connection closed while waiting for a text frame"),
            _ => continue,
        }
    }
}

/// Wait for the peer's close frame, if any.
#[allow(dead_code)]
pub async fn recv_close(ws: &mut ServerWs) -> Option<CloseFrame<'static>> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a close frame");
        match frame {
            Some(Ok(Message::Close(close_frame))) => {
                return close_frame.map(|f| f.into_owned());
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

/// Close the connection with the given code and drain the ack.
#[allow(dead_code)]
pub async fn close_with(ws: &mut ServerWs, code: u16) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    };
    let _ = ws.send(Message::Close(Some(frame))).await;
    let _ = tokio::time::timeout(Duration::from_millis(500), async {
        while let Some(frame) = ws.next().await {
            if frame.is_err() {
                break;
            }
        }
    })
    .await;
}

/// Read one session event, failing the test on a stalled stream.
#[allow(dead_code)]
pub async fn recv_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event stream ended early")
}

/// Write a throwaway config file; the TempDir keeps it alive.
#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
