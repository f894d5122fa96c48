//! Live WebSocket connection for a chat session
//!
//! [`ChatConnection`] owns exactly one socket at a time. The socket is
//! driven by a background io task that publishes [`SessionEvent`]s on a
//! channel; callers never touch the socket directly, so a stale handle
//! can never feed events into a newer session. Dropping the handle or
//! calling [`ChatConnection::disconnect`] tears the task down with a
//! normal close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ChatwireError, Result};
use crate::session::protocol::{ClientMessage, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Generic text surfaced for transport failures; details go to the log
const CONNECTIVITY_ERROR: &str = "Connection error occurred";

/// Events published by the io task of a [`ChatConnection`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The server acknowledged the session for the given chat
    Open { chat_id: i64 },

    /// A protocol event addressed to the timeline
    Protocol(ServerEvent),

    /// A transport-level failure; the session may still recover
    TransportError { message: String },

    /// An automatic reconnect attempt is about to run
    Reconnecting { attempt: u32 },

    /// The session is over; no further events will follow
    Closed { reason: CloseReason },
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The local side disconnected on purpose
    Local,

    /// The server closed the session with a normal code
    Remote,

    /// Abnormal closure and every reconnect attempt failed
    Exhausted,
}

/// Bounds for automatic reconnection after abnormal closures
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Maximum consecutive failed attempts before giving up
    pub max_attempts: u32,

    /// Fixed pause before each attempt
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Handle to a live chat session socket
///
/// Created by [`ChatConnection::connect`], which also returns the
/// receiving end of the session's event stream. The socket itself
/// lives in a spawned io task; this handle only carries the outbound
/// channel and the shutdown token.
pub struct ChatConnection {
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ChatConnection {
    /// Open a session socket and spawn its io task
    ///
    /// # Arguments
    ///
    /// * `url` - Resolved WebSocket URL including the auth token
    /// * `policy` - Reconnection bounds applied after abnormal closures
    ///
    /// # Returns
    ///
    /// Returns the connection handle and the session event stream, or
    /// an error when the initial connection cannot be established.
    /// Automatic reconnection only covers sessions that were
    /// established and then dropped.
    pub async fn connect(
        url: &str,
        policy: ReconnectPolicy,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let (stream, _) = connect_async(url).await.map_err(|e| {
            ChatwireError::Connection(format!("Failed to connect to chat server: {}", e))
        })?;
        debug!("WebSocket transport open");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        tokio::spawn(run_io(
            url.to_string(),
            policy,
            stream,
            outbound_rx,
            events_tx,
            Arc::clone(&connected),
            cancel.clone(),
        ));

        Ok((
            Self {
                outbound: outbound_tx,
                connected,
                cancel,
            },
            events_rx,
        ))
    }

    /// Send a user message over the session
    ///
    /// The message is dropped, not queued, when no connection is open.
    pub fn send(&self, text: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatwireError::NotConnected.into());
        }
        let frame =
            serde_json::to_string(&ClientMessage::user(text)).map_err(ChatwireError::Serialization)?;
        self.outbound
            .send(frame)
            .map_err(|_| ChatwireError::NotConnected)?;
        Ok(())
    }

    /// Close the session with a normal code; idempotent
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// True while the underlying socket is open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Drives one session socket until it closes for good
///
/// Entered with an open stream. Abnormal closures re-enter the outer
/// loop through the bounded reconnect path; every exit publishes a
/// final `Closed` event before the stream of events ends.
async fn run_io(
    url: String,
    policy: ReconnectPolicy,
    mut stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut attempts: u32 = 0;

    'lifecycle: loop {
        connected.store(true, Ordering::SeqCst);
        attempts = 0;
        let (mut writer, mut reader) = stream.split();
        let mut normal_close = false;

        'live: loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    close_local(&mut writer, &events, &connected).await;
                    return;
                }
                frame = outbound.recv() => {
                    match frame {
                        Some(text) => {
                            if let Err(e) = writer.send(WsMessage::Text(text)).await {
                                warn!("Failed to send message: {}", e);
                                let _ = events.send(SessionEvent::TransportError {
                                    message: CONNECTIVITY_ERROR.to_string(),
                                });
                            }
                        }
                        // Handle dropped; same as an explicit disconnect.
                        None => {
                            close_local(&mut writer, &events, &connected).await;
                            return;
                        }
                    }
                }
                frame = reader.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => dispatch_frame(&text, &events),
                        Some(Ok(WsMessage::Close(close_frame))) => {
                            normal_close = close_frame
                                .as_ref()
                                .map(|f| f.code == CloseCode::Normal)
                                .unwrap_or(false);
                            debug!("Server closed the session (normal: {})", normal_close);
                            break 'live;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket read error: {}", e);
                            let _ = events.send(SessionEvent::TransportError {
                                message: CONNECTIVITY_ERROR.to_string(),
                            });
                            break 'live;
                        }
                        None => {
                            debug!("WebSocket stream ended without a close frame");
                            break 'live;
                        }
                    }
                }
            }
        }

        connected.store(false, Ordering::SeqCst);

        if normal_close {
            let _ = events.send(SessionEvent::Closed {
                reason: CloseReason::Remote,
            });
            return;
        }

        // Abnormal closure. The counter only survives failed attempts;
        // a successful open resets it at the top of 'lifecycle.
        loop {
            if attempts >= policy.max_attempts {
                info!(
                    "Giving up after {} failed reconnect attempts",
                    policy.max_attempts
                );
                let _ = events.send(SessionEvent::Closed {
                    reason: CloseReason::Exhausted,
                });
                return;
            }
            attempts += 1;
            info!(
                "Reconnecting (attempt {}/{})",
                attempts, policy.max_attempts
            );
            let _ = events.send(SessionEvent::Reconnecting { attempt: attempts });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = events.send(SessionEvent::Closed {
                        reason: CloseReason::Local,
                    });
                    return;
                }
                _ = time::sleep(policy.delay) => {}
            }

            match connect_async(&url).await {
                Ok((reopened, _)) => {
                    info!("Session reconnected");
                    stream = reopened;
                    continue 'lifecycle;
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempts, e);
                    let _ = events.send(SessionEvent::TransportError {
                        message: CONNECTIVITY_ERROR.to_string(),
                    });
                }
            }
        }
    }
}

/// Send a normal close and publish the final local-close event
async fn close_local(
    writer: &mut SplitSink<WsStream, WsMessage>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    connected: &AtomicBool,
) {
    let close = WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }));
    if let Err(e) = writer.send(close).await {
        debug!("Close frame not delivered: {}", e);
    }
    connected.store(false, Ordering::SeqCst);
    let _ = events.send(SessionEvent::Closed {
        reason: CloseReason::Local,
    });
}

/// Parse one text frame and route it onto the event stream
///
/// Unparseable frames are logged and dropped; they are not a
/// user-facing condition.
fn dispatch_frame(text: &str, events: &mpsc::UnboundedSender<SessionEvent>) {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(ServerEvent::Connected { chat_id }) => {
            debug!("Session acknowledged for chat {}", chat_id);
            let _ = events.send(SessionEvent::Open { chat_id });
        }
        Ok(event) => {
            let _ = events.send(SessionEvent::Protocol(event));
        }
        Err(e) => {
            warn!("Dropping unparseable frame: {}", e);
        }
    }
}
