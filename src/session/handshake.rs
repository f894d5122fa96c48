//! One-shot chat creation over an ephemeral socket
//!
//! Opens a short-lived connection to the creation endpoint, waits for
//! the server to mint a chat id, and closes. The returned future
//! settles exactly once; callers that need retry fall back to the REST
//! creation path instead.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ChatwireError, Result};
use crate::session::protocol::ServerEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Create a new chat over the creation endpoint
///
/// # Arguments
///
/// * `url` - Resolved creation URL including the auth token
///
/// # Returns
///
/// Returns the new chat id, or an error if the socket fails or closes
/// before the server confirms the chat.
pub async fn create_chat(url: &str) -> Result<i64> {
    let (mut stream, _) = connect_async(url)
        .await
        .map_err(|e| ChatwireError::Handshake(format!("Failed to open creation socket: {}", e)))?;
    debug!("Creation handshake transport open");

    let result = await_chat_created(&mut stream).await;

    // The socket is single-use; close it whichever way this went.
    let close = WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }));
    let _ = stream.send(close).await;

    result
}

async fn await_chat_created(stream: &mut WsStream) -> Result<i64> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                Ok(ServerEvent::ChatCreated { chat_id }) => {
                    info!("Chat {} created over the socket", chat_id);
                    return Ok(chat_id);
                }
                Ok(ServerEvent::Error { message }) => {
                    return Err(ChatwireError::Handshake(
                        message.unwrap_or_else(|| "Server rejected chat creation".to_string()),
                    )
                    .into());
                }
                Ok(other) => {
                    debug!("Ignoring {:?} while waiting for the chat id", other);
                }
                Err(e) => {
                    warn!("Dropping unparseable frame: {}", e);
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(
                    ChatwireError::Handshake(format!("Creation socket failed: {}", e)).into(),
                );
            }
        }
    }

    Err(ChatwireError::Handshake("Creation socket closed before a chat id arrived".to_string()).into())
}
