//! Wire protocol types for the chat WebSocket endpoint
//!
//! Every frame on the socket is a JSON object with a `type` field.
//! Inbound frames deserialize into [`ServerEvent`] and outbound frames
//! serialize from [`ClientMessage`]. Both enums are closed: a frame
//! whose `type` is not listed here fails to parse, and the connection
//! layer logs and drops it rather than guessing at a meaning.

use serde::{Deserialize, Serialize};

/// Frames the server sends over an established session
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Session acknowledgement sent right after the socket opens
    Connected {
        /// Id of the chat this session is attached to
        chat_id: i64,
    },

    /// Echo of a user message the server accepted
    MessageReceived {
        /// The accepted message text
        message: String,
    },

    /// The assistant has started working on a reply
    AiThinking {
        /// Placeholder text to show while waiting
        message: String,
    },

    /// A chunk of an assistant reply that streams in incrementally
    AiStreaming {
        /// Reply text accumulated so far
        partial_message: String,

        /// True on the last chunk of the reply
        #[serde(default)]
        is_complete: bool,
    },

    /// A complete assistant reply
    AiResponse {
        /// The full reply text
        message: String,

        /// Persistent id the server stored the reply under
        #[serde(default)]
        message_id: Option<i64>,

        /// Server-side timestamp of the reply
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Confirmation that a chat was created on the creation endpoint
    ChatCreated {
        /// Id of the newly created chat
        chat_id: i64,
    },

    /// Server-reported failure
    Error {
        /// Human-readable description, when the server provides one
        #[serde(default)]
        message: Option<String>,
    },
}

/// Frames the client sends over an established session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A user chat message
    UserMessage {
        /// The message text
        message: String,
    },
}

impl ClientMessage {
    /// Build a user message frame
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage {
            message: text.into(),
        }
    }
}
