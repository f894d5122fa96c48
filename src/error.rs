//! Error types for Chatwire
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Chatwire operations
///
/// This enum encompasses all possible errors that can occur while talking
/// to the chat backend: configuration loading, REST calls, authentication,
/// and the live WebSocket session.
#[derive(Error, Debug)]
pub enum ChatwireError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// REST API errors (unexpected status, bad payload)
    #[error("API error: {0}")]
    Api(String),

    /// Authentication errors (401 responses, missing token)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// WebSocket connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// A send was attempted while no connection is open
    #[error("No connection to the chat server; message was not sent")]
    NotConnected,

    /// Chat creation handshake was rejected before a chat id arrived
    #[error("Chat creation failed: {0}")]
    Handshake(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket transport errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type alias for Chatwire operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
