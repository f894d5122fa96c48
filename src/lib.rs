//! Chatwire - Terminal client for AI chat backends
//!
//! This library provides the core functionality for the Chatwire client,
//! including the live session layer, the message timeline, the REST
//! client, and configuration.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Live WebSocket session, event stream, timeline reducer,
//!   endpoint resolution, and the chat creation handshake
//! - `api`: REST client for authentication, chats, and history
//! - `commands`: CLI command handlers built on the modules above
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use chatwire::session::{ChatConnection, Endpoint, ReconnectPolicy, Timeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let endpoint = Endpoint::new("http://localhost:8000", "token")?;
//!     let mut timeline = Timeline::new();
//!
//!     let (connection, mut events) =
//!         ChatConnection::connect(&endpoint.session_url(1), ReconnectPolicy::default()).await?;
//!     connection.send("hello")?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let chatwire::session::SessionEvent::Protocol(server_event) = event {
//!             timeline.apply(&server_event);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use api::ApiClient;
pub use config::Config;
pub use error::{ChatwireError, Result};
pub use session::{ChatConnection, Endpoint, SessionEvent, Timeline};
