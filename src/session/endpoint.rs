//! WebSocket endpoint resolution
//!
//! Maps the configured HTTP base URL onto the two WebSocket endpoints
//! the server exposes: one for attaching to an existing chat and one
//! for creating a chat over the socket. The bearer token always rides
//! in the query string, percent-encoded.

use url::Url;

use crate::error::{ChatwireError, Result};

/// Resolves WebSocket URLs from a server base URL and bearer token
#[derive(Debug, Clone)]
pub struct Endpoint {
    base: Url,
    token: String,
}

impl Endpoint {
    /// Build a resolver from the HTTP(S) base URL and bearer token
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server base URL, `http://` or `https://`
    /// * `token` - Bearer token appended to every resolved URL
    ///
    /// # Returns
    ///
    /// Returns the resolver, or an error for unsupported schemes
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let ws_base = if base_url.starts_with("https://") {
            base_url.replacen("https://", "wss://", 1)
        } else if base_url.starts_with("http://") {
            base_url.replacen("http://", "ws://", 1)
        } else {
            return Err(ChatwireError::Config(format!(
                "Server URL must start with http:// or https://, got: {}",
                base_url
            ))
            .into());
        };

        let base = Url::parse(&ws_base)
            .map_err(|e| ChatwireError::Config(format!("Invalid server URL: {}", e)))?;

        Ok(Self {
            base,
            token: token.into(),
        })
    }

    /// URL for attaching a session to an existing chat
    pub fn session_url(&self, chat_id: i64) -> String {
        self.resolve(&format!("ws/{}", chat_id))
    }

    /// URL for creating a new chat over the socket
    pub fn creation_url(&self) -> String {
        self.resolve("ws/new")
    }

    fn resolve(&self, endpoint: &str) -> String {
        let mut url = self.base.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", prefix, endpoint));
        url.set_query(None);
        url.query_pairs_mut().append_pair("token", &self.token);
        url.to_string()
    }
}
