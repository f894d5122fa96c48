//! REST client for the chat backend
//!
//! Covers the HTTP surface that surrounds the live session:
//! authentication, profile lookup, chat lifecycle management, and
//! transcript history. Authenticated endpoints carry a bearer token;
//! a 401 anywhere maps to an authentication error so callers can ask
//! for a fresh login.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatwireError, Result};

/// Bearer token returned by the sign-in endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Profile fields reported by the user endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
}

/// One chat as returned by the chat index endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSummary {
    pub id: i64,
    pub name: String,
}

/// One persisted transcript row
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    #[serde(deserialize_with = "row_id")]
    pub id: i64,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

// Row ids arrive as JSON numbers or numeric strings depending on the
// server build; accept both forms.
fn row_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RowId {
        Number(i64),
        Text(String),
    }

    match RowId::deserialize(deserializer)? {
        RowId::Number(n) => Ok(n),
        RowId::Text(s) => s.parse::<i64>().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateChatRequest<'a> {
    name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateChatResponse {
    chat_id: i64,
}

/// HTTP client for the chat backend's REST endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for the given server
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server base URL, with or without a trailing slash
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatwireError::Api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach the bearer token used by authenticated endpoints
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Exchange credentials for a bearer token
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let response = self
            .client
            .post(self.url("/auth/sign_in"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| ChatwireError::Api(format!("Sign in request failed: {}", e)))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(
                ChatwireError::Authentication("Invalid username or password".to_string()).into(),
            );
        }
        if !response.status().is_success() {
            return Err(unexpected_status(response, "Sign in").await);
        }

        response
            .json()
            .await
            .map_err(|e| ChatwireError::Api(format!("Malformed sign in response: {}", e)).into())
    }

    /// Create a new account
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(&RegisterRequest { username, password })
            .send()
            .await
            .map_err(|e| ChatwireError::Api(format!("Register request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unexpected_status(response, "Registration").await);
        }
        Ok(())
    }

    /// Fetch the signed-in user's profile
    pub async fn me(&self) -> Result<UserProfile> {
        let token = self.require_token()?;
        let response = self
            .client
            .get(self.url("/user/me"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ChatwireError::Api(format!("Profile request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unexpected_status(response, "Profile lookup").await);
        }

        response
            .json()
            .await
            .map_err(|e| ChatwireError::Api(format!("Malformed profile response: {}", e)).into())
    }

    /// List the user's chats
    ///
    /// The server answers 404 when the user has no chats yet; that is
    /// an empty list, not an error.
    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let token = self.require_token()?;
        let response = self
            .client
            .get(self.url("/chat/my"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ChatwireError::Api(format!("Chat listing request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Server reports no chats for this user");
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(unexpected_status(response, "Chat listing").await);
        }

        response
            .json()
            .await
            .map_err(|e| ChatwireError::Api(format!("Malformed chat list: {}", e)).into())
    }

    /// Fetch the persisted transcript of one chat, oldest first
    pub async fn history(&self, chat_id: i64) -> Result<Vec<HistoryMessage>> {
        let token = self.require_token()?;
        let response = self
            .client
            .get(self.url(&format!("/chat/{}/history", chat_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ChatwireError::Api(format!("History request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unexpected_status(response, "History fetch").await);
        }

        response
            .json()
            .await
            .map_err(|e| ChatwireError::Api(format!("Malformed history response: {}", e)).into())
    }

    /// Create a chat over REST and return its id
    pub async fn create_chat(&self, name: Option<&str>) -> Result<i64> {
        let token = self.require_token()?;
        let response = self
            .client
            .post(self.url("/chat/new_chat"))
            .bearer_auth(token)
            .json(&CreateChatRequest { name })
            .send()
            .await
            .map_err(|e| ChatwireError::Api(format!("Chat creation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unexpected_status(response, "Chat creation").await);
        }

        let created: CreateChatResponse = response
            .json()
            .await
            .map_err(|e| ChatwireError::Api(format!("Malformed chat creation response: {}", e)))?;
        Ok(created.chat_id)
    }

    /// Rename a chat
    pub async fn rename_chat(&self, chat_id: i64, new_name: &str) -> Result<()> {
        let token = self.require_token()?;
        let response = self
            .client
            .patch(self.url(&format!("/chat/rename_chat/{}", chat_id)))
            .query(&[("new_name", new_name)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ChatwireError::Api(format!("Rename request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unexpected_status(response, "Rename").await);
        }
        Ok(())
    }

    /// Delete a chat and its messages
    pub async fn delete_chat(&self, chat_id: i64) -> Result<()> {
        let token = self.require_token()?;
        let response = self
            .client
            .delete(self.url(&format!("/chat/delete_chat/{}", chat_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ChatwireError::Api(format!("Delete request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unexpected_status(response, "Delete").await);
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn require_token(&self) -> Result<&str> {
        match self.token.as_deref() {
            Some(token) => Ok(token),
            None => Err(ChatwireError::Authentication(
                "No bearer token configured; sign in first".to_string(),
            )
            .into()),
        }
    }
}

/// Map a non-success response onto the error taxonomy
async fn unexpected_status(response: reqwest::Response, context: &str) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        ChatwireError::Authentication(format!(
            "{} was rejected; your token may have expired",
            context
        ))
        .into()
    } else {
        ChatwireError::Api(format!(
            "{} failed with status {}: {}",
            context,
            status,
            body.trim()
        ))
        .into()
    }
}
