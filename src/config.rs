//! Configuration management for Chatwire
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ChatwireError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Chatwire
///
/// Holds everything needed to reach the chat backend: the server address,
/// the live-connection behavior, and interactive session settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Live connection behavior
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Interactive chat session settings
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Backend server configuration
///
/// The base URL doubles as the resolution policy for the WebSocket
/// endpoints: development setups point at the local backend, deployments
/// point at the real host. The scheme (`http`/`https`) decides `ws`/`wss`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the chat backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for REST requests (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bearer token for authenticated calls (prefer CHATWIRE_TOKEN or --token)
    #[serde(default)]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            token: None,
        }
    }
}

/// Live connection behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Maximum reconnection attempts after an abnormal closure
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Delay between reconnection attempts (seconds)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_delay() -> u64 {
    2
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

/// Interactive chat session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// How long to wait on an in-progress assistant turn before surfacing
    /// a stalled-generation notice (seconds, 0 disables the watchdog)
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
}

fn default_stall_timeout() -> u64 {
    60
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: default_stall_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatwireError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatwireError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("CHATWIRE_SERVER_URL") {
            self.server.base_url = base_url;
        }

        if let Ok(attempts) = std::env::var("CHATWIRE_RECONNECT_ATTEMPTS") {
            if let Ok(value) = attempts.parse() {
                self.connection.max_reconnect_attempts = value;
            } else {
                tracing::warn!("Invalid CHATWIRE_RECONNECT_ATTEMPTS: {}", attempts);
            }
        }

        if let Ok(delay) = std::env::var("CHATWIRE_RECONNECT_DELAY") {
            if let Ok(value) = delay.parse() {
                self.connection.reconnect_delay_secs = value;
            } else {
                tracing::warn!("Invalid CHATWIRE_RECONNECT_DELAY: {}", delay);
            }
        }

        if let Ok(stall) = std::env::var("CHATWIRE_STALL_TIMEOUT") {
            if let Ok(value) = stall.parse() {
                self.chat.stall_timeout_secs = value;
            } else {
                tracing::warn!("Invalid CHATWIRE_STALL_TIMEOUT: {}", stall);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(server) = &cli.server {
            self.server.base_url = server.clone();
        }

        if let Some(token) = &cli.token {
            self.server.token = Some(token.clone());
        }

        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Returns
    ///
    /// Returns Ok if configuration is valid
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.is_empty() {
            return Err(ChatwireError::Config("server.base_url cannot be empty".to_string()).into());
        }

        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            return Err(ChatwireError::Config(format!(
                "server.base_url must start with http:// or https://, got: {}",
                self.server.base_url
            ))
            .into());
        }

        if self.server.request_timeout_secs == 0 {
            return Err(ChatwireError::Config(
                "server.request_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.connection.max_reconnect_attempts > 10 {
            return Err(ChatwireError::Config(
                "connection.max_reconnect_attempts must be 10 or fewer".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// The bearer token, if one was supplied via config, env, or CLI
    pub fn token(&self) -> Option<&str> {
        self.server.token.as_deref()
    }
}
