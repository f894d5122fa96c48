//! Command-line interface definition for Chatwire
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for authentication, chat management, and the
//! interactive chat session.

use clap::{Parser, Subcommand};

/// Chatwire - Terminal client for AI chat backends
///
/// Talk to a chat backend from the terminal: live sessions with
/// streaming assistant replies, plus account and chat management.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatwire")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Backend server base URL (overrides config)
    #[arg(long)]
    pub server: Option<String>,

    /// Bearer token for authenticated commands (overrides config)
    #[arg(long, env = "CHATWIRE_TOKEN")]
    pub token: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Chatwire
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in and print a bearer token
    Login {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Account password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create a new account
    Register {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Account password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show the signed-in user's profile
    Whoami,

    /// Manage chats
    Chats {
        /// Chat management subcommand
        #[command(subcommand)]
        command: ChatsCommand,
    },

    /// Start an interactive chat session
    Chat {
        /// Chat id to open (a new chat is created when omitted)
        #[arg(long)]
        chat: Option<i64>,
    },
}

/// Chat management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ChatsCommand {
    /// List your chats
    List,

    /// Create a new chat
    New {
        /// Chat name (the server assigns a default when omitted)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Rename a chat
    Rename {
        /// Chat id
        id: i64,

        /// New chat name
        name: String,
    },

    /// Delete a chat
    Delete {
        /// Chat id
        id: i64,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            server: None,
            token: None,
            command: Commands::Whoami,
        }
    }
}
