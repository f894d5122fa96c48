//! Chatwire - Terminal client for AI chat backends
//!
#![doc = "Chatwire - Terminal client for AI chat backends"]
#![doc = "Main entry point for the Chatwire application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatwire::cli::{ChatsCommand, Cli, Commands};
use chatwire::commands;
use chatwire::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Login { username, password } => {
            commands::auth::login(config, username, password).await?;
            Ok(())
        }
        Commands::Register { username, password } => {
            commands::auth::register(config, username, password).await?;
            Ok(())
        }
        Commands::Whoami => {
            commands::auth::whoami(config).await?;
            Ok(())
        }
        Commands::Chats { command } => match command {
            ChatsCommand::List => {
                commands::chats::list(config).await?;
                Ok(())
            }
            ChatsCommand::New { name } => {
                commands::chats::new(config, name).await?;
                Ok(())
            }
            ChatsCommand::Rename { id, name } => {
                commands::chats::rename(config, id, name).await?;
                Ok(())
            }
            ChatsCommand::Delete { id } => {
                commands::chats::delete(config, id).await?;
                Ok(())
            }
        },
        Commands::Chat { chat } => {
            tracing::info!("Starting interactive chat session");
            if let Some(id) = chat {
                tracing::debug!("Opening existing chat: {}", id);
            }

            // Delegate to the session handler
            // Moves `config` into the handler (match arms are exclusive)
            commands::chat::run_session(config, chat).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatwire=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
