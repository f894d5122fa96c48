/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `auth`  — Login, registration, and profile commands
- `chats` — Chat lifecycle management (list, new, rename, delete)
- `chat`  — Interactive chat session

These handlers are intentionally small and use the library components:
the REST client and the session layer.
*/

use std::time::Duration;

use colored::Colorize;
use tokio::time;
use tracing::warn;

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{ChatwireError, Result};
use crate::session::handshake;
use crate::session::Endpoint;

/// Build a REST client from the active configuration
fn api_client(config: &Config) -> Result<ApiClient> {
    let timeout = Duration::from_secs(config.server.request_timeout_secs);
    let client = ApiClient::new(&config.server.base_url, timeout)?;
    Ok(match config.token() {
        Some(token) => client.with_token(token),
        None => client,
    })
}

/// Create a chat, preferring the socket handshake over REST
///
/// The handshake is an optimization that also pre-warms the live
/// connection path; any handshake failure falls back to the REST
/// creation endpoint. Only a REST failure is terminal.
async fn create_chat_with_fallback(config: &Config, client: &ApiClient) -> Result<i64> {
    if let Some(token) = config.token() {
        let endpoint = Endpoint::new(&config.server.base_url, token)?;
        let limit = Duration::from_secs(config.server.request_timeout_secs);
        match time::timeout(limit, handshake::create_chat(&endpoint.creation_url())).await {
            Ok(Ok(chat_id)) => return Ok(chat_id),
            Ok(Err(e)) => warn!("Creation handshake failed, falling back to REST: {}", e),
            Err(_) => warn!("Creation handshake timed out, falling back to REST"),
        }
    }
    client.create_chat(None).await
}

/// Use the given password or ask for one interactively
fn resolve_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let entered = rl.readline("Password: ")?;
    let entered = entered.trim().to_string();
    if entered.is_empty() {
        return Err(ChatwireError::Authentication("Password must not be empty".to_string()).into());
    }
    Ok(entered)
}

// Login, registration, and profile commands
pub mod auth {
    //! Account commands against the REST authentication endpoints.

    use super::*;

    /// Sign in and print the bearer token
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `username` - Account username
    /// * `password` - Account password; prompted for when absent
    pub async fn login(config: Config, username: String, password: Option<String>) -> Result<()> {
        tracing::info!("Signing in as {}", username);

        let password = resolve_password(password)?;
        let client = api_client(&config)?;
        let token = client.sign_in(&username, &password).await?;

        println!("\n{}", "Signed in successfully".green());
        println!("Token: {}", token.access_token);
        println!("\nExport it for later commands:");
        println!("  export CHATWIRE_TOKEN={}\n", token.access_token);
        Ok(())
    }

    /// Create a new account
    pub async fn register(
        config: Config,
        username: String,
        password: Option<String>,
    ) -> Result<()> {
        tracing::info!("Registering account {}", username);

        let password = resolve_password(password)?;
        let client = api_client(&config)?;
        client.register(&username, &password).await?;

        println!(
            "\n{}\n",
            "Account created. Sign in with 'chatwire login'".green()
        );
        Ok(())
    }

    /// Show the signed-in user's profile
    pub async fn whoami(config: Config) -> Result<()> {
        let client = api_client(&config)?;
        let profile = client.me().await?;

        println!("\nUsername: {}", profile.username);
        if let Some(id) = profile.id {
            println!("User id:  {}", id);
        }
        println!();
        Ok(())
    }
}

// Chat lifecycle management commands
pub mod chats {
    //! Chat management against the REST chat endpoints.

    use super::*;
    use prettytable::{cell, row, Table};

    /// List the user's chats in a table
    pub async fn list(config: Config) -> Result<()> {
        let client = api_client(&config)?;
        let chats = client.list_chats().await?;

        if chats.is_empty() {
            println!("\nNo chats yet. Start one with 'chatwire chat'.\n");
            return Ok(());
        }

        let mut table = Table::new();
        table.add_row(row!["Id", "Name"]);
        for chat in &chats {
            table.add_row(row![chat.id, chat.name]);
        }

        println!("\nYour chats:\n");
        table.printstd();
        println!();
        Ok(())
    }

    /// Create a chat, renaming it when a name was given
    pub async fn new(config: Config, name: Option<String>) -> Result<()> {
        let client = api_client(&config)?;
        let chat_id = create_chat_with_fallback(&config, &client).await?;

        if let Some(name) = &name {
            client.rename_chat(chat_id, name).await?;
        }

        match name {
            Some(name) => println!("\nCreated chat {} ({})\n", chat_id, name),
            None => println!("\nCreated chat {}\n", chat_id),
        }
        Ok(())
    }

    /// Rename a chat
    pub async fn rename(config: Config, id: i64, name: String) -> Result<()> {
        let client = api_client(&config)?;
        client.rename_chat(id, &name).await?;
        println!("\nRenamed chat {} to '{}'\n", id, name);
        Ok(())
    }

    /// Delete a chat and its messages
    pub async fn delete(config: Config, id: i64) -> Result<()> {
        let client = api_client(&config)?;
        client.delete_chat(id).await?;
        println!("\nDeleted chat {}\n", id);
        Ok(())
    }
}

// Interactive chat session handler
pub mod chat {
    //! Interactive chat session.
    //!
    //! Seeds the timeline from REST history, opens the live socket, and
    //! runs a readline loop. Each submitted line goes out over the
    //! session; inbound events fold into the timeline and render until
    //! the assistant's turn settles.

    use std::io::Write;

    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;
    use crate::api::HistoryMessage;
    use crate::session::{
        ChatConnection, ChatRole, CloseReason, Message, MessageId, ReconnectPolicy, ServerEvent,
        SessionEvent, Timeline,
    };

    /// What handling one session event means for the REPL loop
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum EventOutcome {
        /// Keep waiting for more events
        Continue,

        /// The assistant's turn settled; hand the prompt back
        TurnSettled,

        /// The session is over; leave the loop
        SessionOver,
    }

    /// Run an interactive session against one chat
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `chat` - Chat id to open; a new chat is created when absent
    pub async fn run_session(config: Config, chat: Option<i64>) -> Result<()> {
        let token = match config.token() {
            Some(token) => token.to_string(),
            None => {
                return Err(ChatwireError::Authentication(
                    "No bearer token configured; run 'chatwire login' or set CHATWIRE_TOKEN"
                        .to_string(),
                )
                .into());
            }
        };

        let client = api_client(&config)?;
        let endpoint = Endpoint::new(&config.server.base_url, &token)?;

        let chat_id = match chat {
            Some(id) => id,
            None => create_chat_with_fallback(&config, &client).await?,
        };

        let rows = client.history(chat_id).await?;
        let mut timeline =
            Timeline::from_history(rows.into_iter().map(history_message).collect());
        print_transcript(&timeline);

        let policy = reconnect_policy(&config);
        let (connection, mut events) =
            ChatConnection::connect(&endpoint.session_url(chat_id), policy).await?;

        print_welcome_banner(chat_id);

        let stall = stall_timeout(&config);
        let mut rl = DefaultEditor::new()?;

        loop {
            match rl.readline("you> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match trimmed {
                        "/help" => {
                            print_help();
                            continue;
                        }
                        "/status" => {
                            print_status(chat_id, &connection, &timeline);
                            continue;
                        }
                        "exit" | "quit" => break,
                        _ => {}
                    }

                    rl.add_history_entry(trimmed)?;

                    // Events that piled up while the prompt was idle
                    if !pump_pending(&mut events, &mut timeline) {
                        break;
                    }

                    if let Err(e) = connection.send(trimmed) {
                        eprintln!("{}", format!("Error: {}", e).red());
                        continue;
                    }

                    if !drain_turn(&mut events, &mut timeline, stall).await {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        connection.disconnect();
        println!("Goodbye!");
        Ok(())
    }

    /// Wait for session events until the assistant's turn settles
    ///
    /// Returns false when the session is over. A stall limit bounds the
    /// idle time between events, not the whole turn; streaming chunks
    /// keep the turn alive.
    async fn drain_turn(
        events: &mut mpsc::UnboundedReceiver<SessionEvent>,
        timeline: &mut Timeline,
        stall: Option<Duration>,
    ) -> bool {
        loop {
            let received = match stall {
                Some(limit) => match time::timeout(limit, events.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        println!(
                            "\n{}",
                            "No response from the assistant; the turn may be stuck. \
                             You can resend or check the server."
                                .yellow()
                        );
                        return true;
                    }
                },
                None => events.recv().await,
            };

            let Some(event) = received else {
                return false;
            };

            match apply_event(event, timeline) {
                EventOutcome::Continue => {}
                EventOutcome::TurnSettled => return true,
                EventOutcome::SessionOver => return false,
            }
        }
    }

    /// Drain already-queued events without blocking
    ///
    /// Returns false when the session is over.
    fn pump_pending(
        events: &mut mpsc::UnboundedReceiver<SessionEvent>,
        timeline: &mut Timeline,
    ) -> bool {
        loop {
            match events.try_recv() {
                Ok(event) => {
                    if apply_event(event, timeline) == EventOutcome::SessionOver {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Render one session event and fold it into the timeline
    fn apply_event(event: SessionEvent, timeline: &mut Timeline) -> EventOutcome {
        match event {
            SessionEvent::Open { chat_id } => {
                tracing::debug!("Session open for chat {}", chat_id);
                EventOutcome::Continue
            }
            SessionEvent::Protocol(server_event) => {
                render_event(&server_event);
                let settled = settles_turn(&server_event);
                timeline.apply(&server_event);
                if settled {
                    EventOutcome::TurnSettled
                } else {
                    EventOutcome::Continue
                }
            }
            SessionEvent::TransportError { message } => {
                eprintln!("{}", message.red());
                EventOutcome::Continue
            }
            SessionEvent::Reconnecting { attempt } => {
                println!("{}", format!("Reconnecting (attempt {})...", attempt).yellow());
                EventOutcome::Continue
            }
            SessionEvent::Closed { reason } => {
                render_close(&reason);
                EventOutcome::SessionOver
            }
        }
    }

    /// True when the event ends the assistant's turn
    ///
    /// A turn settles on a final response, on the last streaming chunk
    /// (streamed replies carry no trailing response frame), or on a
    /// server-reported error, after which no reply will come.
    fn settles_turn(event: &ServerEvent) -> bool {
        matches!(
            event,
            ServerEvent::AiResponse { .. }
                | ServerEvent::AiStreaming {
                    is_complete: true,
                    ..
                }
                | ServerEvent::Error { .. }
        )
    }

    /// Map one REST history row onto a timeline entry
    fn history_message(row: HistoryMessage) -> Message {
        let role = match row.role.as_str() {
            "user" => ChatRole::User,
            _ => ChatRole::Assistant,
        };
        Message::new(MessageId::Persisted(row.id), role, row.content).with_timestamp(row.timestamp)
    }

    fn reconnect_policy(config: &Config) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: config.connection.max_reconnect_attempts,
            delay: Duration::from_secs(config.connection.reconnect_delay_secs),
        }
    }

    /// Idle limit for an open turn; zero disables the watchdog
    fn stall_timeout(config: &Config) -> Option<Duration> {
        match config.chat.stall_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn render_event(event: &ServerEvent) {
        match event {
            ServerEvent::Connected { .. } | ServerEvent::ChatCreated { .. } => {}
            // The user just typed this line; no need to echo it again.
            ServerEvent::MessageReceived { .. } => {}
            ServerEvent::AiThinking { message } => {
                println!("{}", message.dimmed());
            }
            ServerEvent::AiStreaming {
                partial_message,
                is_complete,
            } => {
                print!("\rassistant> {}", partial_message);
                let _ = std::io::stdout().flush();
                if *is_complete {
                    println!("\n");
                }
            }
            ServerEvent::AiResponse { message, .. } => {
                println!("\rassistant> {}\n", message);
            }
            ServerEvent::Error { message } => {
                let text = message.as_deref().unwrap_or("The server reported an error");
                eprintln!("{}", text.red());
            }
        }
    }

    fn render_close(reason: &CloseReason) {
        match reason {
            CloseReason::Local => println!("{}", "Session closed".dimmed()),
            CloseReason::Remote => println!("{}", "The server ended the session".yellow()),
            CloseReason::Exhausted => println!(
                "{}",
                "Connection lost and could not be re-established".red()
            ),
        }
    }

    /// Print the persisted transcript loaded from history
    fn print_transcript(timeline: &Timeline) {
        if timeline.is_empty() {
            return;
        }
        println!();
        for message in timeline.messages() {
            let when = message
                .timestamp
                .as_deref()
                .and_then(format_timestamp)
                .map(|t| format!("[{}] ", t))
                .unwrap_or_default();
            match message.role {
                ChatRole::User => {
                    println!("{}{} {}", when.dimmed(), "you>".cyan(), message.content)
                }
                ChatRole::Assistant => {
                    println!("{}{} {}", when.dimmed(), "assistant>".green(), message.content)
                }
            }
        }
        println!();
    }

    /// Wall-clock prefix for a history row
    ///
    /// The server emits RFC 3339 timestamps or naive ISO timestamps
    /// depending on its build; naive times are shown as sent.
    fn format_timestamp(raw: &str) -> Option<String> {
        if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&chrono::Local).format("%H:%M").to_string());
        }
        raw.parse::<chrono::NaiveDateTime>()
            .ok()
            .map(|ts| ts.format("%H:%M").to_string())
    }

    /// Display welcome banner at the start of an interactive session
    fn print_welcome_banner(chat_id: i64) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                Chatwire Interactive Session                  ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Chat id: {}", chat_id);
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    fn print_status(chat_id: i64, connection: &ChatConnection, timeline: &Timeline) {
        println!("\nChat id:    {}", chat_id);
        println!("Connected:  {}", connection.is_connected());
        println!("Messages:   {}", timeline.len());
        println!();
    }

    fn print_help() {
        println!("\nAvailable commands:");
        println!("  /help    Show this help");
        println!("  /status  Show session status");
        println!("  exit     Leave the session");
        println!("\nAnything else is sent to the assistant.\n");
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_settles_turn_on_final_response() {
            assert!(settles_turn(&ServerEvent::AiResponse {
                message: "Hello!".to_string(),
                message_id: Some(7),
                timestamp: None,
            }));
        }

        #[test]
        fn test_settles_turn_on_completed_stream() {
            assert!(settles_turn(&ServerEvent::AiStreaming {
                partial_message: "Hello!".to_string(),
                is_complete: true,
            }));
        }

        #[test]
        fn test_settles_turn_on_server_error() {
            assert!(settles_turn(&ServerEvent::Error { message: None }));
        }

        #[test]
        fn test_turn_stays_open_while_in_progress() {
            assert!(!settles_turn(&ServerEvent::AiThinking {
                message: "...".to_string(),
            }));
            assert!(!settles_turn(&ServerEvent::AiStreaming {
                partial_message: "Hel".to_string(),
                is_complete: false,
            }));
            assert!(!settles_turn(&ServerEvent::MessageReceived {
                message: "hi".to_string(),
            }));
        }

        #[test]
        fn test_apply_event_settles_on_response() {
            let mut timeline = Timeline::new();
            let outcome = apply_event(
                SessionEvent::Protocol(ServerEvent::AiResponse {
                    message: "Hello!".to_string(),
                    message_id: Some(7),
                    timestamp: None,
                }),
                &mut timeline,
            );

            assert_eq!(outcome, EventOutcome::TurnSettled);
            assert_eq!(timeline.len(), 1);
            assert_eq!(timeline.messages()[0].id, MessageId::Confirmed(7));
        }

        #[test]
        fn test_apply_event_continues_through_reconnects() {
            let mut timeline = Timeline::new();
            let outcome = apply_event(SessionEvent::Reconnecting { attempt: 1 }, &mut timeline);

            assert_eq!(outcome, EventOutcome::Continue);
            assert!(timeline.is_empty());
        }

        #[test]
        fn test_apply_event_ends_session_on_close() {
            let mut timeline = Timeline::new();
            let outcome = apply_event(
                SessionEvent::Closed {
                    reason: CloseReason::Exhausted,
                },
                &mut timeline,
            );

            assert_eq!(outcome, EventOutcome::SessionOver);
        }

        #[test]
        fn test_history_message_maps_roles() {
            let user = history_message(HistoryMessage {
                id: 1,
                role: "user".to_string(),
                content: "hi".to_string(),
                timestamp: None,
            });
            assert_eq!(user.role, ChatRole::User);
            assert_eq!(user.id, MessageId::Persisted(1));

            let assistant = history_message(HistoryMessage {
                id: 2,
                role: "assistant".to_string(),
                content: "hello".to_string(),
                timestamp: Some("2024-01-01T00:00:00Z".to_string()),
            });
            assert_eq!(assistant.role, ChatRole::Assistant);
            assert_eq!(assistant.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        }

        #[test]
        fn test_history_message_unknown_role_is_assistant() {
            let row = history_message(HistoryMessage {
                id: 3,
                role: "system".to_string(),
                content: "note".to_string(),
                timestamp: None,
            });
            assert_eq!(row.role, ChatRole::Assistant);
        }

        #[test]
        fn test_format_timestamp_accepts_rfc3339() {
            assert!(format_timestamp("2024-01-01T12:30:00Z").is_some());
        }

        #[test]
        fn test_format_timestamp_accepts_naive_server_time() {
            assert_eq!(
                format_timestamp("2024-01-01T12:30:00"),
                Some("12:30".to_string())
            );
            assert_eq!(
                format_timestamp("2024-01-01T12:30:00.123456"),
                Some("12:30".to_string())
            );
        }

        #[test]
        fn test_format_timestamp_rejects_garbage() {
            assert_eq!(format_timestamp("yesterdayish"), None);
        }

        #[test]
        fn test_stall_timeout_zero_disables_watchdog() {
            let mut config = Config::default();
            config.chat.stall_timeout_secs = 0;
            assert_eq!(stall_timeout(&config), None);

            config.chat.stall_timeout_secs = 45;
            assert_eq!(stall_timeout(&config), Some(Duration::from_secs(45)));
        }

        #[test]
        fn test_reconnect_policy_comes_from_config() {
            let mut config = Config::default();
            config.connection.max_reconnect_attempts = 5;
            config.connection.reconnect_delay_secs = 1;

            let policy = reconnect_policy(&config);
            assert_eq!(policy.max_attempts, 5);
            assert_eq!(policy.delay, Duration::from_secs(1));
        }
    }
}
