//! Ordered message timeline and the event reducer that maintains it
//!
//! The timeline is the single source of truth for a chat transcript.
//! It is seeded from REST history and then mutated exclusively by
//! [`Timeline::apply`], a deterministic reducer over inbound server
//! events. Nothing else writes to it, so no locking is needed as long
//! as events are applied from one task at a time.

use std::fmt;

use tracing::debug;

use crate::session::protocol::ServerEvent;

/// Identifier for a timeline entry
///
/// Three disjoint namespaces keep server-assigned and client-assigned
/// ids from ever colliding. `Persisted` and `Confirmed` both name a
/// server-side row, so they compare equal through [`MessageId::same_record`]
/// when the row id matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Server row id loaded from REST history
    Persisted(i64),

    /// Server row id confirmed live in a final assistant reply
    Confirmed(i64),

    /// Client-assigned id for entries the server never stored
    Local(u64),
}

impl MessageId {
    /// True when both ids name the same underlying record
    pub fn same_record(&self, other: &MessageId) -> bool {
        match (self, other) {
            (MessageId::Local(a), MessageId::Local(b)) => a == b,
            (
                MessageId::Persisted(a) | MessageId::Confirmed(a),
                MessageId::Persisted(b) | MessageId::Confirmed(b),
            ) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Persisted(id) => write!(f, "{}", id),
            MessageId::Confirmed(id) => write!(f, "ai_{}", id),
            MessageId::Local(id) => write!(f, "local_{}", id),
        }
    }
}

/// Author of a timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// In-progress marker for an assistant turn still being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// The assistant acknowledged the turn but has produced no text
    Thinking,

    /// The assistant is emitting the reply incrementally
    Streaming,
}

/// One entry in the chat transcript
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: Option<String>,
    pub transient: Option<TransientKind>,
}

impl Message {
    /// Create a settled message with no timestamp
    pub fn new(id: MessageId, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: None,
            transient: None,
        }
    }

    /// Attach a server-side timestamp
    pub fn with_timestamp(mut self, timestamp: Option<String>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark the message as an in-progress assistant turn
    pub fn with_transient(mut self, kind: TransientKind) -> Self {
        self.transient = Some(kind);
        self
    }
}

/// The ordered transcript of one chat session
///
/// Entries are appended in reducer order; history-seeded entries
/// precede all live ones. At most one entry is transient at any time.
#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    next_local_id: u64,
}

impl Timeline {
    /// Create an empty timeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a timeline from persisted history rows
    ///
    /// History entries are always settled; any transient marker on the
    /// input is cleared.
    pub fn from_history(messages: Vec<Message>) -> Self {
        let mut timeline = Self::new();
        for mut message in messages {
            message.transient = None;
            timeline.push_checked(message);
        }
        timeline
    }

    /// All entries in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The in-progress assistant entry, if one exists
    pub fn transient(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.transient.is_some())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Fold one server event into the timeline
    ///
    /// Rules, applied in arrival order:
    ///
    /// * `message_received` appends a settled user entry
    /// * `ai_thinking` and incomplete `ai_streaming` replace any prior
    ///   transient entry with a fresh one of their kind
    /// * complete `ai_streaming` replaces the transient entry with a
    ///   settled assistant entry
    /// * `ai_response` clears every transient entry and appends the
    ///   final assistant reply under its server id when one is given
    /// * `connected`, `chat_created`, and `error` never touch the
    ///   timeline
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Connected { .. } | ServerEvent::ChatCreated { .. } => {}
            ServerEvent::Error { .. } => {}
            ServerEvent::MessageReceived { message } => {
                let id = self.alloc_local();
                self.push_checked(Message::new(id, ChatRole::User, message.clone()));
            }
            ServerEvent::AiThinking { message } => {
                self.clear_transients();
                let id = self.alloc_local();
                self.push_checked(
                    Message::new(id, ChatRole::Assistant, message.clone())
                        .with_transient(TransientKind::Thinking),
                );
            }
            ServerEvent::AiStreaming {
                partial_message,
                is_complete,
            } => {
                self.clear_transients();
                let id = self.alloc_local();
                let mut message = Message::new(id, ChatRole::Assistant, partial_message.clone());
                if !is_complete {
                    message = message.with_transient(TransientKind::Streaming);
                }
                self.push_checked(message);
            }
            ServerEvent::AiResponse {
                message,
                message_id,
                timestamp,
            } => {
                self.clear_transients();
                let id = match message_id {
                    Some(row) => MessageId::Confirmed(*row),
                    None => self.alloc_local(),
                };
                self.push_checked(
                    Message::new(id, ChatRole::Assistant, message.clone())
                        .with_timestamp(timestamp.clone()),
                );
            }
        }
    }

    /// Next id in the client-assigned namespace, monotonic per timeline
    fn alloc_local(&mut self) -> MessageId {
        self.next_local_id += 1;
        MessageId::Local(self.next_local_id)
    }

    /// Append unless an entry for the same record already exists
    fn push_checked(&mut self, message: Message) {
        if self.messages.iter().any(|m| m.id.same_record(&message.id)) {
            debug!("Skipping duplicate message {}", message.id);
            return;
        }
        self.messages.push(message);
    }

    fn clear_transients(&mut self) {
        self.messages.retain(|m| m.transient.is_none());
    }
}
