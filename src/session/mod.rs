//! Live chat session support
//!
//! Everything needed to hold a real-time conversation with the chat
//! server: endpoint resolution, the session socket and its event
//! stream, the one-shot creation handshake, typed wire frames, and the
//! message timeline built from them.

pub mod connection;
pub mod endpoint;
pub mod handshake;
pub mod protocol;
pub mod timeline;

pub use connection::{ChatConnection, CloseReason, ReconnectPolicy, SessionEvent};
pub use endpoint::Endpoint;
pub use protocol::{ClientMessage, ServerEvent};
pub use timeline::{ChatRole, Message, MessageId, Timeline, TransientKind};
