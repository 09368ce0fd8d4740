//! # causerie-shared
//!
//! Types shared between the coordination core and the server surface:
//! typed identifiers and the event payloads pushed to live sessions.

pub mod events;
pub mod types;

pub use events::{ServerEvent, SignalKind, SignalPayload};
pub use types::{ConversationId, MessageId, RequestId, SessionId, UserId};
