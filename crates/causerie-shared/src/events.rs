//! Server-to-client push events and the call-signaling envelope.
//!
//! Everything here crosses the WebSocket boundary as JSON, so the shapes
//! are the wire contract with clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, RequestId, UserId};

/// One event pushed to a live session.
///
/// Delivery is best-effort: an event is queued on the session's bounded
/// outbound channel and dropped (with a log line) when the queue is full.
/// No operation's success depends on delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A user authenticated a live session.
    UserOnline { user_id: UserId },

    /// A user's session disconnected.
    UserOffline { user_id: UserId },

    /// A message was persisted in a conversation the session has joined.
    NewMessage {
        message_id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
        kind: String,
        read_by: Vec<UserId>,
        created_at: DateTime<Utc>,
    },

    /// A reader was added to a message's read set.
    MessageRead {
        message_id: MessageId,
        conversation_id: ConversationId,
        reader_id: UserId,
    },

    /// A pending chat request addressed to this session's user.
    NewChatRequest {
        request_id: RequestId,
        sender_id: UserId,
        text: Option<String>,
        is_group_invite: bool,
        conversation_id: Option<ConversationId>,
        created_at: DateTime<Utc>,
    },

    /// Another participant started typing in a joined room.
    Typing {
        conversation_id: ConversationId,
        user_id: UserId,
    },

    /// Another participant stopped typing in a joined room.
    StopTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },

    /// A call-signaling payload addressed to this session's user.
    Signal(SignalPayload),

    /// This session was superseded by a newer authentication for the same
    /// user. The registry sends this once and then drops the session.
    SessionReplaced,
}

/// Discriminates the call-signaling payloads the relay forwards verbatim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    CallInvite,
    CallAccept,
    CallReject,
    CallEnd,
}

/// A point-to-point signaling envelope.
///
/// The relay never inspects `data`; it is delivered byte-for-byte to the
/// target user's session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalPayload {
    pub kind: SignalKind,
    pub from_user_id: UserId,
    pub target_user_id: UserId,
    pub conversation_id: ConversationId,
    pub data: serde_json::Value,
}
