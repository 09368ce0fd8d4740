//! Domain model structs persisted by a [`crate::RecordStore`].
//!
//! Every struct derives `Serialize` and `Deserialize` so it can cross the
//! server's JSON boundary unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use causerie_shared::{ConversationId, MessageId, RequestId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user profile.
///
/// Credential material lives with the identity collaborator; the store only
/// carries the opaque hash so profile reads never expose it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Unique within the store.
    pub display_name: String,
    /// Unique within the store.
    pub email: String,
    pub avatar_url: Option<String>,
    /// Opaque credential hash, owned by the identity collaborator.
    #[serde(skip_serializing, default)]
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Conversation & Participant
// ---------------------------------------------------------------------------

/// A conversation (direct or group). Participants are held as separate
/// [`Participant`] links owned by the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    /// Only meaningful when `is_group` is set.
    pub name: Option<String>,
    pub is_group: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Membership link between a conversation and a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Discriminates message content. Anything that is not plain text keeps its
/// original tag so clients can render it. Serialized as the bare tag string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Text,
    Other(String),
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.tag().to_string()
    }
}

impl MessageKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "text" => Self::Text,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Other(tag) => tag,
        }
    }
}

/// A single chat message. Immutable once created except for monotonic
/// growth of `read_by`.
///
/// Ordering key is `(created_at, id)`; messages of a conversation form a
/// strictly append-only, totally ordered sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    /// Users who have read the message. The sender is a member from
    /// creation.
    pub read_by: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a fresh message with the sender pre-seeded in `read_by`.
    pub fn new(
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
        kind: MessageKind,
    ) -> Self {
        let mut read_by = BTreeSet::new();
        read_by.insert(sender_id);

        Self {
            id: MessageId::new(),
            conversation_id,
            sender_id,
            content,
            kind,
            read_by,
            created_at: Utc::now(),
        }
    }

    /// The total-order key used for fetch ordering and "last message"
    /// resolution.
    pub fn order_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}

// ---------------------------------------------------------------------------
// ChatRequest
// ---------------------------------------------------------------------------

/// Lifecycle of a chat request. `Pending` transitions to exactly one of the
/// terminal states, by the receiver only; terminal states are final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

/// A handshake that must be accepted before two users converse, or (as a
/// group invite) before a user is added to an existing group conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub id: RequestId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<String>,
    pub status: RequestStatus,
    pub is_group_invite: bool,
    /// Target conversation; set only when `is_group_invite` is set.
    pub conversation_id: Option<ConversationId>,
    pub created_at: DateTime<Utc>,
}
