//! # causerie-store
//!
//! The record-store seam of the coordination layer.
//!
//! The durable store is an external collaborator: this crate defines the
//! [`RecordStore`] contract the core consumes, the domain models, and an
//! in-memory reference implementation used by the bundled server and the
//! test suites. A production deployment substitutes its own implementation
//! (SQL, document store, ...) behind the same trait.

pub mod memory;
pub mod models;

mod error;

use causerie_shared::{ConversationId, MessageId, RequestId, UserId};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use models::{ChatRequest, Conversation, Message, MessageKind, Participant, RequestStatus, User};

/// Predicate CRUD over the five persisted entities.
///
/// Consistency contract: reads that follow a write from the same logical
/// operation observe that write (read-your-write). Writes to multiple
/// entities are NOT transactional across calls -- the conversation-plus-
/// participants creation sequence in the core is a known partial-failure
/// gap, and a hardened implementation should make it atomic.
///
/// All methods are synchronous and must not block on network I/O while a
/// caller holds registry state; the core never invokes the store under its
/// presence lock.
pub trait RecordStore: Send + Sync {
    // -- users --

    /// Insert a user. Fails with [`StoreError::Duplicate`] when the display
    /// name or email is already taken.
    fn insert_user(&self, user: &User) -> Result<()>;

    fn get_user(&self, id: UserId) -> Result<User>;

    /// Case-insensitive substring search over display names, excluding
    /// `requester`, capped at `limit` results.
    fn search_users(&self, fragment: &str, requester: UserId, limit: usize) -> Result<Vec<User>>;

    // -- conversations & participants --

    fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;

    fn get_conversation(&self, id: ConversationId) -> Result<Conversation>;

    /// Add a participant link. Idempotent: re-adding an existing
    /// (conversation, user) pair is a no-op.
    fn insert_participant(&self, participant: &Participant) -> Result<()>;

    /// All user ids participating in a conversation.
    fn participant_ids(&self, conversation: ConversationId) -> Result<Vec<UserId>>;

    /// Ids of every conversation the user participates in.
    fn conversation_ids_of(&self, user: UserId) -> Result<Vec<ConversationId>>;

    // -- messages --

    fn insert_message(&self, message: &Message) -> Result<()>;

    fn get_message(&self, id: MessageId) -> Result<Message>;

    /// Page of messages for a conversation in reverse-chronological order
    /// (newest first), ties broken by id.
    fn messages_for(
        &self,
        conversation: ConversationId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>>;

    /// The most recent message of a conversation, if any.
    fn last_message_of(&self, conversation: ConversationId) -> Result<Option<Message>>;

    /// Atomically add `reader` to the message's read set.
    ///
    /// Returns `true` when the reader was newly added, `false` when it was
    /// already present. The read-modify-write must be linearizable per
    /// message id: two concurrent calls for the same (message, reader) must
    /// yield exactly one `true`.
    fn add_reader(&self, message: MessageId, reader: UserId) -> Result<bool>;

    // -- chat requests --

    fn insert_request(&self, request: &ChatRequest) -> Result<()>;

    fn get_request(&self, id: RequestId) -> Result<ChatRequest>;

    /// The pending request for an ordered (sender, receiver) pair, if any.
    fn pending_request_between(
        &self,
        sender: UserId,
        receiver: UserId,
    ) -> Result<Option<ChatRequest>>;

    /// Pending requests addressed to `receiver`, newest first.
    fn pending_requests_for(&self, receiver: UserId) -> Result<Vec<ChatRequest>>;

    /// Set the status of a request.
    fn set_request_status(&self, id: RequestId, status: RequestStatus) -> Result<()>;
}
