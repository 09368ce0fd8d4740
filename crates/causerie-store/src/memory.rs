//! In-memory [`RecordStore`] implementation.
//!
//! One `RwLock` guards all tables; every trait method takes the lock once,
//! so each call is atomic with respect to every other call. In particular
//! [`RecordStore::add_reader`] performs its read-modify-write under a single
//! write-lock acquisition, which makes concurrent `mark_read` calls for the
//! same message linearizable.

use std::collections::HashMap;
use std::sync::RwLock;

use causerie_shared::{ConversationId, MessageId, RequestId, UserId};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::models::{ChatRequest, Conversation, Message, Participant, RequestStatus, User};
use crate::RecordStore;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    conversations: HashMap<ConversationId, Conversation>,
    participants: Vec<Participant>,
    messages: HashMap<MessageId, Message>,
    requests: HashMap<RequestId, ChatRequest>,
}

/// Reference store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        // Lock poisoning only happens if a store method panicked; the data
        // is still structurally sound, so recover the guard.
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl RecordStore for MemoryStore {
    // -- users --

    fn insert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.write();

        let name_taken = tables.users.values().any(|u| {
            u.id != user.id && u.display_name.eq_ignore_ascii_case(&user.display_name)
        });
        if name_taken {
            return Err(StoreError::Duplicate(format!(
                "display name '{}'",
                user.display_name
            )));
        }

        let email_taken = tables
            .users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email));
        if email_taken {
            return Err(StoreError::Duplicate(format!("email '{}'", user.email)));
        }

        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<User> {
        self.read().users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn search_users(&self, fragment: &str, requester: UserId, limit: usize) -> Result<Vec<User>> {
        let needle = fragment.to_lowercase();
        let tables = self.read();

        let mut hits: Vec<User> = tables
            .users
            .values()
            .filter(|u| u.id != requester && u.display_name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        hits.truncate(limit);
        Ok(hits)
    }

    // -- conversations & participants --

    fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.write()
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.read()
            .conversations
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn insert_participant(&self, participant: &Participant) -> Result<()> {
        let mut tables = self.write();

        let exists = tables.participants.iter().any(|p| {
            p.conversation_id == participant.conversation_id && p.user_id == participant.user_id
        });
        if exists {
            debug!(
                conversation = %participant.conversation_id,
                user = %participant.user_id,
                "participant link already present"
            );
            return Ok(());
        }

        tables.participants.push(participant.clone());
        Ok(())
    }

    fn participant_ids(&self, conversation: ConversationId) -> Result<Vec<UserId>> {
        Ok(self
            .read()
            .participants
            .iter()
            .filter(|p| p.conversation_id == conversation)
            .map(|p| p.user_id)
            .collect())
    }

    fn conversation_ids_of(&self, user: UserId) -> Result<Vec<ConversationId>> {
        Ok(self
            .read()
            .participants
            .iter()
            .filter(|p| p.user_id == user)
            .map(|p| p.conversation_id)
            .collect())
    }

    // -- messages --

    fn insert_message(&self, message: &Message) -> Result<()> {
        self.write().messages.insert(message.id, message.clone());
        Ok(())
    }

    fn get_message(&self, id: MessageId) -> Result<Message> {
        self.read()
            .messages
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn messages_for(
        &self,
        conversation: ConversationId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let tables = self.read();

        let mut page: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation)
            .cloned()
            .collect();
        // Newest first; callers page over this order.
        page.sort_by(|a, b| b.order_key().cmp(&a.order_key()));

        Ok(page.into_iter().skip(offset).take(limit).collect())
    }

    fn last_message_of(&self, conversation: ConversationId) -> Result<Option<Message>> {
        let tables = self.read();

        Ok(tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation)
            .max_by_key(|m| m.order_key())
            .cloned())
    }

    fn add_reader(&self, message: MessageId, reader: UserId) -> Result<bool> {
        let mut tables = self.write();

        let msg = tables.messages.get_mut(&message).ok_or(StoreError::NotFound)?;
        Ok(msg.read_by.insert(reader))
    }

    // -- chat requests --

    fn insert_request(&self, request: &ChatRequest) -> Result<()> {
        self.write().requests.insert(request.id, request.clone());
        Ok(())
    }

    fn get_request(&self, id: RequestId) -> Result<ChatRequest> {
        self.read()
            .requests
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn pending_request_between(
        &self,
        sender: UserId,
        receiver: UserId,
    ) -> Result<Option<ChatRequest>> {
        Ok(self
            .read()
            .requests
            .values()
            .find(|r| {
                r.sender_id == sender
                    && r.receiver_id == receiver
                    && r.status == RequestStatus::Pending
            })
            .cloned())
    }

    fn pending_requests_for(&self, receiver: UserId) -> Result<Vec<ChatRequest>> {
        let tables = self.read();

        let mut pending: Vec<ChatRequest> = tables
            .requests
            .values()
            .filter(|r| r.receiver_id == receiver && r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pending)
    }

    fn set_request_status(&self, id: RequestId, status: RequestStatus) -> Result<()> {
        let mut tables = self.write();

        let request = tables.requests.get_mut(&id).ok_or(StoreError::NotFound)?;
        request.status = status;
        Ok(())
    }
}
