//! Message pipeline: append-only per-conversation sequences, read
//! receipts, and room broadcast.
//!
//! Broadcast is fire-and-forget relative to the caller: an operation's
//! success is defined purely by persistence, independent of how many live
//! sessions receive the event.

use std::sync::Arc;

use tracing::debug;

use causerie_shared::{ConversationId, MessageId, ServerEvent, UserId};
use causerie_store::{Message, MessageKind, RecordStore};

use crate::error::{CoreError, Result};
use crate::registry::ConnectionRegistry;

/// Message operations over the record store, with room fan-out through the
/// connection registry.
#[derive(Clone)]
pub struct MessagePipeline {
    store: Arc<dyn RecordStore>,
    registry: Arc<ConnectionRegistry>,
}

impl MessagePipeline {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    fn require_participant(&self, conversation: ConversationId, user: UserId) -> Result<()> {
        if self.store.participant_ids(conversation)?.contains(&user) {
            Ok(())
        } else {
            Err(CoreError::Authz(
                "not a participant of this conversation".into(),
            ))
        }
    }

    /// Persist a message with `read_by = {sender}` and broadcast
    /// `new_message` to the conversation's room.
    pub async fn send(
        &self,
        conversation: ConversationId,
        sender: UserId,
        content: String,
        kind: MessageKind,
    ) -> Result<Message> {
        self.require_participant(conversation, sender)?;

        let message = Message::new(conversation, sender, content, kind);
        self.store.insert_message(&message)?;

        debug!(
            message = %message.id,
            conversation = %conversation,
            sender = %sender,
            "message persisted"
        );

        self.registry
            .broadcast_room(conversation, new_message_event(&message), None)
            .await;

        Ok(message)
    }

    /// Page of messages in strict chronological order (oldest first).
    ///
    /// `limit`/`offset` page over the store's reverse-chronological order
    /// before the final re-ordering, so offset 0 always holds the newest
    /// page.
    pub fn fetch(
        &self,
        conversation: ConversationId,
        requester: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        self.require_participant(conversation, requester)?;

        let mut page = self.store.messages_for(conversation, limit, offset)?;
        page.reverse();
        Ok(page)
    }

    /// Add `reader` to the message's read set.
    ///
    /// Idempotent: when the reader is already present there is no
    /// persistence write and no broadcast. The read-modify-write is atomic
    /// per message inside the store, so concurrent calls never lose an
    /// update.
    pub async fn mark_read(&self, message_id: MessageId, reader: UserId) -> Result<()> {
        let message = self.store.get_message(message_id)?;

        let newly_added = self.store.add_reader(message_id, reader)?;
        if !newly_added {
            return Ok(());
        }

        self.registry
            .broadcast_room(
                message.conversation_id,
                ServerEvent::MessageRead {
                    message_id,
                    conversation_id: message.conversation_id,
                    reader_id: reader,
                },
                None,
            )
            .await;

        Ok(())
    }
}

fn new_message_event(message: &Message) -> ServerEvent {
    ServerEvent::NewMessage {
        message_id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        content: message.content.clone(),
        kind: message.kind.tag().to_string(),
        read_by: message.read_by.iter().copied().collect(),
        created_at: message.created_at,
    }
}
