//! Chat request state machine.
//!
//! A request is created `pending` and transitions to exactly one terminal
//! state (`accepted` or `rejected`), by the receiver only. Acceptance has
//! the model's sole cross-entity side effect: it creates a direct
//! conversation (deduplicated) or, for a group invite, adds the receiver to
//! the target conversation.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use causerie_shared::{ConversationId, RequestId, ServerEvent, UserId};
use causerie_store::{ChatRequest, Participant, RecordStore, RequestStatus};

use crate::conversations::{ConversationService, ConversationView};
use crate::error::{CoreError, Result};
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct ChatRequestService {
    store: Arc<dyn RecordStore>,
    registry: Arc<ConnectionRegistry>,
    conversations: ConversationService,
}

impl ChatRequestService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<ConnectionRegistry>,
        conversations: ConversationService,
    ) -> Self {
        Self {
            store,
            registry,
            conversations,
        }
    }

    /// Create a pending request and, when the receiver is online, push a
    /// `new_chat_request` straight to their session.
    ///
    /// At most one pending request may exist per ordered (sender, receiver)
    /// pair; a second attempt conflicts.
    pub async fn create(
        &self,
        sender: UserId,
        receiver: UserId,
        text: Option<String>,
        is_group_invite: bool,
        conversation_id: Option<ConversationId>,
    ) -> Result<ChatRequest> {
        if self
            .store
            .pending_request_between(sender, receiver)?
            .is_some()
        {
            return Err(CoreError::Conflict("request already pending".into()));
        }

        let request = ChatRequest {
            id: RequestId::new(),
            sender_id: sender,
            receiver_id: receiver,
            text,
            status: RequestStatus::Pending,
            is_group_invite,
            conversation_id,
            created_at: Utc::now(),
        };
        self.store.insert_request(&request)?;

        info!(
            request = %request.id,
            sender = %sender,
            receiver = %receiver,
            is_group_invite,
            "chat request created"
        );

        if let Some(handle) = self.registry.session_of(receiver).await {
            handle.send(ServerEvent::NewChatRequest {
                request_id: request.id,
                sender_id: sender,
                text: request.text.clone(),
                is_group_invite,
                conversation_id,
                created_at: request.created_at,
            });
        }

        Ok(request)
    }

    /// Pending requests addressed to `receiver`, newest first.
    pub fn pending_for(&self, receiver: UserId) -> Result<Vec<ChatRequest>> {
        Ok(self.store.pending_requests_for(receiver)?)
    }

    /// Load a request and enforce the receiver-only ownership rule. A
    /// request that exists but belongs to someone else is reported as not
    /// found, exactly like a missing id.
    fn owned_request(&self, id: RequestId, acting: UserId) -> Result<ChatRequest> {
        let request = self
            .store
            .get_request(id)
            .map_err(|_| CoreError::NotFound("request not found".into()))?;
        if request.receiver_id != acting {
            return Err(CoreError::NotFound("request not found".into()));
        }
        Ok(request)
    }

    /// Accept a pending request.
    ///
    /// Group invite: adds the acting user to the referenced conversation.
    /// Otherwise: creates (or dedups onto) a direct conversation with the
    /// sender. Returns the resulting conversation view.
    pub async fn accept(&self, id: RequestId, acting: UserId) -> Result<ConversationView> {
        let request = self.owned_request(id, acting)?;
        if request.status != RequestStatus::Pending {
            return Err(CoreError::State("request already processed".into()));
        }

        self.store.set_request_status(id, RequestStatus::Accepted)?;
        info!(request = %id, receiver = %acting, "chat request accepted");

        if request.is_group_invite {
            let conversation_id = request.conversation_id.ok_or_else(|| {
                CoreError::State("group invite without a target conversation".into())
            })?;
            self.store.insert_participant(&Participant {
                conversation_id,
                user_id: acting,
                joined_at: Utc::now(),
            })?;
            self.conversations.view(conversation_id, acting)
        } else {
            let conversation = self
                .conversations
                .create(acting, &[request.sender_id], false, None)?;
            self.conversations.view(conversation.id, acting)
        }
    }

    /// Reject a pending request. No conversation side effect.
    pub async fn reject(&self, id: RequestId, acting: UserId) -> Result<()> {
        let request = self.owned_request(id, acting)?;
        if request.status != RequestStatus::Pending {
            return Err(CoreError::State("request already processed".into()));
        }

        self.store.set_request_status(id, RequestStatus::Rejected)?;
        info!(request = %id, receiver = %acting, "chat request rejected");
        Ok(())
    }
}
