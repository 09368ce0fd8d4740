//! Conversation creation, direct-chat deduplication, and summary views.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use causerie_shared::{ConversationId, UserId};
use causerie_store::{Conversation, Message, Participant, RecordStore, User};

use crate::error::{CoreError, Result};

/// Summary view of a conversation: the row itself, the resolved participant
/// profiles, and the single most recent message.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub participants: Vec<User>,
    pub last_message: Option<Message>,
}

impl ConversationView {
    /// Sort key for conversation listings: last message time, else the
    /// conversation's creation time.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.conversation.created_at)
    }
}

/// Conversation model over the record store.
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn RecordStore>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Create a conversation, normalizing the participant set to include
    /// the creator.
    ///
    /// For a non-group pair this is idempotent: when a non-group
    /// conversation with exactly the same participant set already exists,
    /// it is returned unchanged instead of creating a duplicate.
    ///
    /// Participant rows are written after the conversation row; a failure
    /// in between is not rolled back here (the store contract documents
    /// this gap).
    pub fn create(
        &self,
        creator: UserId,
        participant_ids: &[UserId],
        is_group: bool,
        name: Option<String>,
    ) -> Result<Conversation> {
        let mut members: BTreeSet<UserId> = participant_ids.iter().copied().collect();
        members.insert(creator);

        if !is_group && members.len() == 2 {
            if let Some(existing) = self.find_direct(creator, &members)? {
                debug!(conversation = %existing.id, "direct conversation deduplicated");
                return Ok(existing);
            }
        }

        let conversation = Conversation {
            id: ConversationId::new(),
            name: if is_group { name } else { None },
            is_group,
            created_by: creator,
            created_at: Utc::now(),
        };
        self.store.insert_conversation(&conversation)?;

        let joined_at = Utc::now();
        for user_id in members {
            self.store.insert_participant(&Participant {
                conversation_id: conversation.id,
                user_id,
                joined_at,
            })?;
        }

        info!(
            conversation = %conversation.id,
            is_group,
            creator = %creator,
            "conversation created"
        );
        Ok(conversation)
    }

    /// Scan the creator's non-group conversations for one whose full
    /// participant set equals `members`.
    fn find_direct(
        &self,
        creator: UserId,
        members: &BTreeSet<UserId>,
    ) -> Result<Option<Conversation>> {
        for conversation_id in self.store.conversation_ids_of(creator)? {
            let Ok(conversation) = self.store.get_conversation(conversation_id) else {
                continue;
            };
            if conversation.is_group {
                continue;
            }
            let ids: BTreeSet<UserId> =
                self.store.participant_ids(conversation_id)?.into_iter().collect();
            if &ids == members {
                return Ok(Some(conversation));
            }
        }
        Ok(None)
    }

    /// Assemble the summary view, rejecting requesters who are not
    /// participants.
    pub fn view(
        &self,
        conversation_id: ConversationId,
        requester: UserId,
    ) -> Result<ConversationView> {
        let conversation = self.store.get_conversation(conversation_id)?;

        let participant_ids = self.store.participant_ids(conversation_id)?;
        if !participant_ids.contains(&requester) {
            return Err(CoreError::Authz(
                "not a participant of this conversation".into(),
            ));
        }

        // Profiles that fail to resolve (user row gone) are skipped rather
        // than failing the whole view.
        let participants: Vec<User> = participant_ids
            .into_iter()
            .filter_map(|id| self.store.get_user(id).ok())
            .collect();

        let last_message = self.store.last_message_of(conversation_id)?;

        Ok(ConversationView {
            conversation,
            participants,
            last_message,
        })
    }

    /// Every conversation the user participates in, most recently active
    /// first. Conversations whose view fails to resolve are skipped --
    /// best-effort by design, not a hard error.
    pub fn list_for(&self, user: UserId) -> Result<Vec<ConversationView>> {
        let mut views: Vec<ConversationView> = self
            .store
            .conversation_ids_of(user)?
            .into_iter()
            .filter_map(|id| self.view(id, user).ok())
            .collect();

        views.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        Ok(views)
    }
}
