//! Conversation bookkeeping for workflow runs

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::RecordStore;
use crate::types::{Conversation, Message, WorkflowRequest};

/// Creates conversations on demand and appends their messages
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn RecordStore>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// The request's conversation, or a new one when it is absent, unknown or
    /// owned by someone else
    pub async fn resolve(&self, request: &WorkflowRequest) -> Result<Conversation> {
        if let Some(id) = request.conversation_id {
            match self.store.get_conversation(&id).await? {
                Some(conversation) if conversation.owner_id == request.user_id => {
                    return Ok(conversation);
                }
                Some(_) => {
                    tracing::warn!(
                        "Conversation {} is not owned by {}, starting a new one",
                        id,
                        request.user_id
                    );
                }
                None => {
                    tracing::debug!("Conversation {} not found, starting a new one", id);
                }
            }
        }

        let conversation = Conversation::new(
            request.user_id.clone(),
            request.role,
            request.mode,
            request.subject.clone(),
            request.grade_level.clone(),
        );
        self.store.insert_conversation(&conversation).await?;
        tracing::info!(
            "Created conversation {} ({}) for {}",
            conversation.id,
            conversation.mode,
            conversation.owner_id
        );

        Ok(conversation)
    }

    /// The last `exchanges` user/assistant pairs, chronological
    pub async fn history(&self, conversation_id: &Uuid, exchanges: usize) -> Result<Vec<Message>> {
        if exchanges == 0 {
            return Ok(Vec::new());
        }
        self.store
            .list_messages(conversation_id, Some(exchanges * 2))
            .await
    }

    pub async fn append(&self, message: &Message) -> Result<()> {
        self.store.append_message(message).await
    }

    /// Messages of a conversation visible to `user_id`
    pub async fn messages_for(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))?;

        if conversation.owner_id != user_id {
            return Err(Error::NotFound(format!("conversation {}", conversation_id)));
        }

        self.store.list_messages(conversation_id, limit).await
    }
}
