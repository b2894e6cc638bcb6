//! In-memory conversation store. Useful for testing and single-process use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use toolgate_core::{Conversation, ConversationId, ConversationStore, StoreError, User};

use crate::{check_owner, check_update};

/// Conversations held in a map guarded by an async lock.
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Conversation>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations across all users.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
        user: &User,
    ) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        match conversations.get(id) {
            Some(conversation) => {
                check_owner(conversation, user)?;
                Ok(Some(conversation.clone()))
            }
            None => Ok(None),
        }
    }

    async fn update_conversation(&self, conversation: &mut Conversation) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        check_update(conversations.get(&conversation.id), conversation)?;
        conversation.version += 1;
        conversations.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn list_conversations(
        &self,
        user: &User,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        let mut owned: Vec<Conversation> = conversations
            .values()
            .filter(|c| c.user.id == user.id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn delete_conversation(&self, id: &ConversationId, user: &User) -> Result<bool, StoreError> {
        let mut conversations = self.conversations.write().await;
        match conversations.get(id) {
            Some(conversation) => {
                check_owner(conversation, user)?;
                conversations.remove(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
