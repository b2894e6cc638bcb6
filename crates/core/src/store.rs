//! ConversationStore trait: persisted conversation history.
//!
//! The store is the only resource shared between concurrent turns. It must
//! not silently drop one of two concurrent updates to the same id;
//! implementations use optimistic versioning on [`Conversation::version`].

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId};
use crate::user::User;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g. "memory", "file").
    fn name(&self) -> &str;

    /// Fetch a conversation owned by `user`.
    ///
    /// `Ok(None)` when the id is unknown; `StoreError::Forbidden` when it
    /// belongs to someone else.
    async fn get_conversation(
        &self,
        id: &ConversationId,
        user: &User,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Persist `conversation`, creating it if absent.
    ///
    /// Fails with `StoreError::Conflict` when the stored version differs from
    /// `conversation.version`; on success the version is bumped in place.
    async fn update_conversation(&self, conversation: &mut Conversation) -> Result<(), StoreError>;

    /// Most recently updated conversations of `user`, newest first.
    async fn list_conversations(
        &self,
        user: &User,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Returns whether anything was deleted.
    async fn delete_conversation(&self, id: &ConversationId, user: &User) -> Result<bool, StoreError>;
}
