//! Conversation store implementations for toolgate.
//!
//! Both backends enforce ownership and optimistic versioning: an update
//! whose `version` differs from the stored one fails with
//! `StoreError::Conflict` instead of overwriting.

pub mod file_store;
pub mod in_memory;

pub use file_store::FileConversationStore;
pub use in_memory::InMemoryConversationStore;

use toolgate_core::{Conversation, StoreError, User};

/// Check that `stored` (if any) may be replaced by `incoming`.
pub(crate) fn check_update(
    stored: Option<&Conversation>,
    incoming: &Conversation,
) -> Result<(), StoreError> {
    let found = match stored {
        Some(existing) => {
            if existing.user.id != incoming.user.id {
                return Err(StoreError::Forbidden(incoming.id.to_string()));
            }
            existing.version
        }
        None => 0,
    };
    if found != incoming.version {
        return Err(StoreError::Conflict {
            conversation_id: incoming.id.to_string(),
            expected: incoming.version,
            found,
        });
    }
    Ok(())
}

/// Ownership check for reads and deletes.
pub(crate) fn check_owner(conversation: &Conversation, user: &User) -> Result<(), StoreError> {
    if conversation.user.id == user.id {
        Ok(())
    } else {
        Err(StoreError::Forbidden(conversation.id.to_string()))
    }
}
