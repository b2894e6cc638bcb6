//! File-based conversation store: one pretty-printed JSON file per conversation.
//!
//! Storage location defaults to `~/.toolgate/conversations/<id>.json`.
//! Writes go to a temporary file that is renamed into place, and a store-wide
//! lock serializes the read-compare-write of each update.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use toolgate_core::{Conversation, ConversationId, ConversationStore, StoreError, User};
use tracing::{debug, warn};

use crate::{check_owner, check_update};

pub struct FileConversationStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File conversation store opened");
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map an id to its file, refusing anything that could escape the directory.
    fn path_for(&self, id: &ConversationId) -> Result<PathBuf, StoreError> {
        let raw = id.as_str();
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Storage(format!(
                "Invalid conversation id for file storage: '{raw}'"
            )));
        }
        Ok(self.dir.join(format!("{raw}.json")))
    }

    async fn read_file(path: &Path) -> Result<Option<Conversation>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))
    }

    async fn write_file(&self, path: &Path, conversation: &Conversation) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create conversation directory: {e}"))
        })?;

        let json = serde_json::to_string_pretty(conversation)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write conversation file: {e}")))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace conversation file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
        user: &User,
    ) -> Result<Option<Conversation>, StoreError> {
        let path = self.path_for(id)?;
        match Self::read_file(&path).await? {
            Some(conversation) => {
                check_owner(&conversation, user)?;
                Ok(Some(conversation))
            }
            None => Ok(None),
        }
    }

    async fn update_conversation(&self, conversation: &mut Conversation) -> Result<(), StoreError> {
        let path = self.path_for(&conversation.id)?;
        let _guard = self.write_lock.lock().await;

        let stored = Self::read_file(&path).await?;
        check_update(stored.as_ref(), conversation)?;

        conversation.version += 1;
        if let Err(e) = self.write_file(&path, conversation).await {
            conversation.version -= 1;
            return Err(e);
        }
        debug!(
            conversation_id = %conversation.id,
            version = conversation.version,
            messages = conversation.messages.len(),
            "Conversation saved"
        );
        Ok(())
    }

    async fn list_conversations(
        &self,
        user: &User,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Storage(format!("Failed to list conversations: {e}"))),
        };

        let mut owned = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_file(&path).await {
                Ok(Some(conversation)) if conversation.user.id == user.id => owned.push(conversation),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable conversation"),
            }
        }

        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn delete_conversation(&self, id: &ConversationId, user: &User) -> Result<bool, StoreError> {
        let path = self.path_for(id)?;
        let _guard = self.write_lock.lock().await;

        let Some(conversation) = Self::read_file(&path).await? else {
            return Ok(false);
        };
        check_owner(&conversation, user)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to delete conversation: {e}")))?;
        Ok(true)
    }
}
