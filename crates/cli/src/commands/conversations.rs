//! `toolgate conversations`: browse the file conversation store.

use anyhow::{Context, bail};
use toolgate_config::{AppConfig, StoreBackend};
use toolgate_core::{ConversationId, ConversationStore, User};
use toolgate_memory::FileConversationStore;

pub async fn run(user_id: &str, show: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load config")?;
    if config.store.backend == StoreBackend::Memory {
        println!("The memory store lives only inside a running process; nothing to browse.");
        println!("Set [store] backend = \"file\" or TOOLGATE_STORE_PATH to persist conversations.");
        return Ok(());
    }

    let store = FileConversationStore::new(config.conversations_dir());
    let user = User::new(user_id);

    if let Some(id) = show {
        let Some(conversation) = store
            .get_conversation(&ConversationId::from(id), &user)
            .await?
        else {
            bail!("conversation '{id}' not found for user '{user_id}'");
        };
        println!("{}", serde_json::to_string_pretty(&conversation)?);
        return Ok(());
    }

    let conversations = store.list_conversations(&user, limit).await?;
    if conversations.is_empty() {
        println!("No conversations for '{user_id}' in {}", store.dir().display());
        return Ok(());
    }
    for conversation in conversations {
        let preview = conversation
            .last_answer()
            .map(|m| m.content.chars().take(60).collect::<String>())
            .unwrap_or_default();
        println!(
            "{}  v{}  {} messages  {}  {preview}",
            conversation.id,
            conversation.version,
            conversation.messages.len(),
            conversation.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}
