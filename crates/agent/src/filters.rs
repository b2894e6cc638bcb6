//! Built-in conversation filters.

use async_trait::async_trait;
use toolgate_core::{ConversationFilter, Message, Role};

/// Keeps only the most recent messages of a conversation.
///
/// The cut never separates tool results from the assistant message that
/// requested them: when the window would start inside such a group it is
/// widened back to the assistant message, so the result may hold slightly
/// more than `max_messages` entries.
#[derive(Debug, Clone, Copy)]
pub struct MaxHistoryFilter {
    max_messages: usize,
}

impl MaxHistoryFilter {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
        }
    }

    fn window_start(&self, messages: &[Message]) -> usize {
        let mut start = messages.len().saturating_sub(self.max_messages);
        while start > 0 && messages[start].role == Role::Tool {
            start -= 1;
        }
        start
    }
}

#[async_trait]
impl ConversationFilter for MaxHistoryFilter {
    async fn filter_messages(&self, mut messages: Vec<Message>) -> Vec<Message> {
        let start = self.window_start(&messages);
        if start > 0 {
            messages.drain(..start);
        }
        messages
    }
}
