//! Default system prompt construction.

use async_trait::async_trait;
use toolgate_core::{SystemPromptBuilder, ToolSchema, User};

/// The configured base prompt, followed by who the user is and which tools
/// they may call.
#[derive(Debug, Clone)]
pub struct DefaultSystemPromptBuilder {
    base: String,
}

impl DefaultSystemPromptBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl SystemPromptBuilder for DefaultSystemPromptBuilder {
    async fn build_system_prompt(&self, user: &User, tools: &[ToolSchema]) -> Option<String> {
        let mut prompt = self.base.trim().to_string();

        if !user.name.is_empty() {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str(&format!("You are assisting {}.", user.name));
        }

        if !tools.is_empty() {
            prompt.push_str("\n\nAvailable tools:");
            for tool in tools {
                prompt.push_str(&format!("\n- {}: {}", tool.name, tool.description));
            }
        }

        let prompt = prompt.trim().to_string();
        (!prompt.is_empty()).then_some(prompt)
    }
}
