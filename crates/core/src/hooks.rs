//! Extension points around a turn: lifecycle hooks, conversation filters,
//! LLM middlewares, context enrichers, error recovery and prompt building.
//!
//! Every trait has no-op defaults so implementors only override what they need.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{HookError, LlmError};
use crate::llm::{LlmRequest, LlmResponse};
use crate::message::{Conversation, Message};
use crate::tool::{Tool, ToolContext, ToolResult, ToolSchema};
use crate::user::User;

/// Turn-level interception. Any `Err` aborts the turn immediately; work
/// already persisted stands.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    fn name(&self) -> &str;

    /// May replace the inbound message.
    async fn before_message(&self, _user: &User, _message: &str) -> Result<Option<String>, HookError> {
        Ok(None)
    }

    /// Called after the conversation has been persisted for the turn.
    async fn after_message(&self, _conversation: &Conversation) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_tool(&self, _tool: &dyn Tool, _context: &ToolContext) -> Result<(), HookError> {
        Ok(())
    }

    /// May replace the tool result before it reaches the model.
    async fn after_tool(&self, _result: &ToolResult) -> Result<Option<ToolResult>, HookError> {
        Ok(None)
    }
}

/// Drops or redacts history before it is sent to the model.
#[async_trait]
pub trait ConversationFilter: Send + Sync {
    async fn filter_messages(&self, messages: Vec<Message>) -> Vec<Message>;
}

/// Rewrites outgoing requests and incoming responses.
#[async_trait]
pub trait LlmMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn before_request(&self, request: LlmRequest) -> Result<LlmRequest, HookError> {
        Ok(request)
    }

    async fn after_response(
        &self,
        _request: &LlmRequest,
        response: LlmResponse,
    ) -> Result<LlmResponse, HookError> {
        Ok(response)
    }
}

/// Injects extra data into a [`ToolContext`] before each tool call.
///
/// A failing enricher is logged and skipped.
#[async_trait]
pub trait ContextEnricher: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(&self, context: ToolContext) -> Result<ToolContext, HookError>;
}

/// What to do after a failed LLM call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry { delay: Duration },
    Fail,
}

#[async_trait]
pub trait ErrorRecoveryStrategy: Send + Sync {
    /// `attempt` is 1 for the first failure.
    async fn on_llm_error(&self, error: &LlmError, attempt: u32) -> RecoveryAction;
}

/// Builds the system prompt for a turn.
#[async_trait]
pub trait SystemPromptBuilder: Send + Sync {
    async fn build_system_prompt(&self, user: &User, tools: &[ToolSchema]) -> Option<String>;
}
