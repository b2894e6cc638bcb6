//! LlmService trait: the abstraction over model backends.
//!
//! A service takes an ordered message list plus tool descriptors and returns
//! text and/or tool calls, either in one response or as a stream of chunks.
//! Concrete provider clients live outside this workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::message::Message;
use crate::tool::{ToolCall, ToolSchema};

/// A request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Ordered context, system prompt first
    pub messages: Vec<Message>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub stream: bool,

    /// Free-form metadata middlewares may read or write
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete (non-streaming) model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls in the order the model issued them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Completed tool calls; a repeated id replaces the earlier call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The model backend consumed by the agent.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// A human-readable name (e.g. "openai", "scripted").
    fn name(&self) -> &str;

    async fn send_request(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Finite, non-restartable stream of partial responses.
    ///
    /// Default implementation calls `send_request()` and wraps the result as a single chunk.
    async fn stream_request(
        &self,
        request: LlmRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, LlmError>>, LlmError> {
        let response = self.send_request(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: response.content,
                tool_calls: response.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}

/// Fold a chunk stream into one response.
pub async fn collect_stream(
    mut rx: tokio::sync::mpsc::Receiver<Result<StreamChunk, LlmError>>,
) -> Result<LlmResponse, LlmError> {
    let mut content = String::new();
    let mut saw_content = false;
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut usage = None;

    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        if let Some(text) = chunk.content {
            saw_content = true;
            content.push_str(&text);
        }
        for call in chunk.tool_calls {
            match tool_calls.iter_mut().find(|c| c.id == call.id) {
                Some(existing) => *existing = call,
                None => tool_calls.push(call),
            }
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        if chunk.done {
            break;
        }
    }

    Ok(LlmResponse {
        content: saw_content.then_some(content),
        tool_calls,
        usage,
        metadata: serde_json::Map::new(),
    })
}
