//! Shared test helpers for agent tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use toolgate_core::{
    LlmError, LlmRequest, LlmResponse, LlmService, Tool, ToolArgs, ToolCall, ToolContext,
    ToolError, ToolResult,
};

/// One scripted reaction of [`ScriptedLlm`].
pub enum Step {
    Respond(LlmResponse),
    Fail(LlmError),
    /// Sleep, then answer with text.
    Stall(Duration),
}

/// An LLM that replays a script.
///
/// Each call consumes the next step. Once the script runs out the
/// `fallback` response is repeated; without one the call panics.
pub struct ScriptedLlm {
    steps: Mutex<VecDeque<Step>>,
    fallback: Option<LlmResponse>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Step::Respond(LlmResponse::text(text))])
    }

    /// First returns tool calls, then a final answer.
    pub fn tool_then_answer(calls: Vec<ToolCall>, answer: &str) -> Self {
        Self::new(vec![
            Step::Respond(LlmResponse::tool_calls(calls)),
            Step::Respond(LlmResponse::text(answer)),
        ])
    }

    /// Answers every call with the same response.
    pub fn always(response: LlmResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_request(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(LlmResponse::text("too late"))
            }
            None => match &self.fallback {
                Some(response) => Ok(response.clone()),
                None => panic!("ScriptedLlm: no more responses (call #{call})"),
            },
        }
    }
}

pub fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

/// How [`SpyTool`] behaves when its body runs.
#[derive(Clone, Copy)]
pub enum SpyMode {
    Succeed,
    Error,
}

/// A tool that counts how often its body ran.
pub struct SpyTool {
    name: String,
    groups: Vec<String>,
    mode: SpyMode,
    pub calls: AtomicUsize,
}

impl SpyTool {
    pub fn new(name: &str, groups: &[&str], mode: SpyMode) -> Self {
        Self {
            name: name.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SpyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records invocations"
    }

    fn access_groups(&self) -> Vec<String> {
        self.groups.clone()
    }

    fn args_schema(&self) -> toolgate_core::ArgsSchema {
        toolgate_core::ArgsSchema::new()
    }

    async fn execute(&self, _context: &ToolContext, _args: ToolArgs) -> Result<ToolResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            SpyMode::Succeed => Ok(ToolResult::success(format!("{} ran", self.name))),
            SpyMode::Error => Err(ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: "disk on fire".into(),
            }),
        }
    }
}
