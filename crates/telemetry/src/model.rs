//! Data model for execution traces, spans, and metric samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Top-level turn (user message → final response).
    Turn,
    /// An LLM completion call.
    LlmCall,
    /// A tool execution.
    ToolExecution,
    /// Anything else an embedder chooses to trace.
    Custom,
}

impl SpanKind {
    /// Classify a span by the name the agent gives it.
    pub fn from_name(name: &str) -> Self {
        match name {
            "turn" => Self::Turn,
            "llm_call" => Self::LlmCall,
            "tool_execution" => Self::ToolExecution,
            _ => Self::Custom,
        }
    }
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Turn => write!(f, "turn"),
            Self::LlmCall => write!(f, "llm_call"),
            Self::ToolExecution => write!(f, "tool_execution"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique identifier.
    pub id: String,
    /// What kind of work this represents.
    pub kind: SpanKind,
    /// Name passed by the caller (e.g. "tool_execution").
    pub name: String,
    /// When the span started.
    pub started_at: DateTime<Utc>,
    /// When the span ended (None if still running).
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration in milliseconds (computed on end).
    pub duration_ms: Option<u64>,
    /// Whether the operation succeeded.
    pub success: Option<bool>,
    /// Attributes supplied at start (tool name, iteration, ...).
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Span {
    pub fn new(name: impl Into<String>, attributes: BTreeMap<String, serde_json::Value>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4().to_string(),
            kind: SpanKind::from_name(&name),
            name,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            success: None,
            attributes,
        }
    }

    /// Mark the span as ended with the given success status.
    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }

    /// The conversation this span belongs to, if the caller said so.
    pub fn conversation_id(&self) -> Option<&str> {
        self.attributes
            .get("conversation_id")
            .and_then(|v| v.as_str())
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// A collection of spans representing one conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Unique trace id.
    pub id: String,
    /// Conversation id this trace belongs to.
    pub conversation_id: String,
    /// Completed spans in completion order.
    pub spans: Vec<Span>,
    /// When the trace started.
    pub started_at: DateTime<Utc>,
    /// When the trace ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trace {
    /// Create a new trace for a conversation.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Add a span to this trace.
    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Mark the trace as complete.
    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Total duration in milliseconds.
    pub fn total_duration_ms(&self) -> u64 {
        self.spans
            .iter()
            .filter(|s| s.kind != SpanKind::Turn)
            .filter_map(|s| s.duration_ms)
            .sum()
    }

    /// Number of LLM calls in this trace.
    pub fn llm_call_count(&self) -> usize {
        self.count_kind(SpanKind::LlmCall)
    }

    /// Number of tool executions in this trace.
    pub fn tool_execution_count(&self) -> usize {
        self.count_kind(SpanKind::ToolExecution)
    }

    fn count_kind(&self, kind: SpanKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }
}

// ── Metrics ───────────────────────────────────────────────────────────────

/// A single recorded metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub tags: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}
