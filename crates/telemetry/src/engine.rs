//! Thread-safe telemetry engine: collects spans into per-conversation
//! traces, keeps metric samples, and serves queries.

use crate::model::*;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use toolgate_core::{ObservabilityError, ObservabilityProvider, SpanHandle};

/// Conversation id used for spans that carry none.
const UNSCOPED: &str = "unscoped";

/// The core telemetry engine.
///
/// Thread-safe via `RwLock`. A `turn` span opens a trace for its
/// conversation; every other span ends up in the open trace of the
/// conversation named by its `conversation_id` attribute.
pub struct TelemetryEngine {
    /// Spans started but not yet ended.
    open_spans: RwLock<HashMap<String, Span>>,
    /// All recorded traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    /// Metric samples (most recent last).
    metrics: RwLock<Vec<MetricSample>>,
    /// Running totals.
    counters: RwLock<TelemetryCounters>,
    max_traces: usize,
    max_metrics: usize,
}

/// Running totals since engine creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryCounters {
    pub turns: u64,
    pub llm_calls: u64,
    pub tool_executions: u64,
    pub failed_spans: u64,
    pub metric_samples: u64,
}

impl TelemetryEngine {
    /// Create a new telemetry engine with default retention.
    pub fn new() -> Self {
        Self::with_retention(5_000, 50_000)
    }

    /// Create an engine that keeps at most `max_traces` traces and `max_metrics` samples.
    pub fn with_retention(max_traces: usize, max_metrics: usize) -> Self {
        Self {
            open_spans: RwLock::new(HashMap::new()),
            traces: RwLock::new(Vec::new()),
            metrics: RwLock::new(Vec::new()),
            counters: RwLock::new(TelemetryCounters::default()),
            max_traces: max_traces.max(1),
            max_metrics: max_metrics.max(1),
        }
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Start a new trace for a conversation turn.
    pub fn start_trace(&self, conversation_id: impl Into<String>) -> String {
        let trace = Trace::new(conversation_id);
        let id = trace.id.clone();
        let mut traces = write(&self.traces);

        if traces.len() >= self.max_traces {
            // Remove oldest completed traces first
            let drain_count = (self.max_traces / 10).max(1);
            let mut removed = 0;
            traces.retain(|t| {
                if removed >= drain_count || t.is_open() {
                    return true;
                }
                removed += 1;
                false
            });
        }

        traces.push(trace);
        id
    }

    /// End a trace.
    pub fn end_trace(&self, trace_id: &str) {
        let mut traces = write(&self.traces);
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.end();
        }
    }

    /// Attach a completed span to the open trace of its conversation.
    fn record_span(&self, span: Span) {
        {
            let mut counters = write(&self.counters);
            match span.kind {
                SpanKind::Turn => counters.turns += 1,
                SpanKind::LlmCall => counters.llm_calls += 1,
                SpanKind::ToolExecution => counters.tool_executions += 1,
                SpanKind::Custom => {}
            }
            if span.success == Some(false) {
                counters.failed_spans += 1;
            }
        }

        let conversation_id = span.conversation_id().unwrap_or(UNSCOPED).to_string();
        let closes_trace = span.kind == SpanKind::Turn;

        let trace_id = self
            .open_trace_for(&conversation_id)
            .unwrap_or_else(|| self.start_trace(conversation_id.clone()));

        let mut traces = write(&self.traces);
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.add_span(span);
            if closes_trace {
                trace.end();
            }
        }
    }

    fn open_trace_for(&self, conversation_id: &str) -> Option<String> {
        read(&self.traces)
            .iter()
            .rev()
            .find(|t| t.is_open() && t.conversation_id == conversation_id)
            .map(|t| t.id.clone())
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Get a specific trace by ID.
    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        read(&self.traces).iter().find(|t| t.id == trace_id).cloned()
    }

    /// List recent traces (most recent first).
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        read(&self.traces).iter().rev().take(limit).cloned().collect()
    }

    /// Get traces for a specific conversation.
    pub fn traces_for_conversation(&self, conversation_id: &str) -> Vec<Trace> {
        read(&self.traces)
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    /// Total number of traces recorded.
    pub fn trace_count(&self) -> usize {
        read(&self.traces).len()
    }

    /// Number of spans started but not yet ended.
    pub fn open_span_count(&self) -> usize {
        read(&self.open_spans).len()
    }

    /// All retained samples of one metric, oldest first.
    pub fn metrics(&self, name: &str) -> Vec<MetricSample> {
        read(&self.metrics)
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    pub fn counters(&self) -> TelemetryCounters {
        read(&self.counters).clone()
    }

    /// Prune traces older than a given age.
    pub fn prune_before(&self, cutoff: chrono::DateTime<Utc>) -> usize {
        let mut traces = write(&self.traces);
        let before = traces.len();
        traces.retain(|t| t.started_at >= cutoff);
        before - traces.len()
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservabilityProvider for TelemetryEngine {
    fn start_span(
        &self,
        name: &str,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<SpanHandle, ObservabilityError> {
        let span = Span::new(name, attributes);

        if span.kind == SpanKind::Turn {
            self.start_trace(span.conversation_id().unwrap_or(UNSCOPED));
        }

        let handle = SpanHandle {
            id: span.id.clone(),
            name: span.name.clone(),
            attributes: span.attributes.clone(),
        };
        tracing::trace!(span_id = %handle.id, name = %handle.name, "Span started");
        write(&self.open_spans).insert(span.id.clone(), span);
        Ok(handle)
    }

    fn end_span(&self, handle: SpanHandle, success: bool) -> Result<(), ObservabilityError> {
        let mut span = write(&self.open_spans)
            .remove(&handle.id)
            .ok_or_else(|| ObservabilityError::UnknownSpan(handle.id.clone()))?;
        span.end(success);
        tracing::trace!(
            span_id = %span.id,
            name = %span.name,
            duration_ms = ?span.duration_ms,
            success,
            "Span ended"
        );
        self.record_span(span);
        Ok(())
    }

    fn record_metric(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        tags: BTreeMap<String, String>,
    ) -> Result<(), ObservabilityError> {
        let mut metrics = write(&self.metrics);
        if metrics.len() >= self.max_metrics {
            let excess = metrics.len() + 1 - self.max_metrics;
            metrics.drain(..excess);
        }
        metrics.push(MetricSample {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            tags,
            recorded_at: Utc::now(),
        });
        drop(metrics);
        write(&self.counters).metric_samples += 1;
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
