//! Execution tracing and metrics for toolgate.
//!
//! Provides span-based tracing of every agent action (turns, LLM calls,
//! tool executions) grouped into per-conversation traces, plus metric
//! samples and running counters. [`TelemetryEngine`] implements
//! [`toolgate_core::ObservabilityProvider`] so it plugs straight into an agent.

pub mod engine;
pub mod model;

pub use engine::{TelemetryCounters, TelemetryEngine};
pub use model::{MetricSample, Span, SpanKind, Trace};
