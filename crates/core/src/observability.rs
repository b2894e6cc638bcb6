//! ObservabilityProvider trait: span and metric sinks.
//!
//! Called around LLM calls and tool executions. A failing sink must never
//! abort a turn; callers log the error and continue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ObservabilityError;

/// Handle for an open span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanHandle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

pub trait ObservabilityProvider: Send + Sync {
    fn start_span(
        &self,
        name: &str,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<SpanHandle, ObservabilityError>;

    fn end_span(&self, span: SpanHandle, success: bool) -> Result<(), ObservabilityError>;

    fn record_metric(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        tags: BTreeMap<String, String>,
    ) -> Result<(), ObservabilityError>;
}

/// Discards everything.
pub struct NoopObservability;

impl ObservabilityProvider for NoopObservability {
    fn start_span(
        &self,
        name: &str,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<SpanHandle, ObservabilityError> {
        Ok(SpanHandle {
            id: String::new(),
            name: name.to_string(),
            attributes,
        })
    }

    fn end_span(&self, _span: SpanHandle, _success: bool) -> Result<(), ObservabilityError> {
        Ok(())
    }

    fn record_metric(
        &self,
        _name: &str,
        _value: f64,
        _unit: &str,
        _tags: BTreeMap<String, String>,
    ) -> Result<(), ObservabilityError> {
        Ok(())
    }
}
