//! Audit logging: one ordered record per pipeline stage of every tool call.
//!
//! Records are kept in memory for inspection and forwarded to every
//! configured [`AuditSink`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use toolgate_core::{AuditConfig, ToolContext, ToolResult};

use crate::sanitize::{fingerprint, sanitize_arguments};

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub tool_name: String,
    pub conversation_id: String,
    pub request_id: String,
    pub stage: AuditStage,
    pub outcome: AuditOutcome,
    /// Arguments as seen by the tool, sanitized when configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    /// SHA-256 of the raw arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Pipeline stage that produced a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    AccessCheck,
    ArgumentRejection,
    PreExecution,
    PostExecution,
}

/// Outcome of an audited stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Granted,
    Denied,
    Rejected,
    Started,
    Success,
    Failure,
}

/// Trait for audit log sinks (where records are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Records kept in memory by default; sinks see every record regardless.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Ordered audit trail for tool calls.
pub struct AuditLogger {
    config: AuditConfig,
    entries: Mutex<Vec<AuditRecord>>,
    sinks: Vec<Box<dyn AuditSink>>,
    max_entries: usize,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("config", &self.config)
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new(config: AuditConfig) -> Self {
        Self::with_sinks(config, Vec::new())
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(config: AuditConfig, sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
            sinks,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Keep at most `max_entries` records in memory, dropping the oldest.
    pub fn with_retention(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn add_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Record the result of the group-membership check.
    pub fn log_access_check(
        &self,
        context: &ToolContext,
        tool_name: &str,
        granted: bool,
        required_groups: &[String],
    ) {
        if !self.config.enabled || !self.config.log_tool_access_checks {
            return;
        }
        let (outcome, details) = if granted {
            (AuditOutcome::Granted, None)
        } else {
            (
                AuditOutcome::Denied,
                Some(format!("requires one of: {}", required_groups.join(", "))),
            )
        };
        let mut record = base_record(context, tool_name, AuditStage::AccessCheck, outcome);
        record.details = details;
        self.record(record);
    }

    /// Record a veto from argument transformation.
    pub fn log_rejection(&self, context: &ToolContext, tool_name: &str, reason: &str) {
        if !self.config.enabled || !self.config.log_tool_invocations {
            return;
        }
        let mut record = base_record(
            context,
            tool_name,
            AuditStage::ArgumentRejection,
            AuditOutcome::Rejected,
        );
        record.details = Some(reason.to_string());
        self.record(record);
    }

    /// Record an invocation immediately before the tool body runs.
    pub fn log_invocation(&self, context: &ToolContext, tool_name: &str, arguments: &serde_json::Value) {
        if !self.config.enabled || !self.config.log_tool_invocations {
            return;
        }
        let mut record = base_record(
            context,
            tool_name,
            AuditStage::PreExecution,
            AuditOutcome::Started,
        );
        record.arguments = Some(if self.config.sanitize_tool_parameters {
            sanitize_arguments(arguments)
        } else {
            arguments.clone()
        });
        record.arguments_sha256 = Some(fingerprint(arguments));
        self.record(record);
    }

    /// Record the outcome of a tool body.
    pub fn log_result(
        &self,
        context: &ToolContext,
        tool_name: &str,
        result: &ToolResult,
        duration_ms: u64,
    ) {
        if !self.config.enabled || !self.config.log_tool_results {
            return;
        }
        let outcome = if result.success {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        let mut record = base_record(context, tool_name, AuditStage::PostExecution, outcome);
        record.duration_ms = Some(duration_ms);
        record.details = result.error.clone();
        self.record(record);
    }

    /// Append a record and forward it to every sink.
    pub fn record(&self, record: AuditRecord) {
        for sink in &self.sinks {
            sink.record(&record);
        }
        let mut entries = self.lock();
        if entries.len() >= self.max_entries {
            // Drop the oldest tenth at once
            let excess = entries.len() + 1 - self.max_entries;
            let drain_count = excess.max(self.max_entries / 10).min(entries.len());
            entries.drain(..drain_count);
        }
        entries.push(record);
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditRecord> {
        self.lock().clone()
    }

    /// Get entries produced by one stage.
    pub fn entries_for_stage(&self, stage: AuditStage) -> Vec<AuditRecord> {
        self.lock()
            .iter()
            .filter(|e| e.stage == stage)
            .cloned()
            .collect()
    }

    /// Clear all stored entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditRecord>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn base_record(
    context: &ToolContext,
    tool_name: &str,
    stage: AuditStage,
    outcome: AuditOutcome,
) -> AuditRecord {
    AuditRecord {
        timestamp: Utc::now(),
        user_id: context.user.id.clone(),
        tool_name: tool_name.to_string(),
        conversation_id: context.conversation_id.to_string(),
        request_id: context.request_id.clone(),
        stage,
        outcome,
        arguments: None,
        arguments_sha256: None,
        duration_ms: None,
        details: None,
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, record: &AuditRecord) {
        tracing::info!(
            stage = ?record.stage,
            outcome = ?record.outcome,
            user = %record.user_id,
            tool = %record.tool_name,
            conversation_id = %record.conversation_id,
            duration_ms = ?record.duration_ms,
            details = ?record.details,
            "AUDIT"
        );
    }
}

/// Appends each record as one JSON line to a file.
pub struct JsonlFileSink {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl JsonlFileSink {
    /// Open (or create) the audit file in append mode.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlFileSink {
    fn record(&self, record: &AuditRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize audit record");
                return;
            }
        };
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = writeln!(file, "{line}") {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write audit record");
        }
    }
}
