//! Agent, audit and UI-feature configuration types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::user::User;

/// Iteration and size limits plus behavior toggles for the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum LLM ↔ tool round trips per turn
    #[serde(default = "default_max_iterations")]
    pub max_tool_iterations: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temp")]
    pub temperature: f32,

    /// Use `stream_request` instead of `send_request`
    #[serde(default)]
    pub stream_responses: bool,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Wall-clock bound for a whole turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_timeout_secs: Option<u64>,

    /// Retries for a failed LLM call before the turn fails
    #[serde(default = "default_llm_retries")]
    pub llm_max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub llm_retry_backoff_ms: u64,

    /// Execute tool bodies of one model turn concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,

    /// Keep only the most recent N messages in requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_history_messages: Option<usize>,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temp() -> f32 {
    0.7
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help answer the user's request.".into()
}
fn default_llm_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    250
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_iterations(),
            max_tokens: default_max_tokens(),
            temperature: default_temp(),
            stream_responses: false,
            system_prompt: default_system_prompt(),
            turn_timeout_secs: None,
            llm_max_retries: default_llm_retries(),
            llm_retry_backoff_ms: default_retry_backoff_ms(),
            parallel_tool_calls: false,
            max_history_messages: None,
        }
    }
}

/// Which tool activity the registry records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub log_tool_access_checks: bool,

    #[serde(default = "default_true")]
    pub log_tool_invocations: bool,

    #[serde(default = "default_true")]
    pub log_tool_results: bool,

    /// Redact sensitive argument values in invocation records
    #[serde(default = "default_true")]
    pub sanitize_tool_parameters: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_tool_access_checks: true,
            log_tool_invocations: true,
            log_tool_results: true,
            sanitize_tool_parameters: true,
        }
    }
}

/// UI feature visibility rules: feature name → groups allowed to see it.
///
/// An empty group list makes the feature visible to everyone; a feature
/// missing from the map is visible to no one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiFeatures(pub BTreeMap<String, Vec<String>>);

impl UiFeatures {
    pub const TOOL_NAMES: &'static str = "tool_names";
    pub const TOOL_ARGUMENTS: &'static str = "tool_arguments";
    pub const TOOL_ERRORS: &'static str = "tool_errors";
    pub const TOOL_INVOCATION_STATUS: &'static str = "tool_invocation_status";

    pub fn is_visible(&self, feature: &str, user: &User) -> bool {
        self.0
            .get(feature)
            .is_some_and(|groups| user.is_member_of_any(groups))
    }

    /// Names of every feature `user` may see, sorted.
    pub fn available_for(&self, user: &User) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, groups)| user.is_member_of_any(groups.iter()))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Default for UiFeatures {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(Self::TOOL_NAMES.to_string(), vec![]);
        map.insert(Self::TOOL_INVOCATION_STATUS.to_string(), vec![]);
        map.insert(Self::TOOL_ARGUMENTS.to_string(), vec!["admin".to_string()]);
        map.insert(Self::TOOL_ERRORS.to_string(), vec!["admin".to_string()]);
        Self(map)
    }
}
