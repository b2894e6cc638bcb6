//! Error types for the toolgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`AgentError`] is the
//! turn-level error delivered to the caller of `send_message`.

use thiserror::Error;

/// Errors that end a turn. Only these ever reach the consumer of a UI stream.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("Lifecycle hook failed: {0}")]
    Hook(#[from] HookError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Conversation store error: {0}")]
    Store(#[from] StoreError),

    #[error("Turn exceeded its wall-clock limit of {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("LLM middleware '{middleware}' failed: {reason}")]
    Middleware { middleware: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for turn-level operations.
pub type Result<T> = std::result::Result<T, AgentError>;

// --- Bounded context errors ---

/// Raised by a [`UserResolver`](crate::user::UserResolver).
///
/// Never degraded into an anonymous user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("malformed credentials: {0}")]
    Malformed(String),

    #[error("invalid or expired credentials")]
    InvalidCredentials,
}

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Errors raised around tool registration and execution.
///
/// `execute` failures are converted into a failed `ToolResult` by the
/// registry; they never propagate to the agent.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool '{0}' already registered")]
    AlreadyRegistered(String),

    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation {conversation_id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        conversation_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Conversation {0} belongs to another user")]
    Forbidden(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Raised by a lifecycle hook to abort the turn.
#[derive(Debug, Clone, Error)]
#[error("hook '{hook}' aborted the turn: {reason}")]
pub struct HookError {
    pub hook: String,
    pub reason: String,
}

impl HookError {
    pub fn new(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

/// Raised by an observability sink. Logged, never fatal.
#[derive(Debug, Clone, Error)]
pub enum ObservabilityError {
    #[error("unknown span id: {0}")]
    UnknownSpan(String),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_error_displays_correctly() {
        let err = AgentError::Llm(LlmError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn retryable_classification() {
        assert!(LlmError::RateLimited { retry_after_secs: 1 }.is_retryable());
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(
            LlmError::ApiError {
                status_code: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::ApiError {
                status_code: 400,
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("garbage".into()).is_retryable());
    }

    #[test]
    fn auth_error_converts_into_agent_error() {
        let err: AgentError = AuthError::InvalidCredentials.into();
        assert!(matches!(err, AgentError::Authentication(_)));
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn hook_error_names_the_hook() {
        let err = AgentError::Hook(HookError::new("before_message", "blocked word"));
        assert!(err.to_string().contains("before_message"));
        assert!(err.to_string().contains("blocked word"));
    }
}
