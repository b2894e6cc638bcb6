//! # toolgate core
//!
//! Domain types, collaborator traits, and error definitions for the toolgate
//! tool-calling runtime. This crate has **no framework dependencies**; it
//! defines the domain model all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model backend, user resolver, conversation
//! store, observability sink, lifecycle hook) is a trait here.
//! Implementations live in their own crates or in the embedding application,
//! which keeps the dependency graph pointing inward and makes every
//! collaborator easy to stub in tests.

pub mod agent;
pub mod component;
pub mod error;
pub mod hooks;
pub mod llm;
pub mod message;
pub mod observability;
pub mod store;
pub mod tool;
pub mod user;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, AuditConfig, UiFeatures};
pub use component::{RichComponent, Severity, SimpleComponent, UiComponent};
pub use error::{
    AgentError, AuthError, HookError, LlmError, ObservabilityError, Result, StoreError, ToolError,
};
pub use hooks::{
    ContextEnricher, ConversationFilter, ErrorRecoveryStrategy, LifecycleHook, LlmMiddleware,
    RecoveryAction, SystemPromptBuilder,
};
pub use llm::{LlmRequest, LlmResponse, LlmService, StreamChunk, Usage};
pub use message::{Conversation, ConversationId, Message, Role};
pub use observability::{NoopObservability, ObservabilityProvider, SpanHandle};
pub use store::ConversationStore;
pub use tool::{
    ArgField, ArgType, ArgsSchema, ArgumentTransformer, IdentityTransformer, Tool, ToolArgs,
    ToolCall, ToolContext, ToolRejection, ToolResult, ToolSchema, TransformOutcome,
};
pub use user::{RequestContext, StaticUserResolver, User, UserResolver};
