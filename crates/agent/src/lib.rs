//! The toolgate turn loop.
//!
//! [`Agent::send_message`] drives one user message through a bounded
//! **Call → Act → Observe** cycle:
//!
//! 1. **Resolve** the user from request metadata (no anonymous fallback)
//! 2. **Load** the conversation, or start a new one
//! 3. **Build** a request from the system prompt, filtered history and the
//!    tools this user may call
//! 4. **Call** the model, through middlewares and the recovery strategy
//! 5. **If tool calls**: run each through the [`ToolRegistry`] pipeline,
//!    append the results, loop back to step 3
//! 6. **If text**: persist and emit the answer
//!
//! The loop stops after `max_tool_iterations` rounds with a truncation
//! status. Output is streamed as [`UiComponent`]s over a channel.
//!
//! [`ToolRegistry`]: toolgate_tools::ToolRegistry
//! [`UiComponent`]: toolgate_core::UiComponent

pub mod agent;
pub mod filters;
pub mod prompt;
pub mod recovery;

#[cfg(test)]
mod test_helpers;

pub use agent::{Agent, AgentBuilder, TurnOutput, UiStream, collect_turn};
pub use filters::MaxHistoryFilter;
pub use prompt::DefaultSystemPromptBuilder;
pub use recovery::RetryPolicy;
