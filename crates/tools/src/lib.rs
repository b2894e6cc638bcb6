//! Tool execution pipeline and built-in tools for toolgate.
//!
//! [`ToolRegistry`] is the only path from a model's tool call to a tool
//! body. Every call passes lookup, group authorization, schema validation,
//! argument transformation and auditing before `execute` runs.

pub mod calculator;
pub mod echo;
pub mod registry;

pub use calculator::{CalcError, CalculatorTool};
pub use echo::EchoTool;
pub use registry::{ExecutedCall, PreparedCall, ReadyCall, ToolRegistry};

use std::sync::Arc;

/// Create a registry holding the built-in tools, open to every group.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in [
        Arc::new(EchoTool) as Arc<dyn toolgate_core::Tool>,
        Arc::new(CalculatorTool),
    ] {
        // Built-in names are distinct
        let _ = registry.register(tool, Vec::new());
    }
    registry
}
