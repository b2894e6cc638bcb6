//! Echo tool: returns its input. Handy for wiring checks.

use async_trait::async_trait;
use serde::Deserialize;
use toolgate_core::{
    ArgType, ArgsSchema, Tool, ToolArgs, ToolContext, ToolError, ToolResult, UiComponent,
};

pub struct EchoTool;

#[derive(Deserialize)]
struct EchoArgs {
    text: String,
    #[serde(default)]
    uppercase: bool,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back unchanged, or uppercased on request."
    }

    fn args_schema(&self) -> ArgsSchema {
        ArgsSchema::new()
            .required("text", ArgType::String, "Text to echo back")
            .optional("uppercase", ArgType::Boolean, "Uppercase the text first")
    }

    async fn execute(&self, _context: &ToolContext, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let args: EchoArgs = args.parse()?;
        let text = if args.uppercase {
            args.text.to_uppercase()
        } else {
            args.text
        };
        Ok(ToolResult::success(text.clone()).with_ui(UiComponent::text(text)))
    }
}
