//! Tool trait: the abstraction over permissioned, side-effecting capabilities.
//!
//! A tool declares its name, description, required access groups and an
//! argument schema. It never authorizes itself; the registry pipeline does
//! that before `execute` is reachable.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::component::UiComponent;
use crate::error::ToolError;
use crate::message::ConversationId;
use crate::user::User;

/// A tool invocation requested by the model. Arguments are untrusted until validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID assigned by the model (matches the tool result message)
    pub id: String,

    pub name: String,

    /// Raw argument payload as supplied by the model
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of one tool invocation.
///
/// `success == false` implies a non-empty `error`; `success == true` implies
/// a non-empty `result_for_llm`. Use the constructors or [`ToolResult::normalized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    /// Text fed back into the model
    pub result_for_llm: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_component: Option<UiComponent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution metadata (e.g. `execution_time_ms`)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

const EMPTY_OUTPUT: &str = "Tool completed with no output.";
const UNKNOWN_FAILURE: &str = "Tool reported a failure without an error message.";

impl ToolResult {
    pub fn success(result_for_llm: impl Into<String>) -> Self {
        Self {
            success: true,
            result_for_llm: result_for_llm.into(),
            ui_component: None,
            error: None,
            metadata: serde_json::Map::new(),
        }
        .normalized()
    }

    /// A failed result whose error text is also what the model sees.
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            result_for_llm: error.clone(),
            ui_component: None,
            error: Some(error),
            metadata: serde_json::Map::new(),
        }
        .normalized()
    }

    pub fn with_ui(mut self, component: UiComponent) -> Self {
        self.ui_component = Some(component);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Restore the success/error invariant on a result built by hand.
    pub fn normalized(mut self) -> Self {
        if self.success {
            if self.result_for_llm.trim().is_empty() {
                self.result_for_llm = EMPTY_OUTPUT.to_string();
            }
        } else {
            let missing = self.error.as_deref().is_none_or(|e| e.trim().is_empty());
            if missing {
                self.error = Some(if self.result_for_llm.trim().is_empty() {
                    UNKNOWN_FAILURE.to_string()
                } else {
                    self.result_for_llm.clone()
                });
            }
            if self.result_for_llm.trim().is_empty() {
                self.result_for_llm = self.error.clone().unwrap_or_default();
            }
        }
        self
    }
}

/// A structured veto of a tool call returned by the argument-transformation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRejection {
    /// Human-readable reason, surfaced verbatim to the model
    pub reason: String,
}

impl ToolRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result of argument transformation: exactly one of adjusted args or a rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Proceed(ToolArgs),
    Reject(ToolRejection),
}

/// Validated tool arguments (always a JSON object).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArgs(serde_json::Map<String, serde_json::Value>);

impl ToolArgs {
    pub fn new(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    /// Wrap a JSON value; anything other than an object is rejected.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ToolError> {
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(ToolError::InvalidArguments(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    /// Deserialize into the tool's own argument type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_value(serde_json::Value::Object(self.0.clone()))
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        serde_json::Value::Object(self.0)
    }
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// JSON type of a declared argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ArgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArgType,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// Argument schema descriptor: field name → type, required flag, description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgsSchema {
    pub fields: Vec<ArgField>,
}

impl ArgsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, ty: ArgType, description: impl Into<String>) -> Self {
        self.fields.push(ArgField {
            name: name.into(),
            ty,
            required: true,
            description: description.into(),
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, ty: ArgType, description: impl Into<String>) -> Self {
        self.fields.push(ArgField {
            name: name.into(),
            ty,
            required: false,
            description: description.into(),
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&ArgField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render as a JSON Schema object for the model and for validation.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for field in &self.fields {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), field.ty.as_str().into());
            if !field.description.is_empty() {
                prop.insert("description".into(), field.description.clone().into());
            }
            properties.insert(field.name.clone(), serde_json::Value::Object(prop));
        }
        let required: Vec<serde_json::Value> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.clone().into())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool descriptor offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_groups: Vec<String>,
}

/// Per-invocation bundle handed to a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContext {
    pub user: User,
    pub conversation_id: ConversationId,
    pub request_id: String,
    /// Data injected by context enrichers and the agent
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolContext {
    pub fn new(user: User, conversation_id: ConversationId, request_id: impl Into<String>) -> Self {
        Self {
            user,
            conversation_id,
            request_id: request_id.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, the key the model uses (e.g. "run_sql").
    fn name(&self) -> &str;

    /// Natural-language description shown to the model.
    fn description(&self) -> &str;

    /// Groups permitted to use this tool. Empty means public.
    fn access_groups(&self) -> Vec<String> {
        Vec::new()
    }

    fn args_schema(&self) -> ArgsSchema;

    /// Run the tool with validated, transformed arguments.
    ///
    /// Expected failures should come back as `Ok(ToolResult::failure(..))`.
    async fn execute(&self, context: &ToolContext, args: ToolArgs) -> Result<ToolResult, ToolError>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.args_schema().to_json_schema(),
            access_groups: self.access_groups(),
        }
    }
}

/// Rewrites or vetoes arguments after validation and before execution.
///
/// Used for row-level security: scoping a query to the caller's region,
/// injecting a tenant id, or refusing a call outright.
#[async_trait]
pub trait ArgumentTransformer: Send + Sync {
    async fn transform_args(
        &self,
        tool: &dyn Tool,
        args: ToolArgs,
        context: &ToolContext,
    ) -> TransformOutcome;
}

/// Passes arguments through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

#[async_trait]
impl ArgumentTransformer for IdentityTransformer {
    async fn transform_args(
        &self,
        _tool: &dyn Tool,
        args: ToolArgs,
        _context: &ToolContext,
    ) -> TransformOutcome {
        TransformOutcome::Proceed(args)
    }
}
