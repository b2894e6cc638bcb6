//! The tool execution pipeline.
//!
//! `execute` runs seven stages in order and never returns an error; every
//! failure becomes a failed [`ToolResult`] the model can read:
//!
//! 1. lookup by name
//! 2. group authorization (audited either way)
//! 3. JSON Schema validation of the raw arguments
//! 4. argument transformation, which may veto the call (audited)
//! 5. pre-execution audit
//! 6. the tool body, timed, with errors and panics caught
//! 7. post-execution audit
//!
//! A call that stops at stage 2, 3 or 4 never reaches the tool body.

use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use toolgate_core::{
    ArgsSchema, ArgumentTransformer, IdentityTransformer, Tool, ToolArgs, ToolCall, ToolContext,
    ToolError, ToolResult, ToolSchema, TransformOutcome, User,
};
use toolgate_security::AuditLogger;
use tracing::{debug, error, warn};

struct Registered {
    tool: Arc<dyn Tool>,
    validator: jsonschema::Validator,
}

/// Registry of permissioned tools and the single entry point for running them.
pub struct ToolRegistry {
    tools: BTreeMap<String, Registered>,
    transformer: Arc<dyn ArgumentTransformer>,
    audit: Option<Arc<AuditLogger>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of stages 1–5.
pub enum PreparedCall {
    /// Authorized, validated and audited; ready for the tool body.
    Ready(ReadyCall),
    /// Stopped before execution.
    Finished(ToolResult),
}

/// A call that passed every check.
pub struct ReadyCall {
    pub call: ToolCall,
    pub context: ToolContext,
    pub tool: Arc<dyn Tool>,
    pub args: ToolArgs,
}

/// A tool body's outcome, not yet audited.
pub struct ExecutedCall {
    pub ready: ReadyCall,
    pub result: ToolResult,
    pub elapsed: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            transformer: Arc::new(IdentityTransformer),
            audit: None,
        }
    }

    /// Replace the argument transformer (identity by default).
    pub fn with_transformer(mut self, transformer: Arc<dyn ArgumentTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_audit_logger(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn audit_logger(&self) -> Option<&Arc<AuditLogger>> {
        self.audit.as_ref()
    }

    /// Register a tool.
    ///
    /// Non-empty `access_groups` replace the groups the tool declares itself.
    pub fn register(&mut self, tool: Arc<dyn Tool>, access_groups: Vec<String>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }

        let tool: Arc<dyn Tool> = if access_groups.is_empty() {
            tool
        } else {
            Arc::new(AccessGroupOverride {
                inner: tool,
                access_groups,
            })
        };

        let schema = tool.args_schema().to_json_schema();
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            ToolError::InvalidArguments(format!("tool '{name}' declares an invalid argument schema: {e}"))
        })?;

        debug!(tool = %name, groups = ?tool.access_groups(), "Registered tool");
        self.tools.insert(name, Registered { tool, validator });
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|r| r.tool.clone())
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether `user` may invoke `tool`.
    pub fn is_permitted(tool: &dyn Tool, user: &User) -> bool {
        user.is_member_of_any(&tool.access_groups())
    }

    /// Descriptors of the tools `user` may invoke, for the model request.
    pub fn schemas_for(&self, user: &User) -> Vec<ToolSchema> {
        self.tools
            .values()
            .filter(|r| Self::is_permitted(r.tool.as_ref(), user))
            .map(|r| r.tool.schema())
            .collect()
    }

    /// Run one call through the full pipeline.
    pub async fn execute(&self, call: &ToolCall, context: &ToolContext) -> ToolResult {
        match self.prepare(call, context).await {
            PreparedCall::Ready(ready) => {
                let executed = self.run(ready).await;
                self.complete(executed)
            }
            PreparedCall::Finished(result) => result,
        }
    }

    /// Run several calls: checks and pre-execution audits in order, bodies
    /// concurrently, post-execution audits in order. Results match input order.
    pub async fn execute_all(&self, calls: &[(ToolCall, ToolContext)]) -> Vec<ToolResult> {
        let mut prepared = Vec::with_capacity(calls.len());
        for (call, context) in calls {
            prepared.push(self.prepare(call, context).await);
        }

        let outcomes = futures::future::join_all(prepared.into_iter().map(|p| async move {
            match p {
                PreparedCall::Ready(ready) => Ok(self.run(ready).await),
                PreparedCall::Finished(result) => Err(result),
            }
        }))
        .await;

        outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Ok(executed) => self.complete(executed),
                Err(result) => result,
            })
            .collect()
    }

    /// Stages 1–5.
    pub async fn prepare(&self, call: &ToolCall, context: &ToolContext) -> PreparedCall {
        // 1. Lookup
        let Some(entry) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, user = %context.user.id, "Model requested unknown tool");
            return PreparedCall::Finished(ToolResult::failure(format!(
                "Tool '{}' not found",
                call.name
            )));
        };
        let tool = entry.tool.clone();

        // 2. Authorization
        let required = tool.access_groups();
        let granted = context.user.is_member_of_any(&required);
        if let Some(audit) = &self.audit {
            audit.log_access_check(context, &call.name, granted, &required);
        }
        if !granted {
            warn!(
                tool = %call.name,
                user = %context.user.id,
                required = ?required,
                "Tool access denied"
            );
            return PreparedCall::Finished(ToolResult::failure(format!(
                "Insufficient group access for tool '{}' (requires one of: {})",
                call.name,
                required.join(", ")
            )));
        }

        // 3. Validation
        let raw = if call.arguments.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            call.arguments.clone()
        };
        let violation = entry
            .validator
            .iter_errors(&raw)
            .next()
            .map(|e| describe_violation(&e.to_string(), &e.instance_path.to_string()));
        if let Some(reason) = violation {
            debug!(tool = %call.name, %reason, "Tool arguments failed validation");
            return PreparedCall::Finished(ToolResult::failure(format!("Invalid arguments: {reason}")));
        }
        let args = match ToolArgs::from_value(raw) {
            Ok(args) => args,
            Err(e) => {
                return PreparedCall::Finished(ToolResult::failure(format!(
                    "Invalid arguments: {}",
                    error_text(&e)
                )));
            }
        };

        // 4. Transformation
        let args = match self.transformer.transform_args(tool.as_ref(), args, context).await {
            TransformOutcome::Proceed(args) => args,
            TransformOutcome::Reject(rejection) => {
                if let Some(audit) = &self.audit {
                    audit.log_rejection(context, &call.name, &rejection.reason);
                }
                return PreparedCall::Finished(ToolResult::failure(rejection.reason));
            }
        };

        // 5. Pre-execution audit
        if let Some(audit) = &self.audit {
            audit.log_invocation(context, &call.name, &serde_json::Value::Object(args.as_map().clone()));
        }

        PreparedCall::Ready(ReadyCall {
            call: call.clone(),
            context: context.clone(),
            tool,
            args,
        })
    }

    /// Stage 6. Errors and panics become failed results.
    pub async fn run(&self, ready: ReadyCall) -> ExecutedCall {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(ready.tool.execute(&ready.context, ready.args.clone()))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(Ok(result)) => result.normalized(),
            Ok(Err(e)) => {
                warn!(tool = %ready.call.name, error = %e, "Tool execution failed");
                ToolResult::failure(format!("Execution failed: {}", error_text(&e)))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(tool = %ready.call.name, panic = %message, "Tool panicked");
                ToolResult::failure(format!("Execution failed: tool panicked: {message}"))
            }
        };

        ExecutedCall {
            ready,
            result,
            elapsed,
        }
    }

    /// Stage 7. Stamps `execution_time_ms` and writes the post-execution audit.
    pub fn complete(&self, executed: ExecutedCall) -> ToolResult {
        let ExecutedCall {
            ready,
            mut result,
            elapsed,
        } = executed;

        let ms = elapsed.as_secs_f64() * 1000.0;
        result
            .metadata
            .insert("execution_time_ms".into(), serde_json::json!(ms));

        if let Some(audit) = &self.audit {
            audit.log_result(&ready.context, &ready.call.name, &result, elapsed.as_millis() as u64);
        }
        debug!(
            tool = %ready.call.name,
            success = result.success,
            execution_time_ms = ms,
            "Tool call finished"
        );
        result
    }
}

fn describe_violation(message: &str, path: &str) -> String {
    if path.is_empty() {
        message.to_string()
    } else {
        format!("{message} (at {path})")
    }
}

fn error_text(e: &ToolError) -> String {
    match e {
        ToolError::ExecutionFailed { reason, .. } => reason.clone(),
        ToolError::InvalidArguments(reason) => reason.clone(),
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Wraps a tool to replace its declared access groups.
struct AccessGroupOverride {
    inner: Arc<dyn Tool>,
    access_groups: Vec<String>,
}

#[async_trait]
impl Tool for AccessGroupOverride {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn access_groups(&self) -> Vec<String> {
        self.access_groups.clone()
    }

    fn args_schema(&self) -> ArgsSchema {
        self.inner.args_schema()
    }

    async fn execute(&self, context: &ToolContext, args: ToolArgs) -> Result<ToolResult, ToolError> {
        self.inner.execute(context, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolgate_core::{ArgType, AuditConfig, ConversationId};
    use toolgate_security::{
        AttributeScopeTransformer, AuditOutcome, AuditStage, ScopeMode, ScopeRule,
    };

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Error,
        Panic,
    }

    /// Counts invocations and records the arguments it received.
    struct SpyTool {
        name: &'static str,
        groups: Vec<String>,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl SpyTool {
        fn new(name: &'static str, groups: &[&str], behavior: Behavior) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let tool = Self {
                name,
                groups: groups.iter().map(|g| g.to_string()).collect(),
                behavior,
                calls: calls.clone(),
            };
            (tool, calls)
        }
    }

    #[async_trait]
    impl Tool for SpyTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "spy"
        }
        fn access_groups(&self) -> Vec<String> {
            self.groups.clone()
        }
        fn args_schema(&self) -> ArgsSchema {
            ArgsSchema::new()
                .required("sql", ArgType::String, "Query text")
                .optional("limit", ArgType::Integer, "")
        }
        async fn execute(&self, _ctx: &ToolContext, args: ToolArgs) -> Result<ToolResult, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(ToolResult::success(format!(
                    "ran {}",
                    args.get_str("sql").unwrap_or_default()
                ))),
                Behavior::Fail => Ok(ToolResult::failure("no rows")),
                Behavior::Error => Err(ToolError::ExecutionFailed {
                    tool_name: self.name.into(),
                    reason: "database unreachable".into(),
                }),
                Behavior::Panic => panic!("index out of bounds"),
            }
        }
    }

    fn context(user: User) -> ToolContext {
        ToolContext::new(user, ConversationId::from("c1"), "req-1")
    }

    fn audited(registry: ToolRegistry) -> (ToolRegistry, Arc<AuditLogger>) {
        let audit = Arc::new(AuditLogger::new(AuditConfig::default()));
        (registry.with_audit_logger(audit.clone()), audit)
    }

    fn stages(audit: &AuditLogger) -> Vec<(AuditStage, AuditOutcome)> {
        audit.entries().iter().map(|e| (e.stage, e.outcome)).collect()
    }

    #[tokio::test]
    async fn successful_call_is_audited_and_timed() {
        let (tool, calls) = SpyTool::new("run_sql", &[], Behavior::Succeed);
        let (mut registry, audit) = audited(ToolRegistry::new());
        registry.register(Arc::new(tool), vec![]).unwrap();

        let call = ToolCall::new("call_1", "run_sql", json!({"sql": "SELECT 1"}));
        let result = registry.execute(&call, &context(User::new("alice"))).await;

        assert!(result.success);
        assert_eq!(result.result_for_llm, "ran SELECT 1");
        assert!(result.metadata["execution_time_ms"].is_number());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            stages(&audit),
            vec![
                (AuditStage::AccessCheck, AuditOutcome::Granted),
                (AuditStage::PreExecution, AuditOutcome::Started),
                (AuditStage::PostExecution, AuditOutcome::Success),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_audit() {
        let (registry, audit) = audited(ToolRegistry::new());
        let call = ToolCall::new("call_1", "missing", json!({}));
        let result = registry.execute(&call, &context(User::new("alice"))).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool 'missing' not found"));
        assert_eq!(audit.count(), 0);
    }

    #[tokio::test]
    async fn permission_denied_never_executes() {
        let (tool, calls) = SpyTool::new("drop_table", &["admin"], Behavior::Succeed);
        let (mut registry, audit) = audited(ToolRegistry::new());
        registry.register(Arc::new(tool), vec![]).unwrap();

        let viewer = User::new("v").with_groups(["viewer"]);
        let call = ToolCall::new("call_1", "drop_table", json!({"sql": "DROP TABLE x"}));
        let result = registry.execute(&call, &context(viewer)).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Insufficient group access for tool 'drop_table' (requires one of: admin)")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stages(&audit), vec![(AuditStage::AccessCheck, AuditOutcome::Denied)]);
    }

    #[tokio::test]
    async fn invalid_arguments_never_execute() {
        let (tool, calls) = SpyTool::new("run_sql", &[], Behavior::Succeed);
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(tool), vec![]).unwrap();
        let ctx = context(User::new("alice"));

        let missing = registry
            .execute(&ToolCall::new("c", "run_sql", json!({"limit": 5})), &ctx)
            .await;
        assert!(missing.error.as_deref().unwrap().starts_with("Invalid arguments:"));
        assert!(missing.error.as_deref().unwrap().contains("sql"));

        let wrong_type = registry
            .execute(&ToolCall::new("c", "run_sql", json!({"sql": "x", "limit": "ten"})), &ctx)
            .await;
        assert!(wrong_type.error.as_deref().unwrap().contains("/limit"));

        let not_object = registry
            .execute(&ToolCall::new("c", "run_sql", json!(["SELECT 1"])), &ctx)
            .await;
        assert!(!not_object.success);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejection_never_executes() {
        let (tool, calls) = SpyTool::new("run_sql", &[], Behavior::Succeed);
        let scoping = AttributeScopeTransformer::new(vec![ScopeRule {
            tool: "run_sql".into(),
            attribute: "region".into(),
            argument: "sql".into(),
            mode: ScopeMode::SqlPredicate,
            column: None,
        }]);
        let (mut registry, audit) = audited(ToolRegistry::new().with_transformer(Arc::new(scoping)));
        registry.register(Arc::new(tool), vec![]).unwrap();

        let call = ToolCall::new("c", "run_sql", json!({"sql": "SELECT * FROM sales"}));
        let result = registry.execute(&call, &context(User::new("alice"))).await;
        assert_eq!(
            result.error.as_deref(),
            Some("User must have a 'region' attribute assigned")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            stages(&audit),
            vec![
                (AuditStage::AccessCheck, AuditOutcome::Granted),
                (AuditStage::ArgumentRejection, AuditOutcome::Rejected),
            ]
        );

        let scoped_user = User::new("bob").with_attribute("region", json!("emea"));
        let result = registry.execute(&call, &context(scoped_user)).await;
        assert_eq!(result.result_for_llm, "ran SELECT * FROM sales WHERE region = 'emea'");
    }

    /// One event log shared by a transformer and a tool.
    #[derive(Clone, Default)]
    struct EventLog(Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl EventLog {
        fn push(&self, event: &'static str) {
            self.0.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    struct RewritingTransformer(EventLog);

    #[async_trait]
    impl ArgumentTransformer for RewritingTransformer {
        async fn transform_args(
            &self,
            _tool: &dyn Tool,
            mut args: ToolArgs,
            _context: &ToolContext,
        ) -> TransformOutcome {
            self.0.push("transform");
            args.insert("sql", json!("SELECT 2"));
            TransformOutcome::Proceed(args)
        }
    }

    struct LoggedTool(EventLog);

    #[async_trait]
    impl Tool for LoggedTool {
        fn name(&self) -> &str {
            "logged"
        }
        fn description(&self) -> &str {
            "logs its execution"
        }
        fn args_schema(&self) -> ArgsSchema {
            ArgsSchema::new().required("sql", ArgType::String, "Query text")
        }
        async fn execute(&self, _ctx: &ToolContext, args: ToolArgs) -> Result<ToolResult, ToolError> {
            self.0.push("execute");
            Ok(ToolResult::success(args.get_str("sql").unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn transformer_runs_once_before_the_tool_body() {
        let log = EventLog::default();
        let mut registry =
            ToolRegistry::new().with_transformer(Arc::new(RewritingTransformer(log.clone())));
        registry.register(Arc::new(LoggedTool(log.clone())), vec![]).unwrap();

        let call = ToolCall::new("c", "logged", json!({"sql": "SELECT 1"}));
        let result = registry.execute(&call, &context(User::new("alice"))).await;

        assert_eq!(result.result_for_llm, "SELECT 2");
        assert_eq!(log.events(), vec!["transform", "execute"]);

        // Denied and invalid calls never reach the transformer.
        let mut locked = ToolRegistry::new().with_transformer(Arc::new(RewritingTransformer(log.clone())));
        let (admin_tool, _) = SpyTool::new("run_sql", &["admin"], Behavior::Succeed);
        locked.register(Arc::new(admin_tool), vec![]).unwrap();
        locked
            .execute(&ToolCall::new("c", "run_sql", json!({"sql": "x"})), &context(User::new("v")))
            .await;
        registry
            .execute(&ToolCall::new("c", "logged", json!({"sql": 7})), &context(User::new("alice")))
            .await;
        assert_eq!(log.events(), vec!["transform", "execute"]);
    }

    #[tokio::test]
    async fn tool_errors_are_caught() {
        let (tool, _) = SpyTool::new("run_sql", &[], Behavior::Error);
        let (mut registry, audit) = audited(ToolRegistry::new());
        registry.register(Arc::new(tool), vec![]).unwrap();

        let call = ToolCall::new("c", "run_sql", json!({"sql": "SELECT 1"}));
        let result = registry.execute(&call, &context(User::new("alice"))).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Execution failed: database unreachable"));
        assert_eq!(result.result_for_llm, result.error.clone().unwrap());
        assert_eq!(audit.entries()[2].outcome, AuditOutcome::Failure);
    }

    #[tokio::test]
    async fn tool_panics_are_caught() {
        let (tool, _) = SpyTool::new("run_sql", &[], Behavior::Panic);
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(tool), vec![]).unwrap();

        let call = ToolCall::new("c", "run_sql", json!({"sql": "SELECT 1"}));
        let result = registry.execute(&call, &context(User::new("alice"))).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("index out of bounds"));
    }

    #[tokio::test]
    async fn tool_reported_failures_pass_through() {
        let (tool, _) = SpyTool::new("run_sql", &[], Behavior::Fail);
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(tool), vec![]).unwrap();
        let result = registry
            .execute(&ToolCall::new("c", "run_sql", json!({"sql": "x"})), &context(User::new("a")))
            .await;
        assert_eq!(result.error.as_deref(), Some("no rows"));
    }

    #[tokio::test]
    async fn registration_groups_override_declared_groups() {
        let (tool, _) = SpyTool::new("run_sql", &["admin"], Behavior::Succeed);
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(tool), vec!["analyst".into()]).unwrap();

        let analyst = User::new("a").with_groups(["analyst"]);
        let admin = User::new("b").with_groups(["admin"]);
        assert_eq!(registry.schemas_for(&analyst).len(), 1);
        assert!(registry.schemas_for(&admin).is_empty());
        assert_eq!(registry.get("run_sql").unwrap().access_groups(), vec!["analyst"]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        let (first, _) = SpyTool::new("run_sql", &[], Behavior::Succeed);
        let (second, _) = SpyTool::new("run_sql", &[], Behavior::Succeed);
        registry.register(Arc::new(first), vec![]).unwrap();
        assert!(matches!(
            registry.register(Arc::new(second), vec![]),
            Err(ToolError::AlreadyRegistered(name)) if name == "run_sql"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn schemas_are_filtered_by_group() {
        let mut registry = ToolRegistry::new();
        let (public, _) = SpyTool::new("public", &[], Behavior::Succeed);
        let (admin, _) = SpyTool::new("admin_only", &["admin"], Behavior::Succeed);
        registry.register(Arc::new(public), vec![]).unwrap();
        registry.register(Arc::new(admin), vec![]).unwrap();

        let viewer = User::new("v").with_groups(["viewer"]);
        let names: Vec<String> = registry.schemas_for(&viewer).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["public"]);

        let root = User::new("r").with_groups(["admin"]);
        assert_eq!(registry.schemas_for(&root).len(), 2);
    }

    #[tokio::test]
    async fn batch_preserves_call_order_in_results_and_audit() {
        let (ok, ok_calls) = SpyTool::new("ok", &[], Behavior::Succeed);
        let (locked, locked_calls) = SpyTool::new("locked", &["admin"], Behavior::Succeed);
        let (broken, _) = SpyTool::new("broken", &[], Behavior::Error);
        let (mut registry, audit) = audited(ToolRegistry::new());
        registry.register(Arc::new(ok), vec![]).unwrap();
        registry.register(Arc::new(locked), vec![]).unwrap();
        registry.register(Arc::new(broken), vec![]).unwrap();

        let ctx = context(User::new("alice"));
        let calls = vec![
            (ToolCall::new("1", "broken", json!({"sql": "a"})), ctx.clone()),
            (ToolCall::new("2", "locked", json!({"sql": "b"})), ctx.clone()),
            (ToolCall::new("3", "ok", json!({"sql": "c"})), ctx.clone()),
        ];
        let results = registry.execute_all(&calls).await;

        assert!(!results[0].success);
        assert!(results[1].error.as_deref().unwrap().starts_with("Insufficient group access"));
        assert_eq!(results[2].result_for_llm, "ran c");
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
        assert_eq!(locked_calls.load(Ordering::SeqCst), 0);

        let trail: Vec<(String, AuditStage)> = audit
            .entries()
            .into_iter()
            .map(|e| (e.tool_name, e.stage))
            .collect();
        assert_eq!(
            trail,
            vec![
                ("broken".into(), AuditStage::AccessCheck),
                ("broken".into(), AuditStage::PreExecution),
                ("locked".into(), AuditStage::AccessCheck),
                ("ok".into(), AuditStage::AccessCheck),
                ("ok".into(), AuditStage::PreExecution),
                ("broken".into(), AuditStage::PostExecution),
                ("ok".into(), AuditStage::PostExecution),
            ]
        );
    }
}
