//! End-to-end integration tests for the toolgate runtime.
//!
//! These tests exercise the full path from request metadata to streamed UI
//! components: authentication, the registry pipeline, row-level scoping,
//! auditing and conversation persistence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use toolgate_agent::{Agent, RetryPolicy, collect_turn};
use toolgate_config::AppConfig;
use toolgate_core::{
    AgentError, ArgType, ArgsSchema, ConversationId, ConversationStore, LlmError, LlmRequest,
    LlmResponse, LlmService, RequestContext, Role, StaticUserResolver, Tool, ToolArgs, ToolCall,
    ToolContext, ToolError, ToolResult, User,
};
use toolgate_memory::{FileConversationStore, InMemoryConversationStore};
use toolgate_security::{
    AttributeScopeTransformer, AuditLogger, AuditOutcome, AuditStage, TokenUserResolver,
};
use toolgate_tools::{ToolRegistry, default_registry};

// ── Scripted LLM ─────────────────────────────────────────────────────────

/// Returns scripted responses in sequence.
struct ScriptedLlm {
    responses: Mutex<Vec<LlmResponse>>,
    call_count: AtomicUsize,
}

impl ScriptedLlm {
    fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: AtomicUsize::new(0),
        }
    }

    fn text(answer: &str) -> Self {
        Self::new(vec![LlmResponse::text(answer)])
    }

    fn tool_then_text(calls: Vec<ToolCall>, answer: &str) -> Self {
        Self::new(vec![LlmResponse::tool_calls(calls), LlmResponse::text(answer)])
    }

    fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn send_request(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().unwrap();
        responses.get(n).cloned().ok_or_else(|| {
            LlmError::InvalidResponse(format!("script exhausted at call #{n}"))
        })
    }
}

// ── Spy tools ────────────────────────────────────────────────────────────

/// Counts body executions; optionally fails with an error.
struct SpyTool {
    name: &'static str,
    groups: Vec<String>,
    fail_with: Option<&'static str>,
    runs: AtomicUsize,
}

impl SpyTool {
    fn new(name: &'static str, groups: &[&str]) -> Self {
        Self {
            name,
            groups: groups.iter().map(|g| g.to_string()).collect(),
            fail_with: None,
            runs: AtomicUsize::new(0),
        }
    }

    fn failing(name: &'static str, message: &'static str) -> Self {
        Self {
            fail_with: Some(message),
            ..Self::new(name, &[])
        }
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SpyTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Spy tool"
    }

    fn access_groups(&self) -> Vec<String> {
        self.groups.clone()
    }

    fn args_schema(&self) -> ArgsSchema {
        ArgsSchema::new()
    }

    async fn execute(&self, _context: &ToolContext, _args: ToolArgs) -> Result<ToolResult, ToolError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.fail_with {
            Some(message) => Err(ToolError::ExecutionFailed {
                tool_name: self.name.to_string(),
                reason: message.to_string(),
            }),
            None => Ok(ToolResult::success(format!("{} ran", self.name))),
        }
    }
}

/// A data-access tool that records the SQL it was asked to run.
#[derive(Default)]
struct RegionSales {
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl Tool for RegionSales {
    fn name(&self) -> &str {
        "region_sales"
    }

    fn description(&self) -> &str {
        "Run a read-only query against the sales table"
    }

    fn args_schema(&self) -> ArgsSchema {
        ArgsSchema::new().required("sql", ArgType::String, "SELECT statement")
    }

    async fn execute(&self, _context: &ToolContext, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let sql = args.get_str("sql").unwrap_or_default().to_string();
        self.queries.lock().unwrap().push(sql.clone());
        Ok(ToolResult::success(format!("3 rows for: {sql}")))
    }
}

fn context_for(user: User) -> ToolContext {
    ToolContext::new(user, ConversationId::from("e2e"), "req-1")
}

fn viewer() -> User {
    User::new("vic").with_groups(["viewer"])
}

fn scoping_config() -> AppConfig {
    AppConfig::parse(
        r#"
        [[scoping]]
        tool = "region_sales"
        attribute = "region"
        argument = "sql"
        mode = "sql_predicate"
        "#,
    )
    .unwrap()
}

fn scoped_registry(tool: Arc<RegionSales>, audit: Arc<AuditLogger>) -> ToolRegistry {
    let mut registry = default_registry()
        .with_transformer(Arc::new(AttributeScopeTransformer::new(
            scoping_config().scoping,
        )))
        .with_audit_logger(audit);
    registry.register(tool, Vec::new()).unwrap();
    registry
}

// ── Registry scenarios ───────────────────────────────────────────────────

#[tokio::test]
async fn public_echo_succeeds_for_any_user() {
    let registry = default_registry();
    let call = ToolCall::new("c1", "echo", json!({"text": "hello world"}));

    for user in [User::new("nobody"), viewer(), User::new("root").with_groups(["admin"])] {
        let result = registry.execute(&call, &context_for(user)).await;
        assert!(result.success);
        assert_eq!(result.result_for_llm, "hello world");
    }
}

#[tokio::test]
async fn admin_tool_refuses_viewers_without_running() {
    let spy = Arc::new(SpyTool::new("admin_only", &["admin"]));
    let audit = Arc::new(AuditLogger::new(Default::default()));
    let mut registry = ToolRegistry::new().with_audit_logger(audit.clone());
    registry.register(spy.clone(), Vec::new()).unwrap();

    let call = ToolCall::new("c1", "admin_only", json!({}));
    let result = registry.execute(&call, &context_for(viewer())).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("admin"));
    assert_eq!(spy.runs(), 0);

    let records = audit.entries();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stage, AuditStage::AccessCheck);
    assert_eq!(records[0].outcome, AuditOutcome::Denied);

    let admin = User::new("ada").with_groups(["admin", "viewer"]);
    let result = registry.execute(&call, &context_for(admin)).await;
    assert!(result.success);
    assert_eq!(spy.runs(), 1);
}

#[tokio::test]
async fn missing_scope_attribute_rejects_before_the_query_runs() {
    let tool = Arc::new(RegionSales::default());
    let audit = Arc::new(AuditLogger::new(Default::default()));
    let registry = scoped_registry(tool.clone(), audit.clone());

    let call = ToolCall::new("c1", "region_sales", json!({"sql": "SELECT * FROM sales"}));
    let result = registry.execute(&call, &context_for(viewer())).await;

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("User must have a 'region' attribute assigned")
    );
    assert!(tool.queries.lock().unwrap().is_empty());
    assert_eq!(audit.entries_for_stage(AuditStage::ArgumentRejection).len(), 1);
    assert!(audit.entries_for_stage(AuditStage::PreExecution).is_empty());
}

#[tokio::test]
async fn scoped_user_gets_a_filtered_query() {
    let tool = Arc::new(RegionSales::default());
    let audit = Arc::new(AuditLogger::new(Default::default()));
    let registry = scoped_registry(tool.clone(), audit);

    let user = viewer().with_attribute("region", json!("emea"));
    let call = ToolCall::new(
        "c1",
        "region_sales",
        json!({"sql": "SELECT * FROM sales WHERE year = 2024;"}),
    );
    let result = registry.execute(&call, &context_for(user)).await;

    assert!(result.success);
    assert_eq!(
        tool.queries.lock().unwrap().as_slice(),
        ["SELECT * FROM sales WHERE (year = 2024) AND region = 'emea'"]
    );
}

#[tokio::test]
async fn invalid_arguments_are_explained_to_the_model() {
    let tool = Arc::new(RegionSales::default());
    let audit = Arc::new(AuditLogger::new(Default::default()));
    let registry = scoped_registry(tool.clone(), audit);

    let call = ToolCall::new("c1", "region_sales", json!({"sql": 42}));
    let user = viewer().with_attribute("region", json!("emea"));
    let result = registry.execute(&call, &context_for(user)).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().starts_with("Invalid arguments"));
    assert!(tool.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn audit_records_follow_call_order() {
    let audit = Arc::new(AuditLogger::new(Default::default()));
    let registry = default_registry().with_audit_logger(audit.clone());
    let context = context_for(viewer());

    for (id, text) in [("c1", "first"), ("c2", "second")] {
        let call = ToolCall::new(id, "echo", json!({"text": text}));
        assert!(registry.execute(&call, &context).await.success);
    }

    let stages: Vec<_> = audit.entries().iter().map(|r| r.stage).collect();
    assert_eq!(
        stages,
        vec![
            AuditStage::AccessCheck,
            AuditStage::PreExecution,
            AuditStage::PostExecution,
            AuditStage::AccessCheck,
            AuditStage::PreExecution,
            AuditStage::PostExecution,
        ]
    );
    let invocations = audit.entries_for_stage(AuditStage::PreExecution);
    assert_eq!(invocations[0].arguments, Some(json!({"text": "first"})));
    assert_eq!(invocations[1].arguments, Some(json!({"text": "second"})));
}

// ── Agent scenarios ──────────────────────────────────────────────────────

fn agent_with(llm: Arc<ScriptedLlm>, registry: ToolRegistry, store: Arc<dyn ConversationStore>) -> Agent {
    Agent::builder(
        llm,
        Arc::new(registry),
        Arc::new(StaticUserResolver::new(viewer())),
        store,
    )
    .with_recovery_strategy(Arc::new(RetryPolicy::none()))
    .build()
}

#[tokio::test]
async fn plain_answer_is_a_single_component() {
    let llm = Arc::new(ScriptedLlm::text("42"));
    let agent = agent_with(
        llm.clone(),
        default_registry(),
        Arc::new(InMemoryConversationStore::new()),
    );

    let output = collect_turn(agent.send_message(RequestContext::new(), "meaning of life?", None)).await;

    assert!(output.error.is_none());
    assert_eq!(output.components.len(), 1);
    assert_eq!(output.components[0].simple_component().unwrap().text, "42");
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn failing_tool_does_not_end_the_turn() {
    let spy = Arc::new(SpyTool::failing("flaky", "upstream returned 502"));
    let mut registry = default_registry();
    registry.register(spy.clone(), Vec::new()).unwrap();

    let llm = Arc::new(ScriptedLlm::tool_then_text(
        vec![ToolCall::new("c1", "flaky", json!({}))],
        "The upstream service is down, try later.",
    ));
    let store = Arc::new(InMemoryConversationStore::new());
    let agent = agent_with(llm.clone(), registry, store.clone());

    let output = collect_turn(agent.send_message(RequestContext::new(), "fetch", None)).await;

    assert!(output.error.is_none());
    assert_eq!(spy.runs(), 1);
    assert_eq!(llm.calls(), 2);
    assert_eq!(
        output.texts().last().copied(),
        Some("The upstream service is down, try later.")
    );

    let conversations = store.list_conversations(&viewer(), 10).await.unwrap();
    let tool_message = conversations[0]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert!(tool_message.content.contains("upstream returned 502"));
}

#[tokio::test]
async fn file_store_round_trips_a_full_turn() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileConversationStore::new(dir.path()));
    let llm = Arc::new(ScriptedLlm::tool_then_text(
        vec![ToolCall::new("c1", "calculator", json!({"expression": "6 * 7"}))],
        "6 * 7 is 42",
    ));
    let agent = agent_with(llm, default_registry(), store.clone());
    let id = ConversationId::from("math-1");

    let output = collect_turn(agent.send_message(RequestContext::new(), "what is 6*7", Some(id.clone()))).await;
    assert!(output.error.is_none());
    assert_eq!(output.texts().last().copied(), Some("6 * 7 is 42"));

    // A fresh store over the same directory sees the identical history.
    let reopened = FileConversationStore::new(dir.path());
    let stored = reopened.get_conversation(&id, &viewer()).await.unwrap().unwrap();
    let roles: Vec<_> = stored.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    assert_eq!(stored.messages[1].tool_calls[0].name, "calculator");
    assert!(stored.messages[2].content.contains("42"));

    let original = store.get_conversation(&id, &viewer()).await.unwrap().unwrap();
    assert_eq!(original.messages, stored.messages);
}

#[tokio::test]
async fn configured_token_user_gets_scoped_results_through_the_agent() {
    let digest = TokenUserResolver::digest("s3cret");
    let config = AppConfig::parse(&format!(
        r#"
        [agent]
        max_tool_iterations = 4

        [[users]]
        id = "erin"
        name = "Erin"
        token_sha256 = "{digest}"
        groups = ["analyst"]
        attributes = {{ region = "apac" }}

        [[scoping]]
        tool = "region_sales"
        attribute = "region"
        argument = "sql"
        mode = "sql_predicate"
        "#
    ))
    .unwrap();

    let tool = Arc::new(RegionSales::default());
    let audit = Arc::new(AuditLogger::new(config.audit.clone()));
    let mut registry = default_registry()
        .with_transformer(Arc::new(AttributeScopeTransformer::new(config.scoping.clone())))
        .with_audit_logger(audit.clone());
    registry.register(tool.clone(), vec!["analyst".into()]).unwrap();

    let llm = Arc::new(ScriptedLlm::tool_then_text(
        vec![ToolCall::new("c1", "region_sales", json!({"sql": "SELECT * FROM sales"}))],
        "APAC sold 3 things",
    ));
    let store = Arc::new(InMemoryConversationStore::new());
    let agent = Agent::builder(
        llm,
        Arc::new(registry),
        Arc::new(TokenUserResolver::new(&config.users)),
        store,
    )
    .with_config(config.agent.clone())
    .with_ui_features(config.ui_features.clone())
    .build();

    let request = RequestContext::new().with_header("Authorization", "Bearer s3cret");
    let output = collect_turn(agent.send_message(request, "sales please", None)).await;

    assert!(output.error.is_none(), "unexpected error: {:?}", output.error);
    assert_eq!(
        tool.queries.lock().unwrap().as_slice(),
        ["SELECT * FROM sales WHERE region = 'apac'"]
    );
    let records = audit.entries();
    assert!(records.iter().all(|r| r.user_id == "erin"));

    let denied = collect_turn(agent.send_message(
        RequestContext::new().with_header("Authorization", "Bearer wrong"),
        "sales please",
        None,
    ))
    .await;
    assert!(denied.components.is_empty());
    assert!(matches!(denied.error, Some(AgentError::Authentication(_))));
}
