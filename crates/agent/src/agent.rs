//! The [`Agent`] and its streamed turn loop.
//!
//! Each call to [`Agent::send_message`] spawns one task that produces
//! [`UiComponent`]s into a bounded channel. Fatal errors arrive as a final
//! `Err` item, after which the stream ends. Dropping the stream stops the
//! task before it schedules another model or tool round; a tool that has
//! already started always runs to completion.

use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use toolgate_core::llm::collect_stream;
use toolgate_core::{
    AgentConfig, AgentError, ContextEnricher, Conversation, ConversationFilter, ConversationId,
    ConversationStore, ErrorRecoveryStrategy, HookError, LifecycleHook, LlmError, LlmMiddleware,
    LlmRequest, LlmResponse, LlmService, Message, NoopObservability, ObservabilityProvider,
    RecoveryAction, RequestContext, Severity, SpanHandle, SystemPromptBuilder, ToolCall,
    ToolContext, ToolResult, ToolSchema, UiComponent, UiFeatures, User, UserResolver,
};
use toolgate_security::sanitize_arguments;
use toolgate_tools::ToolRegistry;

use crate::filters::MaxHistoryFilter;
use crate::prompt::DefaultSystemPromptBuilder;
use crate::recovery::RetryPolicy;

const UI_CHANNEL_CAPACITY: usize = 128;

/// The output of one turn.
pub type UiStream = ReceiverStream<Result<UiComponent, AgentError>>;

type UiSender = mpsc::Sender<Result<UiComponent, AgentError>>;

/// Orchestrates the LLM ↔ tool loop for a user message.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

struct Inner {
    llm: Arc<dyn LlmService>,
    registry: Arc<ToolRegistry>,
    user_resolver: Arc<dyn UserResolver>,
    store: Arc<dyn ConversationStore>,
    config: AgentConfig,
    ui_features: UiFeatures,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    filters: Vec<Arc<dyn ConversationFilter>>,
    middlewares: Vec<Arc<dyn LlmMiddleware>>,
    enrichers: Vec<Arc<dyn ContextEnricher>>,
    recovery: Arc<dyn ErrorRecoveryStrategy>,
    prompt_builder: Arc<dyn SystemPromptBuilder>,
    observability: Arc<dyn ObservabilityProvider>,
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    llm: Arc<dyn LlmService>,
    registry: Arc<ToolRegistry>,
    user_resolver: Arc<dyn UserResolver>,
    store: Arc<dyn ConversationStore>,
    config: AgentConfig,
    ui_features: UiFeatures,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    filters: Vec<Arc<dyn ConversationFilter>>,
    middlewares: Vec<Arc<dyn LlmMiddleware>>,
    enrichers: Vec<Arc<dyn ContextEnricher>>,
    recovery: Option<Arc<dyn ErrorRecoveryStrategy>>,
    prompt_builder: Option<Arc<dyn SystemPromptBuilder>>,
    observability: Arc<dyn ObservabilityProvider>,
}

impl AgentBuilder {
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ui_features(mut self, ui_features: UiFeatures) -> Self {
        self.ui_features = ui_features;
        self
    }

    /// Hooks run in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn ConversationFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn LlmMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn ContextEnricher>) -> Self {
        self.enrichers.push(enricher);
        self
    }

    /// Defaults to a [`RetryPolicy`] built from the agent config.
    pub fn with_recovery_strategy(mut self, recovery: Arc<dyn ErrorRecoveryStrategy>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Defaults to a [`DefaultSystemPromptBuilder`] over `config.system_prompt`.
    pub fn with_system_prompt_builder(mut self, builder: Arc<dyn SystemPromptBuilder>) -> Self {
        self.prompt_builder = Some(builder);
        self
    }

    pub fn with_observability(mut self, observability: Arc<dyn ObservabilityProvider>) -> Self {
        self.observability = observability;
        self
    }

    pub fn build(self) -> Agent {
        let mut filters = self.filters;
        if let Some(max) = self.config.max_history_messages {
            filters.push(Arc::new(MaxHistoryFilter::new(max)));
        }
        let recovery = self
            .recovery
            .unwrap_or_else(|| Arc::new(RetryPolicy::from_config(&self.config)));
        let prompt_builder = self.prompt_builder.unwrap_or_else(|| {
            Arc::new(DefaultSystemPromptBuilder::new(self.config.system_prompt.clone()))
        });

        Agent {
            inner: Arc::new(Inner {
                llm: self.llm,
                registry: self.registry,
                user_resolver: self.user_resolver,
                store: self.store,
                config: self.config,
                ui_features: self.ui_features,
                hooks: self.hooks,
                filters,
                middlewares: self.middlewares,
                enrichers: self.enrichers,
                recovery,
                prompt_builder,
                observability: self.observability,
            }),
        }
    }
}

impl Agent {
    pub fn builder(
        llm: Arc<dyn LlmService>,
        registry: Arc<ToolRegistry>,
        user_resolver: Arc<dyn UserResolver>,
        store: Arc<dyn ConversationStore>,
    ) -> AgentBuilder {
        AgentBuilder {
            llm,
            registry,
            user_resolver,
            store,
            config: AgentConfig::default(),
            ui_features: UiFeatures::default(),
            hooks: Vec::new(),
            filters: Vec::new(),
            middlewares: Vec::new(),
            enrichers: Vec::new(),
            recovery: None,
            prompt_builder: None,
            observability: Arc::new(NoopObservability),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.inner.registry
    }

    /// Run one turn for `message`.
    ///
    /// Continues `conversation_id` when given, otherwise starts a new
    /// conversation. Must be called from within a Tokio runtime. Drain the
    /// stream to be sure persistence and hooks have completed.
    pub fn send_message(
        &self,
        request: RequestContext,
        message: impl Into<String>,
        conversation_id: Option<ConversationId>,
    ) -> UiStream {
        let (tx, rx) = mpsc::channel(UI_CHANNEL_CAPACITY);
        let inner = self.inner.clone();
        let message = message.into();

        tokio::spawn(async move {
            if let Err(error) = inner.run_turn(request, message, conversation_id, &tx).await {
                warn!(error = %error, "Turn failed");
                if matches!(error, AgentError::Timeout { .. }) {
                    emit(&tx, UiComponent::status(Severity::Error, error.to_string())).await;
                }
                let _ = tx.send(Err(error)).await;
            }
        });

        ReceiverStream::new(rx)
    }
}

/// Everything a drained [`UiStream`] produced.
#[derive(Debug, Default)]
pub struct TurnOutput {
    pub components: Vec<UiComponent>,
    /// The fatal error that ended the turn, if any
    pub error: Option<AgentError>,
}

impl TurnOutput {
    /// Plain-text fallbacks of every component, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.components.iter().map(UiComponent::plain_text).collect()
    }
}

/// Drain a stream to completion.
pub async fn collect_turn(mut stream: UiStream) -> TurnOutput {
    let mut output = TurnOutput::default();
    while let Some(item) = stream.next().await {
        match item {
            Ok(component) => output.components.push(component),
            Err(error) => {
                output.error = Some(error);
                break;
            }
        }
    }
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The consumer went away.
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout_secs: u64,
}

impl Deadline {
    fn starting_now(timeout_secs: Option<u64>) -> Option<Self> {
        timeout_secs.map(|timeout_secs| Self {
            at: Instant::now() + Duration::from_secs(timeout_secs),
            timeout_secs,
        })
    }

    fn expired(&self) -> AgentError {
        AgentError::Timeout {
            timeout_secs: self.timeout_secs,
        }
    }
}

fn check_deadline(deadline: Option<Deadline>) -> Result<(), AgentError> {
    match deadline {
        Some(d) if Instant::now() >= d.at => Err(d.expired()),
        _ => Ok(()),
    }
}

/// Sleep before a retry, waking at the turn deadline if it comes first.
async fn wait_for_retry(delay: Duration, deadline: Option<Deadline>) -> Result<(), AgentError> {
    let wake = Instant::now() + delay;
    match deadline {
        Some(d) if d.at <= wake => {
            tokio::time::sleep_until(d.at).await;
            Err(d.expired())
        }
        _ => {
            tokio::time::sleep_until(wake).await;
            Ok(())
        }
    }
}

/// Per-turn values shared by every tool call.
struct TurnScope<'a> {
    user: &'a User,
    request_id: String,
    features: Vec<String>,
}

async fn emit(tx: &UiSender, component: UiComponent) {
    if tx.send(Ok(component)).await.is_err() {
        debug!("UI stream closed by consumer");
    }
}

fn middleware_error(middleware: &dyn LlmMiddleware, error: HookError) -> AgentError {
    AgentError::Middleware {
        middleware: middleware.name().to_string(),
        reason: error.reason,
    }
}

impl Inner {
    async fn run_turn(
        &self,
        request: RequestContext,
        mut message: String,
        conversation_id: Option<ConversationId>,
        tx: &UiSender,
    ) -> Result<(), AgentError> {
        let deadline = Deadline::starting_now(self.config.turn_timeout_secs);

        let user = self.user_resolver.resolve_user(&request).await?;

        for hook in &self.hooks {
            if let Some(replacement) = hook.before_message(&user, &message).await? {
                debug!(hook = hook.name(), "Inbound message replaced");
                message = replacement;
            }
        }

        let mut conversation = self.load_conversation(conversation_id, &user).await?;
        info!(
            conversation_id = %conversation.id,
            user = %user.id,
            history = conversation.messages.len(),
            "Turn started"
        );
        conversation.push(Message::user(message));

        let span = self.start_span("turn", &conversation.id, BTreeMap::new());
        let outcome = self.drive(&user, &mut conversation, deadline, tx).await;
        self.end_span(span, outcome.is_ok());
        outcome
    }

    async fn load_conversation(
        &self,
        conversation_id: Option<ConversationId>,
        user: &User,
    ) -> Result<Conversation, AgentError> {
        let Some(id) = conversation_id else {
            return Ok(Conversation::new(ConversationId::new(), user.clone()));
        };
        match self.store.get_conversation(&id, user).await? {
            Some(conversation) => Ok(conversation),
            None => {
                debug!(conversation_id = %id, "Unknown conversation id; starting fresh");
                Ok(Conversation::new(id, user.clone()))
            }
        }
    }

    async fn drive(
        &self,
        user: &User,
        conversation: &mut Conversation,
        deadline: Option<Deadline>,
        tx: &UiSender,
    ) -> Result<(), AgentError> {
        let tools = self.registry.schemas_for(user);
        let system_prompt = self.prompt_builder.build_system_prompt(user, &tools).await;
        let turn = TurnScope {
            user,
            request_id: Uuid::new_v4().to_string(),
            features: self.ui_features.available_for(user),
        };
        let max_iterations = self.config.max_tool_iterations;
        let mut iterations = 0u32;

        loop {
            if iterations >= max_iterations {
                warn!(
                    conversation_id = %conversation.id,
                    iterations,
                    "Tool iteration limit reached without a final answer"
                );
                self.persist(conversation).await?;
                emit(
                    tx,
                    UiComponent::status(
                        Severity::Warning,
                        format!(
                            "Stopped after {max_iterations} tool iterations without a final answer"
                        ),
                    ),
                )
                .await;
                self.after_message(conversation).await?;
                return Ok(());
            }

            if tx.is_closed() {
                debug!(conversation_id = %conversation.id, "Consumer gone; stopping turn");
                return Ok(());
            }
            check_deadline(deadline)?;

            let request = self
                .build_request(system_prompt.as_deref(), conversation, &tools)
                .await;
            let response = self.call_llm(request, &conversation.id, deadline).await?;

            if !response.has_tool_calls() {
                let answer = response.content.unwrap_or_default();
                conversation.push(Message::assistant(answer.clone()));
                self.persist(conversation).await?;
                info!(
                    conversation_id = %conversation.id,
                    iterations,
                    "Turn completed"
                );
                emit(tx, UiComponent::text(answer)).await;
                self.after_message(conversation).await?;
                return Ok(());
            }

            iterations += 1;
            let calls = response.tool_calls;
            debug!(
                conversation_id = %conversation.id,
                iteration = iterations,
                tool_calls = calls.len(),
                "Model requested tools"
            );
            conversation.push(Message::assistant_with_tool_calls(
                response.content.unwrap_or_default(),
                calls.clone(),
            ));

            check_deadline(deadline)?;
            let flow = if self.config.parallel_tool_calls && calls.len() > 1 {
                self.run_tools_parallel(&turn, conversation, calls, tx).await?
            } else {
                self.run_tools_sequential(&turn, conversation, calls, tx).await?
            };
            if flow == Flow::Stop {
                debug!(conversation_id = %conversation.id, "Consumer gone; stopping turn");
                return Ok(());
            }
        }
    }

    async fn build_request(
        &self,
        system_prompt: Option<&str>,
        conversation: &Conversation,
        tools: &[ToolSchema],
    ) -> LlmRequest {
        let mut history = conversation.messages.clone();
        for filter in &self.filters {
            history = filter.filter_messages(history).await;
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(history);

        LlmRequest {
            messages,
            tools: tools.to_vec(),
            temperature: self.config.temperature,
            max_tokens: Some(self.config.max_tokens),
            stream: self.config.stream_responses,
            metadata: serde_json::Map::new(),
        }
    }

    /// Middlewares, then the model with retries, then middlewares again.
    async fn call_llm(
        &self,
        mut request: LlmRequest,
        conversation_id: &ConversationId,
        deadline: Option<Deadline>,
    ) -> Result<LlmResponse, AgentError> {
        for middleware in &self.middlewares {
            request = middleware
                .before_request(request)
                .await
                .map_err(|e| middleware_error(middleware.as_ref(), e))?;
        }

        let mut attempt = 0u32;
        let mut response = loop {
            let span = self.start_span(
                "llm_call",
                conversation_id,
                BTreeMap::from([("attempt".to_string(), json!(attempt + 1))]),
            );
            let outcome = self.invoke_llm(request.clone(), deadline).await;
            self.end_span(span, matches!(outcome, Ok(Ok(_))));

            match outcome? {
                Ok(response) => break response,
                Err(error) => {
                    attempt += 1;
                    match self.recovery.on_llm_error(&error, attempt).await {
                        RecoveryAction::Retry { delay } => {
                            warn!(
                                conversation_id = %conversation_id,
                                attempt,
                                error = %error,
                                delay_ms = delay.as_millis() as u64,
                                "LLM call failed; retrying"
                            );
                            wait_for_retry(delay, deadline).await?;
                        }
                        RecoveryAction::Fail => return Err(error.into()),
                    }
                }
            }
        };

        for middleware in &self.middlewares {
            response = middleware
                .after_response(&request, response)
                .await
                .map_err(|e| middleware_error(middleware.as_ref(), e))?;
        }
        Ok(response)
    }

    /// The outer error is the turn deadline; the inner one goes to recovery.
    async fn invoke_llm(
        &self,
        request: LlmRequest,
        deadline: Option<Deadline>,
    ) -> Result<Result<LlmResponse, LlmError>, AgentError> {
        let call = async {
            if self.config.stream_responses {
                match self.llm.stream_request(request).await {
                    Ok(chunks) => collect_stream(chunks).await,
                    Err(e) => Err(e),
                }
            } else {
                self.llm.send_request(request).await
            }
        };
        match deadline {
            Some(d) => tokio::time::timeout_at(d.at, call)
                .await
                .map_err(|_| d.expired()),
            None => Ok(call.await),
        }
    }

    async fn run_tools_sequential(
        &self,
        turn: &TurnScope<'_>,
        conversation: &mut Conversation,
        calls: Vec<ToolCall>,
        tx: &UiSender,
    ) -> Result<Flow, AgentError> {
        for call in calls {
            if tx.is_closed() {
                return Ok(Flow::Stop);
            }
            let context = self.prepare_tool(turn, &conversation.id, &call, tx).await?;
            let span = self.start_span("tool_execution", &conversation.id, tool_attributes(&call));
            let result = self.registry.execute(&call, &context).await;
            self.finish_tool(turn.user, conversation, &call, span, result, tx)
                .await?;
        }
        Ok(Flow::Continue)
    }

    /// Hooks, checks and audits stay in call order; only tool bodies overlap.
    async fn run_tools_parallel(
        &self,
        turn: &TurnScope<'_>,
        conversation: &mut Conversation,
        calls: Vec<ToolCall>,
        tx: &UiSender,
    ) -> Result<Flow, AgentError> {
        let mut batch = Vec::with_capacity(calls.len());
        for call in &calls {
            if tx.is_closed() {
                return Ok(Flow::Stop);
            }
            let context = self.prepare_tool(turn, &conversation.id, call, tx).await?;
            batch.push((call.clone(), context));
        }

        let spans: Vec<_> = calls
            .iter()
            .map(|call| self.start_span("tool_execution", &conversation.id, tool_attributes(call)))
            .collect();
        let results = self.registry.execute_all(&batch).await;

        for ((call, span), result) in calls.iter().zip(spans).zip(results) {
            self.finish_tool(turn.user, conversation, call, span, result, tx)
                .await?;
        }
        Ok(Flow::Continue)
    }

    /// Build the tool context, run `before_tool` hooks and announce the call.
    async fn prepare_tool(
        &self,
        turn: &TurnScope<'_>,
        conversation_id: &ConversationId,
        call: &ToolCall,
        tx: &UiSender,
    ) -> Result<ToolContext, AgentError> {
        let context = self.tool_context(turn, conversation_id).await;

        // Unknown or forbidden tools skip the hooks; the registry reports them.
        let tool = self
            .registry
            .get(&call.name)
            .filter(|tool| ToolRegistry::is_permitted(tool.as_ref(), turn.user));
        if let Some(tool) = tool {
            for hook in &self.hooks {
                hook.before_tool(tool.as_ref(), &context).await?;
            }
        }

        if let Some(status) = self.invocation_status(turn.user, call) {
            emit(tx, status).await;
        }
        Ok(context)
    }

    async fn tool_context(&self, turn: &TurnScope<'_>, conversation_id: &ConversationId) -> ToolContext {
        let mut context = ToolContext::new(
            turn.user.clone(),
            conversation_id.clone(),
            turn.request_id.clone(),
        )
        .with_metadata("ui_features_available", json!(turn.features));

        for enricher in &self.enrichers {
            match enricher.enrich(context.clone()).await {
                Ok(enriched) => context = enriched,
                Err(e) => warn!(
                    enricher = enricher.name(),
                    error = %e,
                    "Context enricher failed; continuing without it"
                ),
            }
        }
        context
    }

    async fn finish_tool(
        &self,
        user: &User,
        conversation: &mut Conversation,
        call: &ToolCall,
        span: Option<SpanHandle>,
        mut result: ToolResult,
        tx: &UiSender,
    ) -> Result<(), AgentError> {
        self.end_span(span, result.success);
        self.record_tool_timing(call, &result);

        for hook in &self.hooks {
            if let Some(replacement) = hook.after_tool(&result).await? {
                debug!(hook = hook.name(), tool = %call.name, "Tool result replaced");
                result = replacement.normalized();
            }
        }

        conversation.push(Message::tool_result(call.id.clone(), result.result_for_llm.clone()));
        if let Some(component) = self.result_component(user, call, &result) {
            emit(tx, component).await;
        }
        Ok(())
    }

    fn invocation_status(&self, user: &User, call: &ToolCall) -> Option<UiComponent> {
        let features = &self.ui_features;
        if !features.is_visible(UiFeatures::TOOL_INVOCATION_STATUS, user) {
            return None;
        }
        let message = if features.is_visible(UiFeatures::TOOL_NAMES, user) {
            format!("Running tool '{}'", call.name)
        } else {
            "Running a tool".to_string()
        };
        Some(if features.is_visible(UiFeatures::TOOL_ARGUMENTS, user) {
            let arguments = sanitize_arguments(&call.arguments).to_string();
            UiComponent::status_with_detail(Severity::Working, message, arguments)
        } else {
            UiComponent::status(Severity::Working, message)
        })
    }

    fn result_component(&self, user: &User, call: &ToolCall, result: &ToolResult) -> Option<UiComponent> {
        if result.success {
            return result.ui_component.clone();
        }
        let features = &self.ui_features;
        if !features.is_visible(UiFeatures::TOOL_ERRORS, user) {
            return Some(UiComponent::status(
                Severity::Warning,
                "A tool call did not succeed; the assistant will try another way",
            ));
        }
        if let Some(component) = &result.ui_component {
            return Some(component.clone());
        }
        let title = if features.is_visible(UiFeatures::TOOL_NAMES, user) {
            format!("Tool '{}' failed", call.name)
        } else {
            "Tool failed".to_string()
        };
        let error = result
            .error
            .as_deref()
            .unwrap_or(result.result_for_llm.as_str());
        Some(UiComponent::notification(Severity::Error, title, error))
    }

    async fn persist(&self, conversation: &mut Conversation) -> Result<(), AgentError> {
        self.store.update_conversation(conversation).await?;
        debug!(
            conversation_id = %conversation.id,
            version = conversation.version,
            messages = conversation.messages.len(),
            "Conversation persisted"
        );
        Ok(())
    }

    async fn after_message(&self, conversation: &Conversation) -> Result<(), AgentError> {
        for hook in &self.hooks {
            hook.after_message(conversation).await?;
        }
        Ok(())
    }

    fn start_span(
        &self,
        name: &str,
        conversation_id: &ConversationId,
        mut attributes: BTreeMap<String, Value>,
    ) -> Option<SpanHandle> {
        attributes.insert("conversation_id".to_string(), json!(conversation_id.as_str()));
        match self.observability.start_span(name, attributes) {
            Ok(span) => Some(span),
            Err(e) => {
                warn!(span = name, error = %e, "Observability provider failed to start span");
                None
            }
        }
    }

    fn end_span(&self, span: Option<SpanHandle>, success: bool) {
        let Some(span) = span else { return };
        let name = span.name.clone();
        if let Err(e) = self.observability.end_span(span, success) {
            warn!(span = %name, error = %e, "Observability provider failed to end span");
        }
    }

    fn record_tool_timing(&self, call: &ToolCall, result: &ToolResult) {
        let Some(ms) = result.metadata.get("execution_time_ms").and_then(Value::as_f64) else {
            return;
        };
        let tags = BTreeMap::from([
            ("tool".to_string(), call.name.clone()),
            ("success".to_string(), result.success.to_string()),
        ]);
        if let Err(e) = self
            .observability
            .record_metric("tool_execution_time", ms, "ms", tags)
        {
            warn!(tool = %call.name, error = %e, "Observability provider failed to record metric");
        }
    }
}

fn tool_attributes(call: &ToolCall) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("tool".to_string(), json!(call.name)),
        ("tool_call_id".to_string(), json!(call.id)),
    ])
}
