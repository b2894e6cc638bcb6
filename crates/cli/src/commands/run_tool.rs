//! `toolgate run-tool`: one tool call through the full registry pipeline.

use anyhow::{Context, bail};
use serde_json::Value;
use std::sync::Arc;
use toolgate_config::AppConfig;
use toolgate_core::{ConversationId, RequestContext, ToolCall, ToolContext, User, UserResolver};
use toolgate_security::{
    AttributeScopeTransformer, AuditLogger, JsonlFileSink, TokenUserResolver, TracingSink,
};
use toolgate_tools::{ToolRegistry, default_registry};

/// Who the call runs as.
pub enum Caller {
    /// Resolved from the configured `[[users]]`.
    Token(String),
    Explicit {
        id: String,
        groups: Vec<String>,
        /// `key=value` pairs
        attributes: Vec<String>,
    },
}

/// The built-in tools behind the configured scoping rules and audit sinks.
pub fn build_registry(config: &AppConfig) -> anyhow::Result<(ToolRegistry, Arc<AuditLogger>)> {
    let mut audit = AuditLogger::new(config.audit.clone()).add_sink(Box::new(TracingSink));
    if let Some(path) = &config.audit_log_path {
        let sink = JsonlFileSink::open(path)
            .with_context(|| format!("failed to open audit log {path}"))?;
        audit = audit.add_sink(Box::new(sink));
    }
    let audit = Arc::new(audit);

    let registry = default_registry()
        .with_transformer(Arc::new(AttributeScopeTransformer::new(config.scoping.clone())))
        .with_audit_logger(audit.clone());
    Ok((registry, audit))
}

/// Parse `key=value`; the value is read as JSON when it parses, else as a string.
pub fn parse_attribute(raw: &str) -> anyhow::Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("attribute '{raw}' must look like key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("attribute '{raw}' has an empty key");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub async fn resolve_caller(config: &AppConfig, caller: Caller) -> anyhow::Result<User> {
    match caller {
        Caller::Token(token) => {
            let resolver = TokenUserResolver::new(&config.users);
            let request = RequestContext::new().with_header("Authorization", format!("Bearer {token}"));
            Ok(resolver.resolve_user(&request).await?)
        }
        Caller::Explicit {
            id,
            groups,
            attributes,
        } => {
            let mut user = User::new(id).with_groups(groups);
            for raw in &attributes {
                let (key, value) = parse_attribute(raw)?;
                user = user.with_attribute(key, value);
            }
            Ok(user)
        }
    }
}

pub async fn run(name: &str, args: &str, caller: Caller) -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load config")?;
    let arguments: Value = serde_json::from_str(args).context("--args must be valid JSON")?;
    let user = resolve_caller(&config, caller).await?;
    let (registry, audit) = build_registry(&config)?;

    let request_id = format!("cli-{}", ConversationId::new());
    let context = ToolContext::new(user, ConversationId::from("cli"), request_id);
    let call = ToolCall::new("call_cli", name, arguments);
    let result = registry.execute(&call, &context).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("\nAudit trail:");
    for record in audit.entries() {
        println!("  {}", serde_json::to_string(&record)?);
    }

    if !result.success {
        bail!(
            "tool call failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
