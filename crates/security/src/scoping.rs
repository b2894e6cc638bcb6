//! Row-level scoping: rewrite tool arguments from the caller's attributes.
//!
//! Each rule binds a tool argument to a user attribute. A caller without
//! the attribute is refused before the tool body can run.

use async_trait::async_trait;
use serde_json::Value;
use toolgate_core::{ArgumentTransformer, Tool, ToolArgs, ToolContext, ToolRejection, TransformOutcome};

pub use toolgate_config::{ScopeMode, ScopeRuleConfig as ScopeRule};

/// Applies configured [`ScopeRule`]s to every matching tool call.
#[derive(Debug, Clone, Default)]
pub struct AttributeScopeTransformer {
    rules: Vec<ScopeRule>,
}

impl AttributeScopeTransformer {
    pub fn new(rules: Vec<ScopeRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ScopeRule] {
        &self.rules
    }

    fn apply(rule: &ScopeRule, args: &mut ToolArgs, context: &ToolContext) -> Result<(), ToolRejection> {
        let value = context.user.attributes.get(&rule.attribute).ok_or_else(|| {
            ToolRejection::new(format!(
                "User must have a '{}' attribute assigned",
                rule.attribute
            ))
        })?;

        match rule.mode {
            ScopeMode::Inject => {
                args.insert(rule.argument.clone(), value.clone());
            }
            ScopeMode::SqlPredicate => {
                let sql = args.get_str(&rule.argument).ok_or_else(|| {
                    ToolRejection::new(format!(
                        "Argument '{}' must be a string to apply scoping",
                        rule.argument
                    ))
                })?;
                let literal = sql_literal(value).ok_or_else(|| {
                    ToolRejection::new(format!(
                        "Attribute '{}' must be a string or number to scope queries",
                        rule.attribute
                    ))
                })?;
                let column = rule.column.as_deref().unwrap_or(&rule.attribute);
                let scoped = append_predicate(sql, column, &literal)?;
                args.insert(rule.argument.clone(), Value::String(scoped));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ArgumentTransformer for AttributeScopeTransformer {
    async fn transform_args(
        &self,
        tool: &dyn Tool,
        mut args: ToolArgs,
        context: &ToolContext,
    ) -> TransformOutcome {
        for rule in self.rules.iter().filter(|r| r.tool == tool.name()) {
            if let Err(rejection) = Self::apply(rule, &mut args, context) {
                tracing::warn!(
                    tool = %tool.name(),
                    user = %context.user.id,
                    attribute = %rule.attribute,
                    reason = %rejection.reason,
                    "Scoping rejected tool call"
                );
                return TransformOutcome::Reject(rejection);
            }
            tracing::debug!(tool = %tool.name(), argument = %rule.argument, "Applied scoping rule");
        }
        TransformOutcome::Proceed(args)
    }
}

fn sql_literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Clauses that follow WHERE in a SELECT; the predicate goes before them.
const TRAILING_CLAUSES: &[&str] = &[
    "GROUP", "HAVING", "WINDOW", "QUALIFY", "ORDER", "LIMIT", "OFFSET", "FETCH", "FOR",
];

/// Keywords that combine result sets; one predicate cannot scope them all.
const SET_OPERATORS: &[&str] = &["UNION", "INTERSECT", "EXCEPT"];

/// A keyword at nesting depth zero, outside quotes.
struct Keyword {
    word: String,
    start: usize,
    end: usize,
}

/// Scan `sql` for top-level keywords.
///
/// Rejects comments and statement separators, which could hide or
/// detach an appended predicate.
fn top_level_keywords(sql: &str) -> Result<Vec<Keyword>, ToolRejection> {
    let bytes = sql.as_bytes();
    let mut keywords = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(ToolRejection::new("Scoped query has an unterminated quote")),
                        // A doubled quote is an escaped quote
                        Some(&b) if b == quote && bytes.get(i + 1) == Some(&quote) => i += 2,
                        Some(&b) if b == quote => break,
                        Some(_) => i += 1,
                    }
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                return Err(ToolRejection::new("Scoped queries may not contain comments"));
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                return Err(ToolRejection::new("Scoped queries may not contain comments"));
            }
            b';' => {
                return Err(ToolRejection::new("Scoped queries must be a single statement"));
            }
            b'(' => depth += 1,
            b')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ToolRejection::new("Scoped query has unbalanced parentheses"))?;
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                if depth == 0 {
                    keywords.push(Keyword {
                        word: sql[start..i].to_ascii_uppercase(),
                        start,
                        end: i,
                    });
                }
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return Err(ToolRejection::new("Scoped query has unbalanced parentheses"));
    }
    Ok(keywords)
}

/// Add `column = literal` to the top-level WHERE clause of a SELECT.
///
/// An existing condition is parenthesized so an `OR` inside it cannot
/// escape the predicate, and the predicate lands before any
/// GROUP BY / ORDER BY / LIMIT tail.
fn append_predicate(sql: &str, column: &str, literal: &str) -> Result<String, ToolRejection> {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    let keywords = top_level_keywords(trimmed)?;

    if keywords.iter().any(|k| SET_OPERATORS.contains(&k.word.as_str())) {
        return Err(ToolRejection::new("Scoped queries cannot combine result sets"));
    }

    let where_clause = keywords.iter().find(|k| k.word == "WHERE");
    let search_from = where_clause.map_or(0, |k| k.end);
    let tail_at = keywords
        .iter()
        .filter(|k| k.start >= search_from)
        .find(|k| TRAILING_CLAUSES.contains(&k.word.as_str()))
        .map_or(trimmed.len(), |k| k.start);

    let tail = trimmed[tail_at..].trim();
    let scoped = match where_clause {
        Some(k) => {
            let head = trimmed[..k.start].trim_end();
            let condition = trimmed[k.end..tail_at].trim();
            format!("{head} WHERE ({condition}) AND {column} = {literal}")
        }
        None => {
            let head = trimmed[..tail_at].trim_end();
            format!("{head} WHERE {column} = {literal}")
        }
    };
    Ok(if tail.is_empty() {
        scoped
    } else {
        format!("{scoped} {tail}")
    })
}
