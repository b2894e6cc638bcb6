//! UI components: the units streamed out of a turn.
//!
//! Every component pairs an optional rich rendering with a plain-text
//! fallback. Whenever a rich variant is present the fallback is derived
//! from it, so minimal clients always have something to show.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity / state shared by status and notification components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Working,
    Success,
    Warning,
    Error,
}

/// The rich variant, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichComponent {
    Text {
        content: String,
        #[serde(default)]
        markdown: bool,
    },
    Table {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    Chart {
        chart_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        data: serde_json::Value,
    },
    Status {
        level: Severity,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Progress {
        label: String,
        /// Fraction complete in `[0, 1]`
        value: f32,
    },
    Notification {
        level: Severity,
        title: String,
        message: String,
    },
    Button {
        label: String,
        action: String,
    },
    Container {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        children: Vec<RichComponent>,
    },
    Link {
        url: String,
        label: String,
    },
    Image {
        url: String,
        #[serde(default)]
        alt: String,
    },
}

impl RichComponent {
    /// Kind discriminator as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Table { .. } => "table",
            Self::Chart { .. } => "chart",
            Self::Status { .. } => "status",
            Self::Progress { .. } => "progress",
            Self::Notification { .. } => "notification",
            Self::Button { .. } => "button",
            Self::Container { .. } => "container",
            Self::Link { .. } => "link",
            Self::Image { .. } => "image",
        }
    }

    /// Plain-text rendering used as the simple fallback.
    pub fn to_plain_text(&self) -> String {
        match self {
            Self::Text { content, .. } => content.clone(),
            Self::Table {
                title,
                columns,
                rows,
            } => {
                let mut out = String::new();
                if let Some(title) = title {
                    out.push_str(title);
                    out.push('\n');
                }
                out.push_str(&columns.join(" | "));
                for row in rows {
                    out.push('\n');
                    let cells: Vec<String> = row.iter().map(plain_cell).collect();
                    out.push_str(&cells.join(" | "));
                }
                out
            }
            Self::Chart {
                chart_type, title, ..
            } => match title {
                Some(title) => format!("[{chart_type} chart: {title}]"),
                None => format!("[{chart_type} chart]"),
            },
            Self::Status {
                message, detail, ..
            } => match detail {
                Some(detail) => format!("{message}: {detail}"),
                None => message.clone(),
            },
            Self::Progress { label, value } => {
                format!("{label}: {:.0}%", value.clamp(0.0, 1.0) * 100.0)
            }
            Self::Notification { title, message, .. } => format!("{title}: {message}"),
            Self::Button { label, .. } => format!("[{label}]"),
            Self::Container { title, children } => {
                let mut parts: Vec<String> = Vec::new();
                if let Some(title) = title {
                    parts.push(title.clone());
                }
                parts.extend(children.iter().map(|c| c.to_plain_text()));
                parts.join("\n")
            }
            Self::Link { url, label } => format!("{label} ({url})"),
            Self::Image { url, alt } => {
                if alt.is_empty() {
                    format!("[image: {url}]")
                } else {
                    format!("[image: {alt}]")
                }
            }
        }
    }
}

fn plain_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The plain-text variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleComponent {
    pub text: String,
}

/// A response unit: optional rich rendering plus guaranteed plain-text fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UiComponentRepr")]
pub struct UiComponent {
    rich_component: Option<RichComponent>,
    simple_component: Option<SimpleComponent>,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct UiComponentRepr {
    #[serde(default)]
    rich_component: Option<RichComponent>,
    #[serde(default)]
    simple_component: Option<SimpleComponent>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl From<UiComponentRepr> for UiComponent {
    fn from(repr: UiComponentRepr) -> Self {
        let simple_component = repr.simple_component.or_else(|| {
            repr.rich_component.as_ref().map(|r| SimpleComponent {
                text: r.to_plain_text(),
            })
        });
        Self {
            rich_component: repr.rich_component,
            simple_component,
            timestamp: repr.timestamp,
        }
    }
}

impl UiComponent {
    /// A rich component with its derived plain-text fallback.
    pub fn from_rich(rich: RichComponent) -> Self {
        let simple = SimpleComponent {
            text: rich.to_plain_text(),
        };
        Self {
            rich_component: Some(rich),
            simple_component: Some(simple),
            timestamp: Utc::now(),
        }
    }

    /// A plain-text-only component.
    pub fn simple(text: impl Into<String>) -> Self {
        Self {
            rich_component: None,
            simple_component: Some(SimpleComponent { text: text.into() }),
            timestamp: Utc::now(),
        }
    }

    /// An assistant text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self::from_rich(RichComponent::Text {
            content: content.into(),
            markdown: true,
        })
    }

    pub fn status(level: Severity, message: impl Into<String>) -> Self {
        Self::from_rich(RichComponent::Status {
            level,
            message: message.into(),
            detail: None,
        })
    }

    pub fn status_with_detail(level: Severity, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::from_rich(RichComponent::Status {
            level,
            message: message.into(),
            detail: Some(detail.into()),
        })
    }

    pub fn notification(level: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_rich(RichComponent::Notification {
            level,
            title: title.into(),
            message: message.into(),
        })
    }

    /// Replace the derived fallback with hand-written text.
    pub fn with_simple_text(mut self, text: impl Into<String>) -> Self {
        self.simple_component = Some(SimpleComponent { text: text.into() });
        self
    }

    pub fn rich(&self) -> Option<&RichComponent> {
        self.rich_component.as_ref()
    }

    /// Always present for components built through this API.
    pub fn simple_component(&self) -> Option<&SimpleComponent> {
        self.simple_component.as_ref()
    }

    /// The plain-text fallback, or an empty string.
    pub fn plain_text(&self) -> &str {
        self.simple_component
            .as_ref()
            .map(|s| s.text.as_str())
            .unwrap_or_default()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_status(&self) -> bool {
        matches!(self.rich_component, Some(RichComponent::Status { .. }))
    }
}
