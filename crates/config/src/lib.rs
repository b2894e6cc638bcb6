//! Configuration loading, validation, and management for toolgate.
//!
//! Loads configuration from `~/.toolgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use toolgate_core::{AgentConfig, AuditConfig, UiFeatures, User};

/// The root configuration structure.
///
/// Maps directly to `~/.toolgate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent loop limits and toggles
    #[serde(default)]
    pub agent: AgentConfig,

    /// Audit trail toggles
    #[serde(default)]
    pub audit: AuditConfig,

    /// Optional JSON-lines audit file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<String>,

    /// UI feature visibility by group
    #[serde(default)]
    pub ui_features: UiFeatures,

    /// Row-level scoping rules applied before tool execution
    #[serde(default)]
    pub scoping: Vec<ScopeRuleConfig>,

    /// Users known to the token resolver
    #[serde(default)]
    pub users: Vec<UserConfig>,

    /// Conversation store backend
    #[serde(default)]
    pub store: StoreConfig,
}

/// How a scoping rule applies the user's attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// Set `argument` to the attribute value
    Inject,
    /// Append `column = '<value>'` to the SQL text in `argument`
    SqlPredicate,
}

/// A row-level scoping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRuleConfig {
    /// Tool the rule applies to
    pub tool: String,

    /// User attribute that scopes the data
    pub attribute: String,

    /// Argument to rewrite
    pub argument: String,

    #[serde(default = "default_scope_mode")]
    pub mode: ScopeMode,

    /// Column name for `sql_predicate` (defaults to the attribute name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

fn default_scope_mode() -> ScopeMode {
    ScopeMode::Inject
}

/// A user the token resolver recognizes.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Hex SHA-256 of the bearer token
    pub token_sha256: String,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl UserConfig {
    pub fn to_user(&self) -> User {
        let name = if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name.clone()
        };
        let mut user = User::new(&self.id)
            .with_name(name)
            .with_groups(self.groups.iter().cloned());
        user.attributes = self.attributes.clone();
        user
    }
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token_sha256", &"[REDACTED]")
            .field("groups", &self.groups)
            .field("attributes", &self.attributes)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// Directory for the file backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolgate/config.toml).
    ///
    /// Environment overrides:
    /// - `TOOLGATE_MAX_TOOL_ITERATIONS`
    /// - `TOOLGATE_TEMPERATURE`
    /// - `TOOLGATE_STORE_PATH` (also switches the store to the file backend)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("TOOLGATE_MAX_TOOL_ITERATIONS") {
            self.agent.max_tool_iterations = value.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TOOLGATE_MAX_TOOL_ITERATIONS must be an integer, got '{value}'"
                ))
            })?;
        }

        if let Ok(value) = std::env::var("TOOLGATE_TEMPERATURE") {
            self.agent.temperature = value.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TOOLGATE_TEMPERATURE must be a number, got '{value}'"
                ))
            })?;
        }

        if let Ok(path) = std::env::var("TOOLGATE_STORE_PATH") {
            self.store.backend = StoreBackend::File;
            self.store.path = Some(path);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolgate")
    }

    /// Directory used by the file store when no path is configured.
    pub fn conversations_dir(&self) -> PathBuf {
        self.store
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("conversations"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }

        if self.agent.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tokens must be at least 1".into(),
            ));
        }

        if self.agent.turn_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.turn_timeout_secs must be positive when set".into(),
            ));
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.id.trim().is_empty() {
                return Err(ConfigError::ValidationError("users[].id must not be empty".into()));
            }
            if !seen.insert(user.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate user id '{}'",
                    user.id
                )));
            }
            let digest_ok = user.token_sha256.len() == 64
                && user.token_sha256.chars().all(|c| c.is_ascii_hexdigit());
            if !digest_ok {
                return Err(ConfigError::ValidationError(format!(
                    "users['{}'].token_sha256 must be 64 hex characters",
                    user.id
                )));
            }
        }

        for rule in &self.scoping {
            if rule.tool.is_empty() || rule.attribute.is_empty() || rule.argument.is_empty() {
                return Err(ConfigError::ValidationError(
                    "scoping rules need non-empty tool, attribute and argument".into(),
                ));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
