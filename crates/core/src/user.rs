//! User identity and the request metadata it is resolved from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::AuthError;

/// An authenticated, group-scoped user. Immutable for the duration of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Group memberships used for tool authorization
    #[serde(default)]
    pub group_memberships: BTreeSet<String>,

    /// Data-scoping attributes (region, tenant, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            group_memberships: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_memberships = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// True when the user belongs to at least one of `groups`, or when
    /// `groups` is empty (public).
    pub fn is_member_of_any<'a, I>(&self, groups: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut groups = groups.into_iter().peekable();
        if groups.peek().is_none() {
            return true;
        }
        groups.any(|g| self.group_memberships.contains(g))
    }
}

/// Opaque transport metadata. Consumed only by a [`UserResolver`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    /// Request headers, keys lowercased
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub cookies: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Maps request metadata to a [`User`].
///
/// Must fail with [`AuthError`] when credentials are absent, malformed or
/// expired. There is no anonymous fallback.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve_user(&self, request: &RequestContext) -> Result<User, AuthError>;
}

/// Resolves every request to the same user. Useful for CLIs and tests.
pub struct StaticUserResolver {
    user: User,
}

impl StaticUserResolver {
    pub fn new(user: User) -> Self {
        Self { user }
    }
}

#[async_trait]
impl UserResolver for StaticUserResolver {
    async fn resolve_user(&self, _request: &RequestContext) -> Result<User, AuthError> {
        Ok(self.user.clone())
    }
}
