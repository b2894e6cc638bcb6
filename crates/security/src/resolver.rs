//! Bearer-token authentication against configured users.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use toolgate_config::UserConfig;
use toolgate_core::{AuthError, RequestContext, User, UserResolver};

/// Resolves `Authorization: Bearer <token>` to a configured [`User`].
///
/// Only SHA-256 digests of tokens are held; the raw token is hashed on
/// each request and looked up by digest.
pub struct TokenUserResolver {
    users_by_digest: HashMap<String, User>,
}

impl std::fmt::Debug for TokenUserResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenUserResolver")
            .field("user_count", &self.users_by_digest.len())
            .finish()
    }
}

impl TokenUserResolver {
    pub fn new(users: &[UserConfig]) -> Self {
        let users_by_digest = users
            .iter()
            .map(|u| (u.token_sha256.to_ascii_lowercase(), u.to_user()))
            .collect();
        Self { users_by_digest }
    }

    /// Hex SHA-256 of a raw token, the form stored in config.
    pub fn digest(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }
}

#[async_trait]
impl UserResolver for TokenUserResolver {
    async fn resolve_user(&self, request: &RequestContext) -> Result<User, AuthError> {
        let header = request
            .header("authorization")
            .ok_or_else(|| AuthError::MissingCredentials("no Authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Malformed("expected 'Bearer <token>'".into()))?;

        match self.users_by_digest.get(&Self::digest(token)) {
            Some(user) => {
                tracing::debug!(user = %user.id, "Resolved user from bearer token");
                Ok(user.clone())
            }
            None => {
                tracing::warn!("Rejected unknown bearer token");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn resolver() -> TokenUserResolver {
        TokenUserResolver::new(&[UserConfig {
            id: "alice".into(),
            name: "Alice".into(),
            token_sha256: TokenUserResolver::digest("s3cret"),
            groups: vec!["analyst".into()],
            attributes: BTreeMap::new(),
        }])
    }

    #[tokio::test]
    async fn resolves_known_token() {
        let ctx = RequestContext::new().with_header("Authorization", "Bearer s3cret");
        let user = resolver().resolve_user(&ctx).await.unwrap();
        assert_eq!(user.id, "alice");
        assert_eq!(user.name, "Alice");
        assert!(user.group_memberships.contains("analyst"));
    }

    #[tokio::test]
    async fn missing_header_is_an_error() {
        let err = resolver().resolve_user(&RequestContext::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn malformed_header_is_an_error() {
        let ctx = RequestContext::new().with_header("authorization", "Basic abc");
        let err = resolver().resolve_user(&ctx).await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));

        let ctx = RequestContext::new().with_header("authorization", "Bearer   ");
        assert!(matches!(
            resolver().resolve_user(&ctx).await.unwrap_err(),
            AuthError::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let ctx = RequestContext::new().with_header("authorization", "Bearer nope");
        assert_eq!(
            resolver().resolve_user(&ctx).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[test]
    fn digest_matches_known_vector() {
        assert_eq!(
            TokenUserResolver::digest("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }
}
