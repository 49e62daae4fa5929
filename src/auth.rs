use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::Error;

/// Caller identity resolution. Session issuance lives outside this
/// service; the engines only need a bearer token mapped to a user id.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve a bearer token to a user id. Any failure is plain
    /// [`Error::Unauthorized`]; the response never reveals whether a
    /// given user or token exists.
    async fn authenticate(&self, token: &str) -> Result<String, Error>;
}

/// Token table resolved at startup, for demos, embedding, and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenAuth {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn authenticate(&self, token: &str) -> Result<String, Error> {
        self.tokens.get(token).cloned().ok_or(Error::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves_to_its_user() {
        let auth = StaticTokenAuth::new().with_token("tok-1", "alice");
        assert_eq!(auth.authenticate("tok-1").await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let auth = StaticTokenAuth::new().with_token("tok-1", "alice");
        assert!(matches!(
            auth.authenticate("tok-2").await,
            Err(Error::Unauthorized)
        ));
    }
}
