//! Credentials for REST backends
//!
//! Two tokens may be stored: the auth token of a logged-in user and a guest
//! token. Requests use the auth token when there is one and fall back to the
//! guest token unless the endpoint demands a logged-in user.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{DEFAULT_STORAGE_PREFIX, TokenRequirement};
use crate::core::error::TabulaResult;

/// Storage key of the auth token, before prefixing
pub const AUTH_TOKEN_KEY: &str = "AuthToken";

/// Storage key of the guest token, before prefixing
pub const GUEST_TOKEN_KEY: &str = "GuestToken";

/// Window before expiry in which a token counts as expiring soon
pub const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// A bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
            token_type: default_token_type(),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Still valid, but expiring within [`EXPIRY_MARGIN_MINUTES`]
    pub fn is_expiring_soon_at(&self, now: DateTime<Utc>) -> bool {
        self.is_valid_at(now) && self.expires_at <= now + Duration::minutes(EXPIRY_MARGIN_MINUTES)
    }
}

/// Persistence of tokens by key
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Token>;
    fn set(&self, key: &str, token: Token);
    fn remove(&self, key: &str);
}

/// Process-local token store, namespaced by a prefix
#[derive(Debug)]
pub struct InMemoryTokenStore {
    prefix: String,
    tokens: RwLock<HashMap<String, Token>>,
}

impl InMemoryTokenStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Keys as stored, prefix included
    pub fn stored_keys(&self) -> Vec<String> {
        self.tokens
            .read()
            .map(|tokens| tokens.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_PREFIX)
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self, key: &str) -> Option<Token> {
        let tokens = self.tokens.read().ok()?;
        tokens.get(&self.key(key)).cloned()
    }

    fn set(&self, key: &str, token: Token) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(self.key(key), token);
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.remove(&self.key(key));
        }
    }
}

/// Exchanges an auth token for a fresh one
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, current: &Token) -> TabulaResult<Token>;
}

/// Credential state shared by every request of a client
#[derive(Clone)]
pub struct Credentials {
    store: Arc<dyn TokenStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("authenticated", &self.is_authenticated())
            .field("refresher", &self.refresher.is_some())
            .finish()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryTokenStore::default()))
    }
}

impl Credentials {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            refresher: None,
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn set_refresher(&mut self, refresher: Arc<dyn TokenRefresher>) {
        self.refresher = Some(refresher);
    }

    pub fn auth_token(&self) -> Option<Token> {
        self.store.get(AUTH_TOKEN_KEY)
    }

    pub fn guest_token(&self) -> Option<Token> {
        self.store.get(GUEST_TOKEN_KEY)
    }

    pub fn set_auth_token(&self, token: Token) {
        self.store.set(AUTH_TOKEN_KEY, token);
    }

    pub fn set_guest_token(&self, token: Token) {
        self.store.set(GUEST_TOKEN_KEY, token);
    }

    /// Token to send for a request with the given requirement
    pub fn resolve(&self, requirement: TokenRequirement) -> Option<Token> {
        match requirement {
            TokenRequirement::Skip => None,
            TokenRequirement::RequiredAuth => self.auth_token(),
            TokenRequirement::Optional | TokenRequirement::Required => {
                self.auth_token().or_else(|| self.guest_token())
            }
        }
    }

    /// Whether an unexpired auth token is stored
    pub fn is_authenticated(&self) -> bool {
        self.auth_token().is_some_and(|t| t.is_valid_at(Utc::now()))
    }

    pub fn is_expiring_soon(&self) -> bool {
        self.auth_token()
            .is_some_and(|t| t.is_expiring_soon_at(Utc::now()))
    }

    /// Remove both tokens
    pub fn logout(&self) {
        self.store.remove(AUTH_TOKEN_KEY);
        self.store.remove(GUEST_TOKEN_KEY);
        tracing::info!("credentials cleared");
    }

    /// Replace the auth token with a fresh one
    ///
    /// Returns false when there is nothing to refresh or no refresher. A
    /// failed refresh logs out.
    pub async fn refresh(&self) -> bool {
        let (Some(current), Some(refresher)) = (self.auth_token(), self.refresher.clone()) else {
            return false;
        };
        match refresher.refresh(&current).await {
            Ok(token) => {
                tracing::debug!(expires_at = %token.expires_at, "auth token refreshed");
                self.set_auth_token(token);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                self.logout();
                false
            }
        }
    }

    /// Refresh the auth token when it is about to expire
    pub async fn refresh_if_expiring(&self) -> bool {
        if self.is_authenticated() && self.is_expiring_soon() {
            self.refresh().await
        } else {
            false
        }
    }
}

/// Refresher that always fails, for tests and offline use
#[derive(Debug, Default)]
pub struct NoRefresher;

#[async_trait]
impl TokenRefresher for NoRefresher {
    async fn refresh(&self, _current: &Token) -> TabulaResult<Token> {
        Err(anyhow!("token refresh is not available").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Renewing;

    #[async_trait]
    impl TokenRefresher for Renewing {
        async fn refresh(&self, current: &Token) -> TabulaResult<Token> {
            Ok(Token::new(format!("{}-renewed", current.token), Utc::now() + Duration::hours(1)))
        }
    }

    #[test]
    fn test_store_prefixes_keys() {
        let store = InMemoryTokenStore::default();
        store.set(AUTH_TOKEN_KEY, Token::new("abc", Utc::now()));
        assert_eq!(store.stored_keys(), vec!["tabula_AuthToken".to_string()]);
        assert!(store.get(AUTH_TOKEN_KEY).is_some());
    }

    #[test]
    fn test_resolve_prefers_auth_token() {
        let credentials = Credentials::default();
        let later = Utc::now() + Duration::hours(1);
        credentials.set_guest_token(Token::new("guest", later));

        assert_eq!(credentials.resolve(TokenRequirement::Optional).unwrap().token, "guest");
        assert!(credentials.resolve(TokenRequirement::RequiredAuth).is_none());
        assert!(credentials.resolve(TokenRequirement::Skip).is_none());

        credentials.set_auth_token(Token::new("auth", later));
        assert_eq!(credentials.resolve(TokenRequirement::Required).unwrap().token, "auth");
    }

    #[test]
    fn test_expiring_soon() {
        let now = Utc::now();
        assert!(Token::new("t", now + Duration::minutes(4)).is_expiring_soon_at(now));
        assert!(!Token::new("t", now + Duration::minutes(6)).is_expiring_soon_at(now));
        assert!(!Token::new("t", now - Duration::minutes(1)).is_expiring_soon_at(now));
    }

    #[tokio::test]
    async fn test_refresh_success_and_failure() {
        let credentials = Credentials::default().with_refresher(Arc::new(Renewing));
        assert!(!credentials.refresh().await);

        credentials.set_auth_token(Token::new("old", Utc::now() + Duration::minutes(2)));
        assert!(credentials.refresh_if_expiring().await);
        assert_eq!(credentials.auth_token().unwrap().token, "old-renewed");

        let failing = Credentials::default().with_refresher(Arc::new(NoRefresher));
        failing.set_auth_token(Token::new("old", Utc::now()));
        failing.set_guest_token(Token::new("guest", Utc::now()));
        assert!(!failing.refresh().await);
        assert!(failing.auth_token().is_none());
        assert!(failing.guest_token().is_none());
    }
}
