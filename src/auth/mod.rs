//! Credential resolution for calendar access.
//!
//! Tool handlers turn the run's identity into a bearer credential through a
//! [`CredentialProvider`]. Providers are shared by every concurrent loop
//! run, so implementations must be safe for concurrent use.

pub mod crypto;
pub mod oauth;
pub mod store;

pub use crypto::{CryptoError, TokenCipher};
pub use oauth::{IdClaims, OAuthClient, OAuthError, TokenResponse};
pub use store::{Session, SessionStore, StoreError, User};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::Config;

/// Identity used by the CLI and by dev-mode requests without a session.
pub const LOCAL_IDENTITY: &str = "local";

/// Tokens expiring within this window are refreshed before use.
const REFRESH_SKEW_SECS: i64 = 60;

/// Credential failures. Never retryable within a loop run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No session found for {0}")]
    UnknownSession(String),

    #[error("Session {0} has expired; sign in again")]
    Expired(String),

    #[error("Credentials were rejected: {0}")]
    Rejected(String),

    #[error("Token refresh failed: {0}")]
    Refresh(#[from] OAuthError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

/// A bearer credential for the calendar API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn expiring(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Some(expires_at),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

/// Resolves an identity to a usable credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, identity: &str) -> Result<Credential, AuthError>;
}

/// Same bearer token for every identity.
pub struct StaticCredentials {
    credential: Credential,
}

impl StaticCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            credential: Credential::bearer(access_token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn resolve(&self, _identity: &str) -> Result<Credential, AuthError> {
        Ok(self.credential.clone())
    }
}

/// Session-backed credentials with transparent refresh.
///
/// The identity is a session id. A token close to expiry is refreshed
/// through the OAuth client (when one is configured and the session holds a
/// refresh token) and written back to the store. Refreshes of one session
/// are serialized, so concurrent runs share a single token request.
pub struct SessionCredentials {
    store: Arc<SessionStore>,
    oauth: Option<OAuthClient>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionCredentials {
    pub fn new(store: Arc<SessionStore>, oauth: Option<OAuthClient>) -> Self {
        Self {
            store,
            oauth,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    fn load(&self, identity: &str) -> Result<Session, AuthError> {
        self.store
            .get_session(identity)?
            .ok_or_else(|| AuthError::UnknownSession(identity.to_string()))
    }

    /// Refresh under the session's lock. Re-reads the session first because
    /// another run may have refreshed it while this one waited.
    async fn refresh(&self, identity: &str) -> Result<Credential, AuthError> {
        let session = self.load(identity)?;
        let now = Utc::now();
        if let Some(credential) = usable(&session, now) {
            tracing::debug!("Session {} was refreshed concurrently", identity);
            return Ok(credential);
        }

        let (Some(oauth), Some(refresh_token)) = (&self.oauth, session.refresh_token.as_deref())
        else {
            return Err(AuthError::Expired(identity.to_string()));
        };

        tracing::info!("Refreshing access token for session {}", identity);
        let token = oauth.refresh(refresh_token).await?;
        let expires_at = token.expires_at(now);
        self.store.update_tokens(
            identity,
            &token.access_token,
            token.refresh_token.as_deref(),
            expires_at,
        )?;

        Ok(Credential::expiring(token.access_token, expires_at))
    }
}

/// The session's current token, unless it expires within the refresh window.
fn usable(session: &Session, now: DateTime<Utc>) -> Option<Credential> {
    (session.expires_at > now + Duration::seconds(REFRESH_SKEW_SECS))
        .then(|| Credential::expiring(session.access_token.clone(), session.expires_at))
}

#[async_trait]
impl CredentialProvider for SessionCredentials {
    async fn resolve(&self, identity: &str) -> Result<Credential, AuthError> {
        let session = self.load(identity)?;
        if let Some(credential) = usable(&session, Utc::now()) {
            return Ok(credential);
        }

        let lock = Arc::clone(
            self.refresh_locks
                .lock()
                .await
                .entry(identity.to_string())
                .or_default(),
        );
        let result = {
            let _guard = lock.lock().await;
            self.refresh(identity).await
        };
        drop(lock);

        let mut locks = self.refresh_locks.lock().await;
        if locks
            .get(identity)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(identity);
        }

        result
    }
}

/// Everything the CLI and server need to authenticate calendar calls.
pub struct AuthBackend {
    pub credentials: Arc<dyn CredentialProvider>,
    pub store: Arc<SessionStore>,
    pub oauth: Option<OAuthClient>,
}

impl AuthBackend {
    /// Open the session store and pick a credential provider. A configured
    /// static access token takes precedence over stored sessions.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let cipher = TokenCipher::from_key(config.encryption_key.as_deref())?;
        let store = Arc::new(SessionStore::open(&config.database_path, cipher)?);

        let oauth = match config.google_oauth() {
            Some((id, secret)) => Some(OAuthClient::new(
                id,
                secret,
                config.google_redirect_uri.clone(),
            )?),
            None => {
                tracing::warn!("Google OAuth client is not configured; expired sessions cannot be refreshed");
                None
            }
        };

        let credentials: Arc<dyn CredentialProvider> = match &config.google_access_token {
            Some(token) => {
                tracing::info!("Using static Google access token for calendar calls");
                Arc::new(StaticCredentials::new(token.clone()))
            }
            None => Arc::new(SessionCredentials::new(Arc::clone(&store), oauth.clone())),
        };

        Ok(Self {
            credentials,
            store,
            oauth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_session(expires_in: Duration, refresh: Option<&str>) -> Arc<SessionStore> {
        let store = SessionStore::open_in_memory(TokenCipher::disabled()).unwrap();
        store
            .upsert_user(&User {
                user_id: "u1".to_string(),
                email: "u1@example.com".to_string(),
                name: String::new(),
            })
            .unwrap();
        store
            .put_session(&Session {
                session_id: "s1".to_string(),
                user_id: "u1".to_string(),
                access_token: "access".to_string(),
                refresh_token: refresh.map(str::to_string),
                expires_at: Utc::now() + expires_in,
            })
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn static_credentials_ignore_identity() {
        let provider = StaticCredentials::new("token");
        let credential = provider.resolve("anyone").await.unwrap();
        assert_eq!(credential.access_token(), "token");
        assert!(credential.expires_at().is_none());
    }

    #[tokio::test]
    async fn valid_session_resolves_without_refresh() {
        let provider = SessionCredentials::new(store_with_session(Duration::hours(1), None), None);
        let credential = provider.resolve("s1").await.unwrap();
        assert_eq!(credential.access_token(), "access");
    }

    #[tokio::test]
    async fn unknown_session_is_auth_error() {
        let provider = SessionCredentials::new(store_with_session(Duration::hours(1), None), None);
        assert!(matches!(
            provider.resolve("nope").await,
            Err(AuthError::UnknownSession(id)) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn expired_session_without_refresh_path_is_expired() {
        let provider = SessionCredentials::new(
            store_with_session(Duration::minutes(-5), Some("refresh")),
            None,
        );
        assert!(matches!(
            provider.resolve("s1").await,
            Err(AuthError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_runs_share_one_refresh() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = axum::Router::new().route(
            "/token",
            axum::routing::post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    axum::Json(serde_json::json!({
                        "access_token": "fresh",
                        "expires_in": 3600,
                        "refresh_token": "rotated"
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let store = store_with_session(Duration::minutes(-5), Some("refresh"));
        let oauth = OAuthClient::new("client", "secret", "http://localhost/auth/callback")
            .unwrap()
            .with_token_url(format!("http://{}/token", addr));
        let provider = SessionCredentials::new(Arc::clone(&store), Some(oauth));

        let (a, b) = tokio::join!(provider.resolve("s1"), provider.resolve("s1"));

        assert_eq!(a.unwrap().access_token(), "fresh");
        assert_eq!(b.unwrap().access_token(), "fresh");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let session = store.get_session("s1").unwrap().unwrap();
        assert_eq!(session.refresh_token.as_deref(), Some("rotated"));
        assert!(provider.refresh_locks.lock().await.is_empty());
    }

    #[test]
    fn credential_debug_hides_token() {
        let rendered = format!("{:?}", Credential::bearer("ya29.secret"));
        assert!(!rendered.contains("secret"));
    }
}
