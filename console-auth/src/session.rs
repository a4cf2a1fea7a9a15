//! Session state and validation.
//!
//! [`AuthSession`] owns the stored bearer credential and the cached user. It
//! is created by the application at startup and handed to whatever needs it;
//! nothing reads session state from globals.
//!
//! [`SessionValidator`] runs before every protected navigation and reports one
//! of three outcomes:
//!
//! - **valid**: render the page
//! - **expired**: the credential is definitively dead; it has been purged and
//!   the user must log in again
//! - **indeterminate**: the backend could not be reached; keep the user where
//!   they are and retry later

use crate::claims;
use crate::error::{AuthError, AuthResult};
use crate::storage::{Storage, TOKEN_KEY, USER_KEY};
use async_trait::async_trait;
use console_rbac::{PermissionEngine, PermissionSet};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The authenticated user as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: String,

    /// Email address
    #[serde(default)]
    pub email: String,

    /// Login name
    #[serde(default)]
    pub username: String,

    /// Administrators bypass permission checks
    #[serde(default, alias = "isAdmin")]
    pub is_admin: bool,

    /// Group memberships, used to derive permissions
    #[serde(default)]
    pub groups: Vec<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "displayName")]
    pub display_name: Option<String>,

    /// Any other profile fields
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl User {
    /// Create a user with the required fields.
    pub fn new(id: impl Into<String>, email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            username: username.into(),
            is_admin: false,
            groups: Vec::new(),
            display_name: None,
            extra: HashMap::new(),
        }
    }

    /// Mark the user as administrator.
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// Set group memberships.
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// The signed-in session: bearer credential plus cached user.
///
/// Cloning shares the underlying storage.
#[derive(Clone)]
pub struct AuthSession {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &self.token().map(|_| "[REDACTED]"))
            .field("user", &self.user().map(|u| u.id))
            .finish()
    }
}

impl AuthSession {
    /// Create a session over persistent storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Record a successful login.
    pub fn login(&self, token: &str, user: &User) -> AuthResult<()> {
        self.storage.set(TOKEN_KEY, token);
        self.update_user(user)?;
        info!(user_id = %user.id, "Session started");
        Ok(())
    }

    /// Destroy the session: purge credential and cached user.
    pub fn logout(&self) {
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(USER_KEY);
        debug!("Session cleared");
    }

    /// Replace the cached user.
    pub fn update_user(&self, user: &User) -> AuthResult<()> {
        let json = serde_json::to_string(user)
            .map_err(|e| AuthError::Internal(format!("User serialization failed: {}", e)))?;
        self.storage.set(USER_KEY, &json);
        Ok(())
    }

    /// Drop the cached user, keeping the credential.
    pub fn clear_user(&self) {
        self.storage.remove(USER_KEY);
    }

    /// The stored bearer credential.
    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY).filter(|token| !token.is_empty())
    }

    /// The cached user. An unreadable cache entry reads as no user.
    pub fn user(&self) -> Option<User> {
        let json = self.storage.get(USER_KEY)?;
        match serde_json::from_str(&json) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Discarding unreadable cached user: {}", e);
                None
            }
        }
    }

    /// Whether the cached user is an administrator.
    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|user| user.is_admin)
    }

    /// Permission checks for this session's user.
    ///
    /// Without a cached user the engine denies everything.
    pub fn permissions(&self, permissions: PermissionSet) -> PermissionEngine {
        match self.user() {
            Some(user) => PermissionEngine::new(user.is_admin, permissions),
            None => PermissionEngine::default(),
        }
    }
}

/// Outcome of [`SessionValidator::validate_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionValidation {
    /// The credential was accepted
    pub authenticated: bool,

    /// The credential is definitively expired or rejected
    pub expired: bool,

    /// Why validity could not be decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionValidation {
    /// Credential accepted.
    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
            expired: false,
            error: None,
        }
    }

    /// No credential stored.
    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            expired: false,
            error: None,
        }
    }

    /// Credential expired or rejected.
    pub fn expired() -> Self {
        Self {
            authenticated: false,
            expired: true,
            error: None,
        }
    }

    /// Validity unknown.
    pub fn indeterminate(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            expired: false,
            error: Some(error.into()),
        }
    }

    /// Check if the caller should retry rather than log out.
    pub fn is_indeterminate(&self) -> bool {
        self.error.is_some()
    }

    /// Convert to a result for `?`-style callers.
    ///
    /// An empty session (no credential) maps to `SessionExpired`, since both
    /// mean "send the user to login".
    pub fn into_result(self) -> AuthResult<()> {
        match self {
            Self { authenticated: true, .. } => Ok(()),
            Self { error: Some(error), .. } => Err(AuthError::SessionIndeterminate(error)),
            _ => Err(AuthError::SessionExpired),
        }
    }
}

/// Why the backend did not confirm the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend rejected the credential (HTTP 401)
    Unauthorized,
    /// Any other failure: network, timeout, 5xx, unreadable body
    Unavailable(String),
}

/// The backend's "who am I" endpoint.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Resolve the user owning `token`.
    async fn current_user(&self, token: &str) -> Result<User, BackendError>;
}

/// Configuration for [`HttpSessionBackend`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClientConfig {
    /// Console API base URL (e.g., "https://console.example.com")
    pub base_url: String,

    /// Path of the "who am I" endpoint
    pub me_path: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SessionClientConfig {
    /// Returns defaults suitable for local development.
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            me_path: "/api/auth/me".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SessionClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CONSOLE_API_URL`: console API base URL (default: http://localhost:8080)
    /// - `CONSOLE_API_ME_PATH`: "who am I" path (default: /api/auth/me)
    /// - `CONSOLE_API_TIMEOUT_SECS`: request timeout in seconds (default: 10)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            base_url: std::env::var("CONSOLE_API_URL").unwrap_or(default.base_url),
            me_path: std::env::var("CONSOLE_API_ME_PATH").unwrap_or(default.me_path),
            timeout_secs: std::env::var("CONSOLE_API_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.timeout_secs),
        }
    }

    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full URL of the "who am I" endpoint.
    pub fn me_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.me_path)
    }
}

/// "Who am I" responses come either wrapped or bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum MeResponse {
    Wrapped { user: User },
    Bare(User),
}

/// [`SessionBackend`] over HTTP.
#[derive(Clone)]
pub struct HttpSessionBackend {
    client: Client,
    config: SessionClientConfig,
}

impl HttpSessionBackend {
    /// Create a backend client.
    pub fn new(config: SessionClientConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    #[instrument(skip(self, token))]
    async fn current_user(&self, token: &str) -> Result<User, BackendError> {
        let response = self
            .client
            .get(self.config.me_url())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized);
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "Backend returned HTTP {}",
                status.as_u16()
            )));
        }

        match response.json::<MeResponse>().await {
            Ok(MeResponse::Wrapped { user }) | Ok(MeResponse::Bare(user)) => Ok(user),
            Err(e) => Err(BackendError::Unavailable(format!("Invalid user response: {}", e))),
        }
    }
}

/// Decides whether the current session may proceed.
#[derive(Clone)]
pub struct SessionValidator {
    session: AuthSession,
    backend: Arc<dyn SessionBackend>,
}

impl SessionValidator {
    /// Create a validator.
    pub fn new(session: AuthSession, backend: Arc<dyn SessionBackend>) -> Self {
        Self { session, backend }
    }

    /// The session being validated.
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Validate the stored credential.
    ///
    /// 1. No credential: unauthenticated, cached user cleared.
    /// 2. Structured token whose `exp` has passed: purged, expired, no
    ///    network call. A token that cannot be decoded falls through.
    /// 3. Otherwise ask the backend. Success refreshes the cached user; 401
    ///    purges and reports expired; anything else leaves state alone and
    ///    reports indeterminate.
    ///
    /// A backend reply is only acted on while the credential it was asked
    /// about is still the stored one. After a concurrent logout or re-login
    /// the current session is validated instead.
    #[instrument(skip(self))]
    pub async fn validate_session(&self) -> SessionValidation {
        loop {
            let Some(token) = self.session.token() else {
                self.session.clear_user();
                return SessionValidation::unauthenticated();
            };

            if claims::is_structured(&token) {
                match claims::decode_unverified(&token) {
                    Ok(claims) if claims.is_expired() => {
                        info!("Session token expired locally, clearing session");
                        self.session.logout();
                        return SessionValidation::expired();
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Could not decode token claims, asking backend: {}", e),
                }
            }

            let reply = self.backend.current_user(&token).await;
            if self.session.token().as_deref() != Some(token.as_str()) {
                debug!("Session changed during validation, checking the current one");
                continue;
            }

            return match reply {
                Ok(user) => {
                    if let Err(e) = self.session.update_user(&user) {
                        warn!("Failed to cache user: {}", e);
                    }
                    SessionValidation::authenticated()
                }
                Err(BackendError::Unauthorized) => {
                    info!("Backend rejected session token, clearing session");
                    self.session.logout();
                    SessionValidation::expired()
                }
                Err(BackendError::Unavailable(message)) => {
                    warn!("Session validation inconclusive: {}", message);
                    SessionValidation::indeterminate(message)
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedBackend {
        reply: Mutex<Result<User, BackendError>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(reply: Result<User, BackendError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionBackend for ScriptedBackend {
        async fn current_user(&self, _token: &str) -> Result<User, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.lock().unwrap().clone()
        }
    }

    fn token_expiring_in(delta: ChronoDuration) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let exp = (Utc::now() + delta).timestamp();
        let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp }).to_string());
        format!("{}.{}.sig", header, payload)
    }

    fn alice() -> User {
        User::new("u-1", "alice@example.com", "alice")
    }

    fn setup(reply: Result<User, BackendError>) -> (AuthSession, Arc<ScriptedBackend>, SessionValidator) {
        let session = AuthSession::new(Arc::new(MemoryStorage::new()));
        let backend = ScriptedBackend::new(reply);
        let validator = SessionValidator::new(session.clone(), backend.clone());
        (session, backend, validator)
    }

    #[tokio::test]
    async fn test_no_credential() {
        let (session, backend, validator) = setup(Ok(alice()));
        session.update_user(&alice()).unwrap();

        let result = validator.validate_session().await;
        assert_eq!(result, SessionValidation::unauthenticated());
        assert!(session.user().is_none());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_locally_expired_skips_backend() {
        let (session, backend, validator) = setup(Ok(alice()));
        session
            .login(&token_expiring_in(ChronoDuration::minutes(-1)), &alice())
            .unwrap();

        let result = validator.validate_session().await;
        assert_eq!(result, SessionValidation::expired());
        assert_eq!(backend.calls(), 0);
        assert!(session.token().is_none());
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn test_valid_token_refreshes_user() {
        let updated = alice().with_admin(true);
        let (session, backend, validator) = setup(Ok(updated.clone()));
        session
            .login(&token_expiring_in(ChronoDuration::hours(1)), &alice())
            .unwrap();

        let result = validator.validate_session().await;
        assert_eq!(result, SessionValidation::authenticated());
        assert_eq!(backend.calls(), 1);
        assert_eq!(session.user(), Some(updated));
        assert!(session.is_admin());
    }

    #[tokio::test]
    async fn test_opaque_token_goes_to_backend() {
        let (session, backend, validator) = setup(Ok(alice()));
        session.login("opaque-token", &alice()).unwrap();

        assert!(validator.validate_session().await.authenticated);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_structured_token_falls_through() {
        let (session, backend, validator) = setup(Ok(alice()));
        session.login("aaa.bbb.ccc", &alice()).unwrap();

        assert!(validator.validate_session().await.authenticated);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_purges() {
        let (session, _backend, validator) = setup(Err(BackendError::Unauthorized));
        session.login("opaque-token", &alice()).unwrap();

        let result = validator.validate_session().await;
        assert_eq!(result, SessionValidation::expired());
        assert!(session.token().is_none());
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_keeps_state() {
        let (session, _backend, validator) =
            setup(Err(BackendError::Unavailable("connection refused".into())));
        session.login("opaque-token", &alice()).unwrap();

        let result = validator.validate_session().await;
        assert!(!result.authenticated);
        assert!(!result.expired);
        assert!(result.is_indeterminate());
        assert_eq!(result.error.as_deref(), Some("connection refused"));
        assert_eq!(session.token().as_deref(), Some("opaque-token"));
        assert_eq!(session.user(), Some(alice()));
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_converges() {
        let (session, _backend, validator) = setup(Err(BackendError::Unauthorized));
        session.login("opaque-token", &alice()).unwrap();

        let other = validator.clone();
        let (a, b) = tokio::join!(validator.validate_session(), other.validate_session());

        // Whichever finishes second may find the session already purged.
        for result in [a, b] {
            assert!(!result.authenticated);
            assert!(!result.is_indeterminate());
        }
        assert!(session.token().is_none());
        assert!(session.user().is_none());
    }

    /// Replaces the stored credential while the first request is in flight.
    struct ReloginBackend {
        session: AuthSession,
        reply: Result<User, BackendError>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionBackend for ReloginBackend {
        async fn current_user(&self, token: &str) -> Result<User, BackendError> {
            let first = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(token.to_string());
                seen.len() == 1
            };
            if first {
                self.session.login("fresh-token", &alice()).unwrap();
                return self.reply.clone();
            }
            Ok(alice())
        }
    }

    #[tokio::test]
    async fn test_relogin_during_validation_checks_new_session() {
        for reply in [Ok(alice()), Err(BackendError::Unauthorized)] {
            let session = AuthSession::new(Arc::new(MemoryStorage::new()));
            session.login("stale-token", &alice()).unwrap();
            let backend = Arc::new(ReloginBackend {
                session: session.clone(),
                reply,
                seen: Mutex::new(Vec::new()),
            });
            let validator = SessionValidator::new(session.clone(), backend.clone());

            let result = validator.validate_session().await;
            assert_eq!(result, SessionValidation::authenticated());
            assert_eq!(session.token().as_deref(), Some("fresh-token"));
            assert_eq!(
                *backend.seen.lock().unwrap(),
                vec!["stale-token".to_string(), "fresh-token".to_string()]
            );
        }
    }

    #[tokio::test]
    async fn test_logout_during_validation() {
        struct LogoutBackend(AuthSession);

        #[async_trait]
        impl SessionBackend for LogoutBackend {
            async fn current_user(&self, _token: &str) -> Result<User, BackendError> {
                self.0.logout();
                Ok(alice())
            }
        }

        let session = AuthSession::new(Arc::new(MemoryStorage::new()));
        session.login("opaque-token", &alice()).unwrap();
        let validator = SessionValidator::new(session.clone(), Arc::new(LogoutBackend(session.clone())));

        assert_eq!(validator.validate_session().await, SessionValidation::unauthenticated());
        assert!(session.user().is_none());
    }

    #[test]
    fn test_into_result() {
        assert!(SessionValidation::authenticated().into_result().is_ok());
        assert!(matches!(
            SessionValidation::expired().into_result(),
            Err(AuthError::SessionExpired)
        ));
        assert!(matches!(
            SessionValidation::indeterminate("x").into_result(),
            Err(AuthError::SessionIndeterminate(_))
        ));
    }

    #[test]
    fn test_session_permissions() {
        let session = AuthSession::new(Arc::new(MemoryStorage::new()));
        let set: PermissionSet = vec![console_rbac::Permission::new("pods", ["read"])]
            .into_iter()
            .collect();

        assert!(!session.permissions(set.clone()).can_read("pods"));

        session.login("t", &alice()).unwrap();
        assert!(session.permissions(set.clone()).can_read("pods"));
        assert!(!session.permissions(set.clone()).can_delete("pods"));

        session.update_user(&alice().with_admin(true)).unwrap();
        assert!(session.permissions(PermissionSet::new()).can_delete("pods"));
    }

    #[test]
    fn test_user_aliases() {
        let user: User = serde_json::from_str(
            r#"{"id":"u-1","email":"a@b.c","username":"a","isAdmin":true,"groups":["ops"],"locale":"en"}"#,
        )
        .unwrap();
        assert!(user.is_admin);
        assert_eq!(user.groups, vec!["ops".to_string()]);
        assert_eq!(user.extra.get("locale"), Some(&serde_json::json!("en")));
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = AuthSession::new(Arc::new(MemoryStorage::new()));
        session.login("super-secret-token", &alice()).unwrap();
        assert!(!format!("{:?}", session).contains("super-secret-token"));
    }
}
