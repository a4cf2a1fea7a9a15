//! # Console Auth
//!
//! Client-side single sign-on for the cluster console.
//!
//! ## Overview
//!
//! The console-auth crate handles:
//! - **PKCE**: code verifier, S256 challenge and CSRF state for the
//!   authorization-code flow
//! - **Login**: building the authorization URL and checking the callback
//!   (`oauth` feature)
//! - **Redirects**: validating post-login `redirect` targets against a
//!   whitelist of console routes
//! - **Sessions**: the stored credential, the cached user and tri-state
//!   validation against the backend
//!
//! ## Features
//!
//! - `oauth` (default): [`LoginFlow`] on top of the `oauth2` crate
//!
//! ## Usage
//!
//! ```rust
//! use console_auth::redirect;
//!
//! assert_eq!(redirect::resolve_target(Some("/clusters/prod/pods")), "/clusters/prod/pods");
//! assert_eq!(redirect::resolve_target(Some("//evil.com")), "/dashboard");
//! ```
//!
//! ```rust,no_run
//! use console_auth::{AuthSession, HttpSessionBackend, MemoryStorage, SessionClientConfig, SessionValidator};
//! use std::sync::Arc;
//!
//! # async fn run() -> console_auth::AuthResult<()> {
//! let session = AuthSession::new(Arc::new(MemoryStorage::new()));
//! let backend = HttpSessionBackend::new(SessionClientConfig::from_env())?;
//! let validator = SessionValidator::new(session, Arc::new(backend));
//!
//! let outcome = validator.validate_session().await;
//! if outcome.is_indeterminate() {
//!     // keep the user on the page and retry later
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage
//!
//! Session state goes through the [`Storage`] trait. PKCE parameters belong
//! in tab-scoped storage; the credential and cached user in durable storage.

pub mod claims;
pub mod error;
#[cfg(feature = "oauth")]
pub mod login;
pub mod pkce;
pub mod redirect;
pub mod session;
pub mod storage;

// Re-export main types
pub use claims::SessionClaims;
pub use error::{AuthError, AuthResult};
pub use pkce::{PkceParams, PkceStore};
pub use redirect::RedirectTarget;
pub use session::{
    AuthSession, BackendError, HttpSessionBackend, SessionBackend, SessionClientConfig,
    SessionValidation, SessionValidator, User,
};
pub use storage::{MemoryStorage, Storage};

#[cfg(feature = "oauth")]
pub use login::{CallbackParams, CodeExchange, LoginConfig, LoginFlow, LoginRequest};
