//! # Console IdP
//!
//! Embedded federated identity provider for the cluster console.
//!
//! ## Overview
//!
//! The console-idp crate handles:
//! - **Providers**: parsing, validating and serializing upstream identity
//!   providers (GitHub, Google, GitLab, Microsoft, generic OIDC), including
//!   the legacy single-provider keys
//! - **Generation**: turning a provider list into the identity provider's
//!   configuration document
//! - **Lifecycle**: `init`/`start`/`stop`/`update_config` of the identity
//!   provider process, with status and a bounded log
//!
//! ## Usage
//!
//! ```rust,no_run
//! use console_idp::{IdentityProviderManager, IdpSettings};
//! use serde_json::json;
//!
//! # async fn run() -> console_idp::IdpResult<()> {
//! let manager = IdentityProviderManager::new(IdpSettings::from_env());
//!
//! let config = json!({
//!     "providers": [{
//!         "id": "github-main",
//!         "type": "github",
//!         "name": "GitHub",
//!         "client_id": "client",
//!         "client_secret": "secret",
//!         "allowed_org": "acme"
//!     }]
//! });
//! manager.init(config.as_object().expect("object")).await?;
//! manager.start().await?;
//!
//! println!("identity provider at {:?}", manager.endpoint().await);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure handling
//!
//! Invalid provider configuration is always rejected as a whole. A failed
//! launch moves the manager to `Error`, from which `start` may be retried.

pub mod error;
pub mod files;
pub mod generator;
pub mod lifecycle;
pub mod logs;
pub mod manager;
pub mod providers;
pub mod runtime;
pub mod settings;

// Re-export main types
pub use error::{ConfigValidationError, IdpError, IdpResult};
pub use generator::{ConfigGenerator, IdpConfig};
pub use lifecycle::ExtensionLifecycle;
pub use logs::{LogBuffer, LogEntry, LogLevel};
pub use manager::{IdentityProviderManager, ProcessState, Status};
pub use providers::{ConfigMap, ProviderConfig, ProviderKind, ProviderSummary, ProviderType};
pub use runtime::{CommandRuntime, IdpInstance, IdpRuntime};
pub use settings::IdpSettings;
