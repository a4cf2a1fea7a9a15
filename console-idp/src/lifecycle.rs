//! Host-facing lifecycle interface.
//!
//! The host drives extensions through [`ExtensionLifecycle`] without knowing
//! what they manage. [`IdentityProviderManager`] is the implementation for
//! the embedded identity provider.

use crate::error::IdpResult;
use crate::logs::LogEntry;
use crate::manager::{IdentityProviderManager, Status};
use crate::providers::{ConfigMap, ProviderSummary};
use async_trait::async_trait;

/// Lifecycle operations a host can invoke on a long-lived extension.
#[async_trait]
pub trait ExtensionLifecycle: Send + Sync {
    /// Load and validate configuration.
    async fn init(&self, config: &ConfigMap) -> IdpResult<()>;

    /// Start serving.
    async fn start(&self) -> IdpResult<()>;

    /// Stop serving; a no-op when not running.
    async fn stop(&self) -> IdpResult<()>;

    /// Replace configuration, applying it live when running.
    async fn update_config(&self, config: &ConfigMap) -> IdpResult<()>;

    /// Current status.
    async fn status(&self) -> Status;

    /// The most recent `n` log entries; all of them when `n` is not positive.
    async fn logs(&self, n: i64) -> Vec<LogEntry>;

    /// Configured providers without secrets.
    async fn providers(&self) -> Vec<ProviderSummary>;

    /// Live address, if running.
    async fn endpoint(&self) -> Option<String>;
}

#[async_trait]
impl ExtensionLifecycle for IdentityProviderManager {
    async fn init(&self, config: &ConfigMap) -> IdpResult<()> {
        IdentityProviderManager::init(self, config).await
    }

    async fn start(&self) -> IdpResult<()> {
        IdentityProviderManager::start(self).await
    }

    async fn stop(&self) -> IdpResult<()> {
        IdentityProviderManager::stop(self).await
    }

    async fn update_config(&self, config: &ConfigMap) -> IdpResult<()> {
        IdentityProviderManager::update_config(self, config).await
    }

    async fn status(&self) -> Status {
        IdentityProviderManager::status(self).await
    }

    async fn logs(&self, n: i64) -> Vec<LogEntry> {
        IdentityProviderManager::logs(self, n).await
    }

    async fn providers(&self) -> Vec<ProviderSummary> {
        IdentityProviderManager::providers(self).await
    }

    async fn endpoint(&self) -> Option<String> {
        IdentityProviderManager::endpoint(self).await
    }
}
