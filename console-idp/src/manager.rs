//! Lifecycle of the embedded identity provider.
//!
//! ```text
//!            init                start               stop
//!   (none) ───────► NotStarted ────────► Starting ──► Running ──► Stopping ──► Stopped
//!                                           │                                   │
//!                                           ▼               start               │
//!                                         Error ◄──────────────────────────────┘
//! ```
//!
//! `start` is accepted from `NotStarted`, `Stopped` and `Error`. A process
//! that dies while `Running` is reported as `Error` by the next read of the
//! state. Provider
//! configuration, the process slot and the log buffer each have their own
//! lock; a separate mutex serializes transitions. The process slot is never
//! locked across process I/O, so `status` and `logs` answer while a launch or
//! shutdown is in progress.

use crate::error::{IdpError, IdpResult};
use crate::files;
use crate::generator::ConfigGenerator;
use crate::logs::{LogBuffer, LogEntry};
use crate::providers::{self, ConfigMap, ProviderConfig, ProviderSummary, ProviderType};
use crate::runtime::{CommandRuntime, IdpInstance, IdpRuntime};
use crate::settings::IdpSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

/// State of the identity-provider process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error(String),
}

impl ProcessState {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::NotStarted => "not_started",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
            ProcessState::Error(_) => "error",
        }
    }

    /// Check if `start` is allowed from this state.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            ProcessState::NotStarted | ProcessState::Stopped | ProcessState::Error(_)
        )
    }

    /// Check if a transition is in progress or the process is up.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Error(reason) => write!(f, "error: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Data directory
    pub data_dir: PathBuf,

    /// Location of the generated configuration copy
    pub config_path: PathBuf,

    /// Process state
    pub process_state: ProcessState,

    /// Listen address while running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Most recent lifecycle failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Number of configured providers
    pub provider_count: usize,

    /// Distinct provider types, in configuration order
    pub provider_types: Vec<ProviderType>,
}

struct ProcessSlot {
    state: ProcessState,
    address: Option<String>,
    last_error: Option<String>,
    instance: Option<Arc<dyn IdpInstance>>,
}

impl ProcessSlot {
    fn fail(&mut self, reason: String) {
        self.state = ProcessState::Error(reason.clone());
        self.last_error = Some(reason);
        self.address = None;
        self.instance = None;
    }
}

impl Default for ProcessSlot {
    fn default() -> Self {
        Self {
            state: ProcessState::NotStarted,
            address: None,
            last_error: None,
            instance: None,
        }
    }
}

/// Owns the embedded identity provider.
pub struct IdentityProviderManager {
    settings: IdpSettings,
    generator: ConfigGenerator,
    runtime: Arc<dyn IdpRuntime>,
    /// `None` until `init` succeeds
    providers: RwLock<Option<Vec<ProviderConfig>>>,
    process: RwLock<ProcessSlot>,
    logs: Arc<LogBuffer>,
    transition: Mutex<()>,
}

impl std::fmt::Debug for IdentityProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProviderManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl IdentityProviderManager {
    /// Create a manager that runs the identity-provider executable.
    pub fn new(settings: IdpSettings) -> Self {
        let runtime = Arc::new(CommandRuntime::new(&settings));
        Self::with_runtime(settings, runtime)
    }

    /// Create a manager from environment settings.
    pub fn from_env() -> Self {
        Self::new(IdpSettings::from_env())
    }

    /// Create a manager with a custom runtime.
    pub fn with_runtime(settings: IdpSettings, runtime: Arc<dyn IdpRuntime>) -> Self {
        Self {
            generator: ConfigGenerator::new(settings.clone()),
            logs: Arc::new(LogBuffer::new(settings.log_capacity)),
            settings,
            runtime,
            providers: RwLock::new(None),
            process: RwLock::new(ProcessSlot::default()),
            transition: Mutex::new(()),
        }
    }

    /// Deployment settings.
    pub fn settings(&self) -> &IdpSettings {
        &self.settings
    }

    /// Move a running slot whose process has exited to `Error`.
    async fn reap(&self) {
        let exited = {
            let slot = self.process.read().await;
            slot.state == ProcessState::Running
                && slot
                    .instance
                    .as_ref()
                    .is_some_and(|instance| instance.exit_reason().is_some())
        };
        if !exited {
            return;
        }

        let mut slot = self.process.write().await;
        if slot.state != ProcessState::Running {
            return;
        }
        if let Some(reason) = slot.instance.as_ref().and_then(|i| i.exit_reason()) {
            debug!(%reason, "Identity provider is no longer running");
            slot.fail(reason);
        }
    }

    /// Load and validate provider configuration.
    ///
    /// A rejected configuration leaves the manager uninitialized, so a later
    /// `start` is refused. Zero providers is accepted.
    #[instrument(skip(self, config))]
    pub async fn init(&self, config: &ConfigMap) -> IdpResult<()> {
        let _transition = self.transition.lock().await;

        let state = self.process.read().await.state.clone();
        if state.is_active() {
            return Err(IdpError::InvalidTransition {
                operation: "init",
                state: state.to_string(),
            });
        }

        let providers = match providers::parse(config) {
            Ok(providers) => providers,
            Err(e) => {
                *self.providers.write().await = None;
                self.logs
                    .error(format!("Rejected provider configuration: {}", e))
                    .await;
                return Err(e.into());
            }
        };

        if let Err(e) = files::create_private_dir(&self.settings.data_dir).await {
            self.logs
                .error(format!(
                    "Cannot create data directory {}: {}",
                    self.settings.data_dir.display(),
                    e
                ))
                .await;
            return Err(e.into());
        }

        let count = providers.len();
        *self.providers.write().await = Some(providers);
        *self.process.write().await = ProcessSlot::default();

        self.logs
            .info(format!("Initialized with {} identity provider(s)", count))
            .await;
        if count == 0 {
            self.logs
                .warn("No identity providers configured; SSO login is unavailable")
                .await;
        }
        Ok(())
    }

    /// Generate configuration and launch the identity provider.
    #[instrument(skip(self))]
    pub async fn start(&self) -> IdpResult<()> {
        let _transition = self.transition.lock().await;
        self.reap().await;

        let providers = self
            .providers
            .read()
            .await
            .clone()
            .ok_or(IdpError::NotInitialized)?;

        {
            let mut slot = self.process.write().await;
            if !slot.state.can_start() {
                return Err(IdpError::InvalidTransition {
                    operation: "start",
                    state: slot.state.to_string(),
                });
            }
            slot.state = ProcessState::Starting;
        }

        self.logs
            .info(format!(
                "Starting identity provider with {} provider(s)",
                providers.len()
            ))
            .await;

        let config = self.generator.generate(&providers);
        if self.generator.write_config(&config).await.is_none() {
            self.logs
                .warn(format!(
                    "Could not write configuration copy to {}",
                    self.generator.config_path().display()
                ))
                .await;
        }

        match self.runtime.launch(&config, self.logs.clone()).await {
            Ok(instance) => {
                let address = instance.address();
                {
                    let mut slot = self.process.write().await;
                    slot.state = ProcessState::Running;
                    slot.address = Some(address.clone());
                    slot.last_error = None;
                    slot.instance = Some(instance);
                }
                self.logs
                    .info(format!("Identity provider running at {}", address))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.process.write().await.fail(e.to_string());
                self.logs
                    .error(format!("Identity provider failed to start: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    /// Stop the identity provider. Stopping a process that is not running is
    /// a no-op.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> IdpResult<()> {
        let _transition = self.transition.lock().await;

        let instance = {
            let mut slot = self.process.write().await;
            if slot.state != ProcessState::Running {
                debug!(state = %slot.state, "Stop requested while not running");
                return Ok(());
            }
            slot.state = ProcessState::Stopping;
            slot.instance.take()
        };

        self.logs.info("Stopping identity provider").await;

        let result = match instance {
            Some(instance) => instance.shutdown().await,
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                {
                    let mut slot = self.process.write().await;
                    slot.state = ProcessState::Stopped;
                    slot.address = None;
                }
                self.logs.info("Identity provider stopped").await;
                Ok(())
            }
            Err(e) => {
                self.process.write().await.fail(e.to_string());
                self.logs
                    .error(format!("Identity provider failed to stop: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    /// Replace the provider configuration.
    ///
    /// An invalid configuration is rejected without touching anything. A
    /// valid one is stored and, while running, applied to the live process
    /// without leaving the `Running` state. A failed apply only leaves
    /// `Running` when the process is gone.
    #[instrument(skip(self, config))]
    pub async fn update_config(&self, config: &ConfigMap) -> IdpResult<()> {
        let _transition = self.transition.lock().await;

        if self.providers.read().await.is_none() {
            return Err(IdpError::NotInitialized);
        }

        let providers = match providers::parse(config) {
            Ok(providers) => providers,
            Err(e) => {
                self.logs
                    .warn(format!("Rejected configuration update: {}", e))
                    .await;
                return Err(e.into());
            }
        };

        let count = providers.len();
        let generated = self.generator.generate(&providers);
        *self.providers.write().await = Some(providers);
        if self.generator.write_config(&generated).await.is_none() {
            self.logs
                .warn(format!(
                    "Could not write configuration copy to {}",
                    self.generator.config_path().display()
                ))
                .await;
        }

        self.reap().await;
        let live = {
            let slot = self.process.read().await;
            match slot.state {
                ProcessState::Running => slot.instance.clone(),
                _ => None,
            }
        };

        if let Some(instance) = live {
            if let Err(e) = instance.apply(&generated).await {
                self.logs
                    .error(format!("Failed to apply configuration update: {}", e))
                    .await;
                self.reap().await;
                return Err(e);
            }
            self.logs
                .info(format!(
                    "Configuration updated: {} provider(s), applied to running instance",
                    count
                ))
                .await;
        } else {
            self.logs
                .info(format!("Configuration updated: {} provider(s)", count))
                .await;
        }
        Ok(())
    }

    /// Current status.
    pub async fn status(&self) -> Status {
        self.reap().await;

        let (provider_count, provider_types) = match &*self.providers.read().await {
            Some(providers) => {
                let mut types: Vec<ProviderType> = Vec::new();
                for provider_type in providers.iter().map(ProviderConfig::provider_type) {
                    if !types.contains(&provider_type) {
                        types.push(provider_type);
                    }
                }
                (providers.len(), types)
            }
            None => (0, Vec::new()),
        };

        let slot = self.process.read().await;
        Status {
            data_dir: self.settings.data_dir.clone(),
            config_path: self.generator.config_path(),
            process_state: slot.state.clone(),
            address: slot.address.clone(),
            last_error: slot.last_error.clone(),
            provider_count,
            provider_types,
        }
    }

    /// The most recent `n` log entries; all of them when `n` is not positive.
    pub async fn logs(&self, n: i64) -> Vec<LogEntry> {
        self.logs.recent(n).await
    }

    /// Configured providers without their secrets.
    pub async fn providers(&self) -> Vec<ProviderSummary> {
        self.providers
            .read()
            .await
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(ProviderConfig::summary)
            .collect()
    }

    /// Listen address while running.
    pub async fn endpoint(&self) -> Option<String> {
        self.reap().await;
        let slot = self.process.read().await;
        match slot.state {
            ProcessState::Running => slot.address.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigValidationError;
    use crate::generator::IdpConfig;
    use crate::logs::LogLevel;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Shared {
        fail_launch: AtomicBool,
        fail_apply: AtomicBool,
        launches: AtomicUsize,
        shutdowns: AtomicUsize,
        live: StdMutex<Option<IdpConfig>>,
        exited: StdMutex<Option<String>>,
        gate: Option<Arc<Notify>>,
    }

    impl Shared {
        fn crash(&self, reason: &str) {
            *self.exited.lock().unwrap() = Some(reason.to_string());
        }

        fn live_connectors(&self) -> Vec<String> {
            self.live
                .lock()
                .unwrap()
                .as_ref()
                .map(|c| c.connectors.iter().map(|c| c.id.clone()).collect())
                .unwrap_or_default()
        }
    }

    struct FakeRuntime(Arc<Shared>);

    struct FakeInstance {
        shared: Arc<Shared>,
        address: String,
    }

    #[async_trait]
    impl IdpRuntime for FakeRuntime {
        async fn launch(
            &self,
            config: &IdpConfig,
            _logs: Arc<LogBuffer>,
        ) -> IdpResult<Arc<dyn IdpInstance>> {
            if let Some(gate) = &self.0.gate {
                gate.notified().await;
            }
            self.0.launches.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_launch.load(Ordering::SeqCst) {
                return Err(IdpError::Process("exited with status 1".into()));
            }
            *self.0.exited.lock().unwrap() = None;
            *self.0.live.lock().unwrap() = Some(config.clone());
            Ok(Arc::new(FakeInstance {
                shared: self.0.clone(),
                address: config.listen_addr().to_string(),
            }))
        }
    }

    #[async_trait]
    impl IdpInstance for FakeInstance {
        fn address(&self) -> String {
            self.address.clone()
        }

        fn exit_reason(&self) -> Option<String> {
            self.shared.exited.lock().unwrap().clone()
        }

        async fn apply(&self, config: &IdpConfig) -> IdpResult<()> {
            if self.shared.fail_apply.load(Ordering::SeqCst) {
                return Err(IdpError::Process("reload failed".into()));
            }
            *self.shared.live.lock().unwrap() = Some(config.clone());
            Ok(())
        }

        async fn shutdown(&self) -> IdpResult<()> {
            self.shared.shutdowns.fetch_add(1, Ordering::SeqCst);
            *self.shared.live.lock().unwrap() = None;
            Ok(())
        }
    }

    struct Harness {
        manager: IdentityProviderManager,
        shared: Arc<Shared>,
        _dir: tempfile::TempDir,
    }

    fn harness_with(shared: Shared) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let shared = Arc::new(shared);
        let settings = IdpSettings {
            log_capacity: 50,
            ..IdpSettings::with_data_dir(dir.path().join("idp"))
        };
        Harness {
            manager: IdentityProviderManager::with_runtime(
                settings,
                Arc::new(FakeRuntime(shared.clone())),
            ),
            shared,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(Shared::default())
    }

    fn provider(id: &str, provider_type: &str) -> Value {
        json!({
            "id": id,
            "type": provider_type,
            "name": format!("Login with {}", id),
            "client_id": format!("{}-client", id),
            "client_secret": format!("{}-secret", id),
        })
    }

    fn config(providers: Vec<Value>) -> ConfigMap {
        match json!({ "providers": providers }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_ids_refuse_start() {
        let h = harness();
        let raw = config(vec![provider("github-main", "github"), provider("github-main", "github")]);

        let result = h.manager.init(&raw).await;
        assert!(matches!(
            result,
            Err(IdpError::ConfigInvalid(ConfigValidationError::DuplicateProviderId(ref id))) if id == "github-main"
        ));

        assert!(matches!(h.manager.start().await, Err(IdpError::NotInitialized)));
        assert_eq!(h.shared.launches.load(Ordering::SeqCst), 0);
        assert_eq!(h.manager.status().await.process_state, ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_start_and_status() {
        let h = harness();
        h.manager
            .init(&config(vec![provider("github-main", "github"), provider("google", "google")]))
            .await
            .unwrap();

        assert_eq!(h.manager.endpoint().await, None);
        h.manager.start().await.unwrap();

        let status = h.manager.status().await;
        assert_eq!(status.process_state, ProcessState::Running);
        assert_eq!(status.address.as_deref(), Some("127.0.0.1:5556"));
        assert_eq!(status.provider_count, 2);
        assert_eq!(status.provider_types, vec![ProviderType::Github, ProviderType::Google]);
        assert!(status.last_error.is_none());
        assert!(status.config_path.exists());

        assert_eq!(h.manager.endpoint().await.as_deref(), Some("127.0.0.1:5556"));
        assert_eq!(h.shared.live_connectors(), vec!["github-main", "google"]);
    }

    #[tokio::test]
    async fn test_start_before_init() {
        let h = harness();
        assert!(matches!(h.manager.start().await, Err(IdpError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_zero_providers() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.manager.start().await.unwrap();

        assert_eq!(h.manager.status().await.provider_count, 0);
        assert!(h.manager.providers().await.is_empty());
        assert!(h.shared.live_connectors().is_empty());
    }

    #[tokio::test]
    async fn test_start_while_running() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.manager.start().await.unwrap();

        assert!(matches!(
            h.manager.start().await,
            Err(IdpError::InvalidTransition { operation: "start", .. })
        ));
        assert!(matches!(
            h.manager.init(&ConfigMap::new()).await,
            Err(IdpError::InvalidTransition { operation: "init", .. })
        ));
        assert_eq!(h.shared.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_update_while_running() {
        let h = harness();
        h.manager
            .init(&config(vec![provider("github-main", "github")]))
            .await
            .unwrap();
        h.manager.start().await.unwrap();

        let invalid = config(vec![json!({
            "id": "okta",
            "type": "oidc",
            "client_id": "c",
            "client_secret": "s"
        })]);
        let result = h.manager.update_config(&invalid).await;
        assert!(matches!(
            result,
            Err(IdpError::ConfigInvalid(ConfigValidationError::MissingIssuerUrl(_)))
        ));

        assert_eq!(h.manager.status().await.process_state, ProcessState::Running);
        assert_eq!(h.shared.live_connectors(), vec!["github-main"]);
        let ids: Vec<String> = h.manager.providers().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["github-main"]);
    }

    #[tokio::test]
    async fn test_hot_update_while_running() {
        let h = harness();
        h.manager
            .init(&config(vec![provider("github-main", "github")]))
            .await
            .unwrap();
        h.manager.start().await.unwrap();

        h.manager
            .update_config(&config(vec![provider("github-main", "github"), provider("gitlab", "gitlab")]))
            .await
            .unwrap();

        assert_eq!(h.manager.status().await.process_state, ProcessState::Running);
        assert_eq!(h.shared.live_connectors(), vec!["github-main", "gitlab"]);
        assert_eq!(h.shared.launches.load(Ordering::SeqCst), 1);

        let last = h.manager.logs(1).await;
        assert!(last[0].message.contains("2 provider(s)"));
    }

    #[tokio::test]
    async fn test_update_while_stopped_applies_on_start() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.manager
            .update_config(&config(vec![provider("google", "google")]))
            .await
            .unwrap();

        assert!(h.shared.live_connectors().is_empty());
        h.manager.start().await.unwrap();
        assert_eq!(h.shared.live_connectors(), vec!["google"]);
    }

    #[tokio::test]
    async fn test_update_before_init() {
        let h = harness();
        assert!(matches!(
            h.manager.update_config(&ConfigMap::new()).await,
            Err(IdpError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_live_process() {
        let h = harness();
        h.manager
            .init(&config(vec![provider("github-main", "github")]))
            .await
            .unwrap();
        h.manager.start().await.unwrap();
        h.shared.fail_apply.store(true, Ordering::SeqCst);

        let result = h.manager.update_config(&config(vec![provider("google", "google")])).await;
        assert!(matches!(result, Err(IdpError::Process(_))));

        assert_eq!(h.manager.status().await.process_state, ProcessState::Running);
        assert_eq!(h.manager.endpoint().await.as_deref(), Some("127.0.0.1:5556"));
        assert_eq!(h.shared.live_connectors(), vec!["github-main"]);
        assert_eq!(h.shared.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_apply_moves_to_error() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.manager.start().await.unwrap();
        h.shared.fail_apply.store(true, Ordering::SeqCst);
        h.shared.crash("exited during reload");

        let result = h.manager.update_config(&config(vec![provider("google", "google")])).await;
        assert!(matches!(result, Err(IdpError::Process(_))));

        let status = h.manager.status().await;
        assert!(matches!(status.process_state, ProcessState::Error(_)));
        assert_eq!(status.provider_count, 1);
        assert_eq!(h.manager.endpoint().await, None);
    }

    #[tokio::test]
    async fn test_exited_process_reports_error() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.manager.start().await.unwrap();

        h.shared.crash("Identity provider exited unexpectedly (exit status: 1)");

        let status = h.manager.status().await;
        assert_eq!(
            status.process_state,
            ProcessState::Error("Identity provider exited unexpectedly (exit status: 1)".into())
        );
        assert!(status.address.is_none());
        assert!(status.last_error.is_some());
        assert_eq!(h.manager.endpoint().await, None);

        // Stopping a dead process is a no-op; starting again launches a new one.
        h.manager.stop().await.unwrap();
        h.manager.start().await.unwrap();
        assert_eq!(h.manager.status().await.process_state, ProcessState::Running);
        assert_eq!(h.shared.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_crash_is_noticed_by_start_and_update() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.manager.start().await.unwrap();
        h.shared.crash("killed");

        // No status read in between: `start` itself notices the dead process.
        h.manager.start().await.unwrap();
        assert_eq!(h.shared.launches.load(Ordering::SeqCst), 2);

        h.shared.crash("killed again");
        h.manager
            .update_config(&config(vec![provider("google", "google")]))
            .await
            .unwrap();
        assert!(matches!(
            h.manager.status().await.process_state,
            ProcessState::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_update_logs_failed_config_write() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();

        // A directory in place of the configuration copy makes the write fail.
        std::fs::create_dir_all(h.manager.status().await.config_path).unwrap();

        h.manager
            .update_config(&config(vec![provider("google", "google")]))
            .await
            .unwrap();

        let logs = h.manager.logs(0).await;
        assert!(logs
            .iter()
            .any(|e| e.level == LogLevel::Warn && e.message.contains("Could not write configuration copy")));
        assert_eq!(h.manager.status().await.provider_count, 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();

        h.manager.stop().await.unwrap();
        assert_eq!(h.manager.status().await.process_state, ProcessState::NotStarted);

        h.manager.start().await.unwrap();
        h.manager.stop().await.unwrap();
        h.manager.stop().await.unwrap();

        let status = h.manager.status().await;
        assert_eq!(status.process_state, ProcessState::Stopped);
        assert!(status.address.is_none());
        assert_eq!(h.shared.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(h.manager.endpoint().await, None);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.manager.start().await.unwrap();
        h.manager.stop().await.unwrap();
        h.manager.start().await.unwrap();

        assert_eq!(h.manager.status().await.process_state, ProcessState::Running);
        assert_eq!(h.shared.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_start_failure_then_retry() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.shared.fail_launch.store(true, Ordering::SeqCst);

        assert!(matches!(h.manager.start().await, Err(IdpError::Process(_))));
        let status = h.manager.status().await;
        assert_eq!(
            status.process_state,
            ProcessState::Error("Identity provider process error: exited with status 1".into())
        );
        assert!(status.last_error.is_some());
        assert!(status.address.is_none());

        h.shared.fail_launch.store(false, Ordering::SeqCst);
        h.manager.start().await.unwrap();

        let status = h.manager.status().await;
        assert_eq!(status.process_state, ProcessState::Running);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_rejected_reinit_uninitializes() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();

        let bad = config(vec![json!({ "id": "x", "type": "ldap", "client_id": "c", "client_secret": "s" })]);
        assert!(h.manager.init(&bad).await.is_err());
        assert!(matches!(h.manager.start().await, Err(IdpError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_status_during_launch() {
        let gate = Arc::new(Notify::new());
        let h = harness_with(Shared {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        h.manager.init(&ConfigMap::new()).await.unwrap();

        let manager = Arc::new(h.manager);
        let starting = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.start().await })
        };

        while manager.status().await.process_state != ProcessState::Starting {
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.endpoint().await, None);
        assert!(!manager.logs(0).await.is_empty());

        gate.notify_one();
        starting.await.unwrap().unwrap();
        assert_eq!(manager.status().await.process_state, ProcessState::Running);
    }

    #[tokio::test]
    async fn test_logs() {
        let h = harness();
        h.manager.init(&ConfigMap::new()).await.unwrap();
        h.manager.start().await.unwrap();
        h.manager.stop().await.unwrap();

        let all = h.manager.logs(0).await;
        assert!(all.len() >= 4);
        assert_eq!(h.manager.logs(-5).await.len(), all.len());
        assert_eq!(h.manager.logs(1).await[0].message, "Identity provider stopped");
    }

    #[tokio::test]
    async fn test_legacy_init() {
        let h = harness();
        let raw = match json!({
            "connector_type": "github",
            "provider_client_id": "gh-client",
            "provider_client_secret": "gh-secret",
            "allowed_org": "acme"
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        h.manager.init(&raw).await.unwrap();

        let providers = h.manager.providers().await;
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].id, "github");
        assert_eq!(providers[0].display_name, "Login with Github");
    }

    #[test]
    fn test_process_state_serialization() {
        assert_eq!(
            serde_json::to_value(ProcessState::Running).unwrap(),
            json!({ "state": "running" })
        );
        assert_eq!(
            serde_json::to_value(ProcessState::Error("boom".into())).unwrap(),
            json!({ "state": "error", "reason": "boom" })
        );
    }
}
