//! Running the identity provider.
//!
//! The manager only sees [`IdpRuntime`] and [`IdpInstance`]. [`CommandRuntime`]
//! runs the identity-provider executable as a child process; tests substitute
//! an in-memory runtime.
//!
//! A launched child is owned by a supervisor task for its whole life. The
//! task records how the process ended, so a crash after startup is visible
//! through [`IdpInstance::exit_reason`]. Configuration updates are applied in
//! place: the runtime configuration file is replaced and the same process is
//! sent `SIGHUP` to re-read it.

use crate::error::{IdpError, IdpResult};
use crate::files;
use crate::generator::IdpConfig;
use crate::logs::{LogBuffer, LogLevel};
use crate::settings::IdpSettings;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, info, instrument, warn};

/// File the running identity provider reads its configuration from.
pub const RUNTIME_CONFIG_FILE_NAME: &str = "runtime.json";

/// How long a freshly spawned or reloaded process must survive to count as
/// healthy.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(250);

/// Signal asking the identity provider to re-read its configuration.
pub const RELOAD_SIGNAL: &str = "HUP";

/// Launches identity-provider instances.
#[async_trait]
pub trait IdpRuntime: Send + Sync {
    /// Launch an instance serving `config`.
    ///
    /// Output of the instance is recorded in `logs`.
    async fn launch(&self, config: &IdpConfig, logs: Arc<LogBuffer>)
        -> IdpResult<Arc<dyn IdpInstance>>;
}

/// A running identity provider.
#[async_trait]
pub trait IdpInstance: Send + Sync {
    /// Address the instance listens on.
    fn address(&self) -> String;

    /// Why the instance is no longer running, once it has exited.
    ///
    /// Never blocks.
    fn exit_reason(&self) -> Option<String> {
        None
    }

    /// Switch the live instance to `config` without restarting it.
    async fn apply(&self, config: &IdpConfig) -> IdpResult<()>;

    /// Stop the instance.
    async fn shutdown(&self) -> IdpResult<()>;
}

/// Runs the identity provider as `<binary> serve <config>`.
///
/// The executable must reload its configuration file on `SIGHUP`.
#[derive(Debug, Clone)]
pub struct CommandRuntime {
    binary: PathBuf,
    config_path: PathBuf,
    startup_grace: Duration,
}

impl CommandRuntime {
    /// Create a runtime from settings.
    pub fn new(settings: &IdpSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            config_path: settings.data_dir.join(RUNTIME_CONFIG_FILE_NAME),
            startup_grace: DEFAULT_STARTUP_GRACE,
        }
    }

    /// Override the startup grace period.
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    async fn write_config(&self, config: &IdpConfig) -> IdpResult<()> {
        files::write_private(&self.config_path, &config.to_json()?).await?;
        Ok(())
    }

    async fn spawn(&self, logs: &Arc<LogBuffer>) -> IdpResult<Child> {
        let mut child = Command::new(&self.binary)
            .arg("serve")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                IdpError::Process(format!("Failed to spawn {}: {}", self.binary.display(), e))
            })?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, logs.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, logs.clone());
        }

        tokio::time::sleep(self.startup_grace).await;
        if let Some(status) = child.try_wait()? {
            return Err(IdpError::Process(format!(
                "Identity provider exited during startup ({})",
                status
            )));
        }

        debug!(pid = ?child.id(), "Identity provider process started");
        Ok(child)
    }
}

/// Copy process output into the log buffer until the stream closes.
fn forward_output<R>(stream: R, logs: Arc<LogBuffer>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            logs.push(level_of(&line), line).await;
        }
    });
}

/// Level of a logfmt or JSON process log line.
fn level_of(line: &str) -> LogLevel {
    let lower = line.to_ascii_lowercase();
    if lower.contains("level=error") || lower.contains("\"level\":\"error\"") {
        LogLevel::Error
    } else if lower.contains("level=warn") || lower.contains("\"level\":\"warn") {
        LogLevel::Warn
    } else if lower.contains("level=debug") || lower.contains("\"level\":\"debug\"") {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Own `child` until it exits or a stop is requested, then publish how it
/// ended.
async fn supervise(
    mut child: Child,
    stop: oneshot::Receiver<()>,
    exit: watch::Sender<Option<String>>,
    logs: Arc<LogBuffer>,
) {
    let reason = tokio::select! {
        status = child.wait() => {
            let reason = match status {
                Ok(status) => format!("Identity provider exited unexpectedly ({})", status),
                Err(e) => format!("Lost track of identity provider process: {}", e),
            };
            logs.error(reason.clone()).await;
            reason
        }
        // A dropped sender also lands here, so an abandoned instance is killed.
        _ = stop => {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop identity provider: {}", e);
                logs.warn(format!("Failed to stop identity provider: {}", e)).await;
            }
            "Identity provider stopped".to_string()
        }
    };
    let _ = exit.send(Some(reason));
}

/// Ask process `pid` to reload its configuration.
async fn signal_reload(pid: u32) -> IdpResult<()> {
    let status = Command::new("kill")
        .arg("-s")
        .arg(RELOAD_SIGNAL)
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| IdpError::Process(format!("Failed to signal identity provider: {}", e)))?;

    if !status.success() {
        return Err(IdpError::Process(format!(
            "Failed to signal identity provider ({})",
            status
        )));
    }
    Ok(())
}

#[async_trait]
impl IdpRuntime for CommandRuntime {
    #[instrument(skip(self, config, logs))]
    async fn launch(
        &self,
        config: &IdpConfig,
        logs: Arc<LogBuffer>,
    ) -> IdpResult<Arc<dyn IdpInstance>> {
        self.write_config(config).await?;
        let child = self.spawn(&logs).await?;
        let pid = child.id().ok_or_else(|| {
            IdpError::Process("Identity provider exited during startup".to_string())
        })?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(supervise(child, stop_rx, exit_tx, logs));

        Ok(Arc::new(CommandInstance {
            runtime: self.clone(),
            address: config.listen_addr().to_string(),
            pid,
            stop: Mutex::new(Some(stop_tx)),
            exit: exit_rx,
        }))
    }
}

/// A child process started by [`CommandRuntime`].
struct CommandInstance {
    runtime: CommandRuntime,
    address: String,
    pid: u32,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    exit: watch::Receiver<Option<String>>,
}

impl CommandInstance {
    fn ensure_alive(&self) -> IdpResult<()> {
        match self.exit_reason() {
            Some(reason) => Err(IdpError::Process(reason)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IdpInstance for CommandInstance {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn exit_reason(&self) -> Option<String> {
        self.exit.borrow().clone()
    }

    #[instrument(skip(self, config))]
    async fn apply(&self, config: &IdpConfig) -> IdpResult<()> {
        self.ensure_alive()?;

        // The running process keeps its current configuration until signalled.
        self.runtime.write_config(config).await?;
        signal_reload(self.pid).await?;

        tokio::time::sleep(self.runtime.startup_grace).await;
        self.ensure_alive()?;

        info!(pid = self.pid, "Identity provider reloaded with new configuration");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn shutdown(&self) -> IdpResult<()> {
        if let Some(stop) = self.stop.lock().await.take() {
            let _ = stop.send(());
        }

        let mut exit = self.exit.clone();
        while exit.borrow_and_update().is_none() {
            if exit.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
