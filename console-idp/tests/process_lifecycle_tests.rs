//! Lifecycle tests against a real child process.
//!
//! A small shell script stands in for the identity-provider executable: it
//! logs its pid, reports every `SIGHUP` and otherwise idles until killed.
//! The manager is driven through the host-facing `ExtensionLifecycle` trait.

#![cfg(unix)]

use console_idp::{
    CommandRuntime, ExtensionLifecycle, IdentityProviderManager, IdpError, IdpSettings,
    ProcessState,
};
use serde_json::{json, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;

// Writing an executable while another test forks can fail the spawn with
// ETXTBSY, so these tests run one at a time.
static SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Test fixture owning a temporary data directory and a fake executable.
struct TestFixture {
    dir: tempfile::TempDir,
}

impl TestFixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Write an executable shell script and return its path.
    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        let mut permissions = std::fs::metadata(&path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).expect("chmod");
        path
    }

    fn manager(&self, binary: &Path) -> Arc<dyn ExtensionLifecycle> {
        let settings = IdpSettings {
            binary: binary.to_path_buf(),
            listen_addr: "127.0.0.1:15556".to_string(),
            ..IdpSettings::with_data_dir(self.dir.path().join("data"))
        };
        let runtime = CommandRuntime::new(&settings).with_startup_grace(Duration::from_millis(300));
        Arc::new(IdentityProviderManager::with_runtime(settings, Arc::new(runtime)))
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }
}

// Idles in short `wait`s so a trapped signal is handled promptly.
const RELOADING_IDP: &str = r#"echo "level=info msg=boot pid=$$ args=$*"
trap 'echo "level=info msg=reload pid=$$"' HUP
while :; do sleep 1 & wait $!; done"#;

fn providers(ids: &[&str]) -> serde_json::Map<String, Value> {
    let entries: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "type": "github",
                "client_id": format!("{}-client", id),
                "client_secret": format!("{}-secret", id)
            })
        })
        .collect();
    match json!({ "providers": entries }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Messages of log entries containing `needle`.
async fn log_lines(manager: &Arc<dyn ExtensionLifecycle>, needle: &str) -> Vec<String> {
    manager
        .logs(0)
        .await
        .into_iter()
        .filter(|e| e.message.contains(needle))
        .map(|e| e.message)
        .collect()
}

fn pid_of(line: &str) -> Option<&str> {
    line.split_whitespace()
        .find_map(|field| field.strip_prefix("pid="))
}

/// Wait until a log entry contains `needle`.
async fn wait_for_log(manager: &Arc<dyn ExtensionLifecycle>, needle: &str) -> bool {
    for _ in 0..100 {
        if manager.logs(0).await.iter().any(|e| e.message.contains(needle)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_process_start_update_stop() {
    let _serial = SERIAL.lock().await;
    let fixture = TestFixture::new();
    let binary = fixture.script("fake-idp", RELOADING_IDP);
    let manager = fixture.manager(&binary);

    manager.init(&providers(&["github-main"])).await.unwrap();
    manager.start().await.unwrap();

    let status = manager.status().await;
    assert_eq!(status.process_state, ProcessState::Running);
    assert_eq!(manager.endpoint().await.as_deref(), Some("127.0.0.1:15556"));
    assert!(wait_for_log(&manager, "msg=boot").await);
    assert!(log_lines(&manager, "msg=boot").await[0].contains("args=serve"));

    // The running process reads the runtime copy; the inspection copy is
    // written next to it.
    let runtime_config: Value =
        serde_json::from_slice(&std::fs::read(fixture.data_dir().join("runtime.json")).unwrap())
            .unwrap();
    assert_eq!(runtime_config["connectors"][0]["id"], "github-main");
    assert!(status.config_path.exists());

    manager
        .update_config(&providers(&["github-main", "github-enterprise"]))
        .await
        .unwrap();
    assert_eq!(manager.status().await.process_state, ProcessState::Running);
    assert!(wait_for_log(&manager, "msg=reload").await);

    // Same process before and after the update.
    let boots = log_lines(&manager, "msg=boot").await;
    let reloads = log_lines(&manager, "msg=reload").await;
    assert_eq!(boots.len(), 1);
    assert_eq!(reloads.len(), 1);
    assert!(pid_of(&boots[0]).is_some());
    assert_eq!(pid_of(&boots[0]), pid_of(&reloads[0]));

    let runtime_config: Value =
        serde_json::from_slice(&std::fs::read(fixture.data_dir().join("runtime.json")).unwrap())
            .unwrap();
    assert_eq!(runtime_config["connectors"][1]["id"], "github-enterprise");

    manager.stop().await.unwrap();
    assert_eq!(manager.status().await.process_state, ProcessState::Stopped);
    assert_eq!(manager.endpoint().await, None);
}

#[tokio::test]
async fn test_crash_after_startup_is_reported() {
    let _serial = SERIAL.lock().await;
    let fixture = TestFixture::new();
    let binary = fixture.script("crashing-idp", "echo 'level=info msg=boot'\nsleep 0.6\nexit 1");
    let manager = fixture.manager(&binary);

    manager.init(&providers(&["github-main"])).await.unwrap();
    manager.start().await.unwrap();
    assert_eq!(manager.status().await.process_state, ProcessState::Running);

    let mut state = ProcessState::Running;
    for _ in 0..100 {
        state = manager.status().await.process_state;
        if state != ProcessState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(matches!(state, ProcessState::Error(_)));
    assert_eq!(manager.endpoint().await, None);
    assert!(manager.status().await.last_error.is_some());
    assert!(wait_for_log(&manager, "exited unexpectedly").await);

    // Stopping a crashed process is a no-op.
    manager.stop().await.unwrap();
    assert!(matches!(
        manager.status().await.process_state,
        ProcessState::Error(_)
    ));
}

#[tokio::test]
async fn test_unix_permissions_on_generated_files() {
    let _serial = SERIAL.lock().await;
    let fixture = TestFixture::new();
    let binary = fixture.script("fake-idp", RELOADING_IDP);
    let manager = fixture.manager(&binary);

    manager.init(&providers(&["github-main"])).await.unwrap();
    manager.start().await.unwrap();

    let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
    let data_dir = fixture.data_dir();
    assert_eq!(mode(data_dir.as_path()), 0o700);
    assert_eq!(mode(data_dir.join("runtime.json").as_path()), 0o600);
    assert_eq!(mode(data_dir.join("config.json").as_path()), 0o600);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_process_exiting_during_startup() {
    let _serial = SERIAL.lock().await;
    let fixture = TestFixture::new();
    let binary = fixture.script("broken-idp", "echo 'level=error msg=\"bad config\"' >&2\nexit 3");
    let manager = fixture.manager(&binary);

    manager.init(&providers(&["github-main"])).await.unwrap();
    let result = manager.start().await;
    assert!(matches!(result, Err(IdpError::Process(_))));

    let status = manager.status().await;
    assert!(matches!(status.process_state, ProcessState::Error(_)));
    assert!(status.last_error.is_some());
    assert!(wait_for_log(&manager, "bad config").await);

    // Stopping a failed process is a no-op.
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_executable() {
    let _serial = SERIAL.lock().await;
    let fixture = TestFixture::new();
    let manager = fixture.manager(&fixture.data_dir().join("does-not-exist"));

    manager.init(&providers(&[])).await.unwrap();
    assert!(matches!(manager.start().await, Err(IdpError::Process(_))));
    assert!(matches!(
        manager.status().await.process_state,
        ProcessState::Error(_)
    ));
}
