//! Test doubles for the command runner and the automation driver
//!
//! Shared by unit tests and the integration tests under `tests/`.

use crate::driver::{BrowserHandle, BrowserLauncher, PageHandle, PageInfo, WaitUntil};
use crate::error::DriverError;
use crate::manager::{ManagerSettings, SessionManager};
use crate::state::SessionStore;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use e2e_common::{CommandError, CommandRunner, ExecOptions, LogPaths, ServerInfo};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_COMMAND: &str = "/usr/local/bin/dev-server";

pub fn log_paths(dir: &Path) -> LogPaths {
    LogPaths {
        stdout: dir.join("stdout.log"),
        stderr: dir.join("stderr.log"),
        combined: dir.join("combined.log"),
    }
}

pub fn server_info(port: u16) -> ServerInfo {
    ServerInfo {
        url: format!("http://localhost:{}", port),
        port,
        pid: 4242,
        started_at: Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_else(Utc::now),
        logs: log_paths(Path::new("/tmp/e2e-logs")),
    }
}

pub fn start_json(port: u16, logs: &LogPaths) -> Value {
    json!({
        "status": "ready",
        "url": format!("http://localhost:{}", port),
        "port": port,
        "pid": 4242,
        "startedAt": "2024-01-01T00:00:00Z",
        "logs": logs,
        "message": "Server started"
    })
}

pub fn status_json() -> Value {
    json!({"status": "running", "healthy": true, "uptime": 12.5, "message": "Server is running"})
}

pub fn shutdown_json() -> Value {
    json!({"status": "stopped", "previousPid": 4242, "message": "Server stopped"})
}

pub fn restart_json(port: u16) -> Value {
    json!({
        "status": "restarted",
        "url": format!("http://localhost:{}", port),
        "port": port,
        "pid": 5151,
        "previousPid": 4242,
        "startedAt": "2024-01-01T00:05:00Z",
        "message": "Server restarted"
    })
}

pub fn args(flag: &str) -> Vec<String> {
    vec![flag.to_string()]
}

/// Command runner answering from per-flag queues
///
/// Queued results are consumed first; afterwards each flag falls back to a
/// canned success. Flags marked as hanging wait out the timeout.
pub struct ScriptedRunner {
    logs: LogPaths,
    queued: Mutex<HashMap<String, VecDeque<Result<Value, CommandError>>>>,
    hanging: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn new(logs: LogPaths) -> Self {
        Self {
            logs,
            queued: Mutex::new(HashMap::new()),
            hanging: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, flag: &str, result: Result<Value, CommandError>) {
        self.queued
            .lock()
            .entry(flag.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn hang(&self, flag: &str) {
        self.hanging.lock().insert(flag.to_string());
    }

    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn non_zero_exit(flag: &str, stderr: &str) -> CommandError {
        CommandError::NonZeroExit {
            command: TEST_COMMAND.to_string(),
            args: args(flag),
            exit_code: 1,
            stderr: stderr.to_string(),
        }
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new(log_paths(Path::new("/tmp/e2e-logs")))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(
        &self,
        command: &Path,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<Value, CommandError> {
        self.calls
            .lock()
            .push((command.to_path_buf(), args.to_vec()));
        let flag = args.first().cloned().unwrap_or_default();

        let hanging = self.hanging.lock().contains(&flag);
        if hanging {
            tokio::time::sleep(options.timeout).await;
            return Err(CommandError::Timeout {
                command: command.display().to_string(),
                args: args.to_vec(),
                timeout_ms: options.timeout.as_millis() as u64,
            });
        }

        let queued = self.queued.lock().get_mut(&flag).and_then(VecDeque::pop_front);
        if let Some(result) = queued {
            return result;
        }

        Ok(match flag.as_str() {
            "--start" => start_json(5173, &self.logs),
            "--status" => status_json(),
            "--shutdown" => shutdown_json(),
            "--restart" => restart_json(5174),
            _ => json!({"message": "ok"}),
        })
    }
}

/// In-memory page recording every call
pub struct FakePage {
    closed: AtomicBool,
    url: Mutex<String>,
    calls: Mutex<Vec<String>>,
    fail_with: Mutex<Option<DriverError>>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            closed: AtomicBool::new(false),
            url: Mutex::new("about:blank".to_string()),
            calls: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        }
    }
}

impl FakePage {
    /// Make every subsequent operation fail with `error`
    pub fn fail_with(&self, error: DriverError) {
        *self.fail_with.lock() = Some(error);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        self.calls.lock().push(call);
        match self.fail_with.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn navigate(&self, url: &str, _wait_until: WaitUntil) -> Result<PageInfo, DriverError> {
        self.record(format!("navigate {}", url))?;
        *self.url.lock() = url.to_string();
        Ok(PageInfo {
            url: url.to_string(),
            title: Some("Fake Page".to_string()),
        })
    }

    async fn click(&self, selector: &str, _timeout: Option<Duration>) -> Result<(), DriverError> {
        self.record(format!("click {}", selector))
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.record(format!("fill {} {}", selector, text))
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, DriverError> {
        self.record(format!("screenshot {}", full_page))?;
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        self.record(format!("evaluate {}", script))?;
        Ok(json!({"script": script}))
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.record("content".to_string())?;
        Ok(format!("<html><body>{}</body></html>", self.url.lock()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory browser owning its fake pages
pub struct FakeBrowser {
    connected: AtomicBool,
    closes: AtomicUsize,
    fail_close: AtomicBool,
    pages: Mutex<Vec<Arc<FakePage>>>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
            fail_close: AtomicBool::new(false),
            pages: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBrowser {
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn pages(&self) -> Vec<Arc<FakePage>> {
        self.pages.lock().clone()
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError> {
        if !self.is_connected() {
            return Err(DriverError::Closed);
        }
        let page = Arc::new(FakePage::default());
        self.pages.lock().push(page.clone());
        Ok(page)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        for page in self.pages.lock().drain(..) {
            page.close();
        }
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(DriverError::Other("close failed".to_string()));
        }
        Ok(())
    }
}

/// Launcher handing out `FakeBrowser`s
#[derive(Default)]
pub struct FakeLauncher {
    fail: AtomicBool,
    browsers: Mutex<Vec<Arc<FakeBrowser>>>,
}

impl FakeLauncher {
    pub fn fail_launches(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.browsers.lock().len()
    }

    pub fn browsers(&self) -> Vec<Arc<FakeBrowser>> {
        self.browsers.lock().clone()
    }

    pub fn last_browser(&self) -> Option<Arc<FakeBrowser>> {
        self.browsers.lock().last().cloned()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DriverError::Launch("chromium not found".to_string()));
        }
        let browser = Arc::new(FakeBrowser::default());
        self.browsers.lock().push(browser.clone());
        Ok(browser)
    }
}

/// Settings suited to tests: 5s idle timeout, no file-system command checks
pub fn test_settings() -> ManagerSettings {
    ManagerSettings {
        session_timeout: Duration::from_millis(5000),
        command_timeout: Duration::from_millis(1000),
        verify_command_exists: false,
        ..Default::default()
    }
}

/// Manager wired to a scripted runner and a fake launcher
pub struct TestHarness {
    pub manager: SessionManager,
    pub store: Arc<SessionStore>,
    pub runner: Arc<ScriptedRunner>,
    pub launcher: Arc<FakeLauncher>,
}

impl TestHarness {
    pub fn new(settings: ManagerSettings) -> Self {
        Self::with_runner(settings, ScriptedRunner::default())
    }

    pub fn with_runner(settings: ManagerSettings, runner: ScriptedRunner) -> Self {
        let store = Arc::new(SessionStore::new());
        let runner = Arc::new(runner);
        let launcher = Arc::new(FakeLauncher::default());
        let manager = SessionManager::new(store.clone(), runner.clone(), launcher.clone(), settings);
        Self {
            manager,
            store,
            runner,
            launcher,
        }
    }
}
