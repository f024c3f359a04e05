//! Session manager
//!
//! Ties the command runner, the session registry and the browser launcher
//! together and owns idle-timeout scheduling.
//!
//! Per session: `starting -> active -> stopping -> terminated`, with the idle
//! timer able to move an active session straight to `terminated`. Whichever
//! path removes the registry record also releases the browser, so a
//! `session_not_found` seen during teardown means another path already did it.

use crate::config::DaemonConfig;
use crate::driver::{BrowserHandle, BrowserLauncher, PageHandle, PageInfo, WaitUntil};
use crate::error::{Result, SessionError};
use crate::state::{SessionRecord, SessionStore, SessionSummary, SessionUpdate};
use e2e_common::{
    CommandError, CommandPathValidator, CommandRunner, ExecOptions, LogExcerpt, LogReadOptions,
    LogReader, LogType, ServerInfo, ServerRestartResponse, ServerShutdownResponse,
    ServerStartResponse, ServerStatusResponse, UrlValidator, ValidationOptions,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Manager tunables, usually derived from `DaemonConfig`
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub session_timeout: Duration,
    pub command_timeout: Duration,
    pub verify_command_exists: bool,
    pub server_command_path: Option<PathBuf>,
    pub log_root: Option<PathBuf>,
    pub allowed_hosts: Vec<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_millis(e2e_common::DEFAULT_SESSION_TIMEOUT_MS),
            command_timeout: Duration::from_millis(e2e_common::DEFAULT_COMMAND_TIMEOUT_MS),
            verify_command_exists: true,
            server_command_path: None,
            log_root: None,
            allowed_hosts: Vec::new(),
        }
    }
}

impl From<&DaemonConfig> for ManagerSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            session_timeout: config.session_timeout(),
            command_timeout: config.command_timeout(),
            verify_command_exists: config.session.verify_command_exists,
            server_command_path: config.session.server_command_path.clone(),
            log_root: config.session.log_root.clone(),
            allowed_hosts: config.security.allowed_hosts.clone(),
        }
    }
}

/// Result of a successful `start_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: String,
    pub server: ServerStartResponse,
}

struct TimerEntry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<SessionStore>,
    runner: Arc<dyn CommandRunner>,
    launcher: Arc<dyn BrowserLauncher>,
    settings: Arc<ManagerSettings>,
    command_validator: CommandPathValidator,
    url_validator: UrlValidator,
    log_reader: LogReader,
    timers: Arc<Mutex<HashMap<String, TimerEntry>>>,
    generation: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new(
        store: Arc<SessionStore>,
        runner: Arc<dyn CommandRunner>,
        launcher: Arc<dyn BrowserLauncher>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            command_validator: CommandPathValidator::new(settings.server_command_path.clone()),
            url_validator: UrlValidator::new(&settings.allowed_hosts),
            log_reader: LogReader::new(settings.log_root.clone()),
            store,
            runner,
            launcher,
            settings: Arc::new(settings),
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    // ========================================================================
    // Server lifecycle
    // ========================================================================

    /// Start the dev server, register the session and launch its browser
    pub async fn start_session(&self, command_path: &str, args: &[String]) -> Result<StartedSession> {
        let command = self.validate_command(command_path)?;
        let value = self.runner.execute(&command, args, &self.exec_options()).await?;
        let server: ServerStartResponse = parse_response(&command, args, value)?;

        let record = self.store.create(ServerInfo::from(server.clone()));
        let session_id = record.session_id;

        let browser = match self.launcher.launch().await {
            Ok(browser) => browser,
            Err(e) => {
                error!("Browser launch failed for session {}: {}", session_id, e);
                if let Err(del) = self.store.delete(&session_id) {
                    debug!("Session {} already removed: {}", session_id, del);
                }
                return Err(SessionError::BrowserLaunch { session_id, source: e });
            }
        };

        if let Err(e) = self.store.update(&session_id, SessionUpdate::browser(browser.clone())) {
            // Removed by a concurrent cleanup while the browser was launching.
            release_browser(&session_id, Some(browser)).await;
            return Err(e);
        }

        self.arm_timer(&session_id);
        info!(
            "Session {} started ({} on port {}, pid {})",
            session_id, server.url, server.port, server.pid
        );

        Ok(StartedSession { session_id, server })
    }

    /// Run the shutdown command, then tear the session down.
    ///
    /// A failed shutdown command leaves the record in place with no idle timer.
    pub async fn stop_session(
        &self,
        session_id: &str,
        command_path: &str,
        args: &[String],
    ) -> Result<ServerShutdownResponse> {
        self.store.get(session_id)?;
        let command = self.validate_command(command_path)?;
        self.cancel_timer(session_id);

        let value = self.runner.execute(&command, args, &self.exec_options()).await?;
        let response: ServerShutdownResponse = parse_response(&command, args, value)?;

        match self.store.delete(session_id) {
            Ok(record) => {
                release_browser(session_id, record.browser).await;
                info!("Session {} stopped", session_id);
            }
            Err(e) if e.is_not_found() => {
                debug!("Session {} was torn down during shutdown", session_id);
            }
            Err(e) => return Err(e),
        }

        Ok(response)
    }

    /// Run the status command; success counts as activity
    pub async fn get_session_status(
        &self,
        session_id: &str,
        command_path: &str,
        args: &[String],
    ) -> Result<ServerStatusResponse> {
        self.store.get(session_id)?;
        let command = self.validate_command(command_path)?;

        let value = self.runner.execute(&command, args, &self.exec_options()).await?;
        let response: ServerStatusResponse = parse_response(&command, args, value)?;

        self.touch(session_id);
        Ok(response)
    }

    /// Run the restart command and record the new server endpoint
    pub async fn restart_session(
        &self,
        session_id: &str,
        command_path: &str,
        args: &[String],
    ) -> Result<ServerRestartResponse> {
        let record = self.store.get(session_id)?;
        let command = self.validate_command(command_path)?;

        let value = self.runner.execute(&command, args, &self.exec_options()).await?;
        let response: ServerRestartResponse = parse_response(&command, args, value)?;

        let server_info = ServerInfo {
            url: response.url.clone(),
            port: response.port,
            pid: response.pid,
            started_at: response.started_at,
            logs: record.server_info.logs,
        };
        let update = SessionUpdate {
            server_info: Some(server_info),
            ..Default::default()
        };
        match self.store.update(session_id, update) {
            Ok(_) => self.arm_timer(session_id),
            Err(e) if e.is_not_found() => {
                debug!("Session {} expired during restart", session_id);
            }
            Err(e) => return Err(e),
        }

        info!("Session {} restarted (pid {})", session_id, response.pid);
        Ok(response)
    }

    // ========================================================================
    // Activity and logs
    // ========================================================================

    /// Reset the idle timer
    pub fn update_session_activity(&self, session_id: &str) -> Result<()> {
        self.store.update(session_id, SessionUpdate::touch())?;
        self.arm_timer(session_id);
        debug!("Session {} touched", session_id);
        Ok(())
    }

    pub async fn read_session_logs(
        &self,
        session_id: &str,
        log_type: LogType,
        options: LogReadOptions,
    ) -> Result<LogExcerpt> {
        let record = self.store.get(session_id)?;
        let path = record.server_info.logs.path(log_type);

        let excerpt = self.log_reader.read(path, options).await?;
        self.touch(session_id);
        Ok(excerpt)
    }

    /// Last `lines` lines of the session's stderr log, when readable
    pub async fn stderr_tail(&self, session_id: &str, lines: usize) -> Option<String> {
        let record = self.store.get(session_id).ok()?;
        self.log_reader
            .tail(&record.server_info.logs.stderr, lines)
            .await
    }

    // ========================================================================
    // Browser pass-throughs
    // ========================================================================

    /// Navigate the session's page, opening one if needed
    pub async fn navigate(&self, session_id: &str, url: &str, wait_until: WaitUntil) -> Result<PageInfo> {
        let record = self.store.get(session_id)?;
        let url = self.url_validator.validate(url)?;
        let browser = live_browser(&record)?;

        let page = match record.current_page() {
            Some(page) => page,
            None => {
                let page = browser.new_page().await?;
                self.store.update(session_id, SessionUpdate::page(&page))?;
                page
            }
        };

        let info = page.navigate(&url, wait_until).await?;
        self.touch(session_id);
        Ok(info)
    }

    pub async fn click(&self, session_id: &str, selector: &str, timeout: Option<Duration>) -> Result<()> {
        let page = self.page_for(session_id)?;
        page.click(selector, timeout).await?;
        self.touch(session_id);
        Ok(())
    }

    pub async fn fill(&self, session_id: &str, selector: &str, text: &str) -> Result<()> {
        let page = self.page_for(session_id)?;
        page.fill(selector, text).await?;
        self.touch(session_id);
        Ok(())
    }

    pub async fn screenshot(&self, session_id: &str, full_page: bool) -> Result<Vec<u8>> {
        let page = self.page_for(session_id)?;
        let png = page.screenshot(full_page).await?;
        self.touch(session_id);
        Ok(png)
    }

    pub async fn evaluate(&self, session_id: &str, script: &str) -> Result<Value> {
        let page = self.page_for(session_id)?;
        let value = page.evaluate(script).await?;
        self.touch(session_id);
        Ok(value)
    }

    pub async fn content(&self, session_id: &str) -> Result<String> {
        let page = self.page_for(session_id)?;
        let html = page.content().await?;
        self.touch(session_id);
        Ok(html)
    }

    // ========================================================================
    // Introspection and teardown
    // ========================================================================

    pub fn get_session(&self, session_id: &str) -> Result<SessionRecord> {
        self.store.get(session_id)
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.store.list().iter().map(SessionRecord::summary).collect()
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    /// Tear down every session; used at process shutdown
    pub async fn cleanup(&self) {
        let timers: Vec<TimerEntry> = self.timers.lock().drain().map(|(_, entry)| entry).collect();
        for timer in timers {
            timer.token.cancel();
        }

        let records = self.store.list();
        info!("Cleaning up {} sessions", records.len());
        for record in records {
            match self.store.delete(&record.session_id) {
                Ok(record) => release_browser(&record.session_id, record.browser).await,
                Err(e) => debug!("Session {} already removed: {}", record.session_id, e),
            }
        }
        self.store.clear();
    }

    // ========================================================================
    // Idle timers
    // ========================================================================

    fn arm_timer(&self, session_id: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let previous = self.timers.lock().insert(
            session_id.to_string(),
            TimerEntry {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let manager = self.clone();
        let session_id = session_id.to_string();
        let timeout = self.settings.session_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => manager.expire(&session_id, generation).await,
            }
        });
    }

    fn cancel_timer(&self, session_id: &str) {
        if let Some(entry) = self.timers.lock().remove(session_id) {
            entry.token.cancel();
        }
    }

    async fn expire(&self, session_id: &str, generation: u64) {
        {
            let mut timers = self.timers.lock();
            match timers.get(session_id) {
                Some(entry) if entry.generation == generation => {
                    timers.remove(session_id);
                }
                // Re-armed or cancelled in the meantime
                _ => return,
            }
        }

        match self.store.delete(session_id) {
            Ok(record) => {
                info!(
                    "Session {} expired after {}ms idle",
                    session_id,
                    self.settings.session_timeout.as_millis()
                );
                release_browser(session_id, record.browser).await;
            }
            Err(e) => debug!("Expired session {} already removed: {}", session_id, e),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn validate_command(&self, command_path: &str) -> Result<PathBuf> {
        let options = if self.settings.verify_command_exists {
            ValidationOptions::strict()
        } else {
            ValidationOptions::dry()
        };
        Ok(self.command_validator.validate(command_path, options)?)
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::with_timeout(self.settings.command_timeout)
    }

    /// Activity touch where the session may have vanished concurrently
    fn touch(&self, session_id: &str) {
        if let Err(e) = self.update_session_activity(session_id) {
            debug!("Could not touch session {}: {}", session_id, e);
        }
    }

    fn page_for(&self, session_id: &str) -> Result<Arc<dyn PageHandle>> {
        let record = self.store.get(session_id)?;
        live_browser(&record)?;
        record.current_page().ok_or_else(|| SessionError::NoPage {
            session_id: session_id.to_string(),
        })
    }
}

fn live_browser(record: &SessionRecord) -> Result<Arc<dyn BrowserHandle>> {
    record
        .browser
        .clone()
        .filter(|browser| browser.is_connected())
        .ok_or_else(|| SessionError::BrowserNotInitialized {
            session_id: record.session_id.clone(),
        })
}

/// Best-effort browser close; failures are logged only
async fn release_browser(session_id: &str, browser: Option<Arc<dyn BrowserHandle>>) {
    if let Some(browser) = browser {
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser for session {}: {}", session_id, e);
        }
    }
}

fn parse_response<T: DeserializeOwned>(command: &Path, args: &[String], value: Value) -> Result<T> {
    T::deserialize(&value).map_err(|e| {
        CommandError::InvalidJson {
            command: command.display().to_string(),
            args: args.to_vec(),
            stdout: value.to_string(),
            parse_error: e.to_string(),
        }
        .into()
    })
}
