//! Callable tool surface
//!
//! Every call resolves to a JSON payload: `{"result": "success", ...}` on
//! success, `{"error": message, "type": kind}` on failure.

use crate::config::DaemonConfig;
use crate::driver::WaitUntil;
use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::monitoring::MetricsCollector;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use e2e_common::security::rate_limit::{SESSION_CREATE, TOOL_CALL};
use e2e_common::{LogReadOptions, LogType, RateLimitConfig, RateLimitError, RateLimiter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lines of stderr attached to driver failures
const ERROR_LOG_LINES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    StartSession,
    StopSession,
    GetSessionStatus,
    RestartSession,
    ListSessions,
    ReadLogs,
    Navigate,
    Click,
    Fill,
    Screenshot,
    Evaluate,
    GetContent,
}

impl Tool {
    pub const ALL: [Tool; 12] = [
        Tool::StartSession,
        Tool::StopSession,
        Tool::GetSessionStatus,
        Tool::RestartSession,
        Tool::ListSessions,
        Tool::ReadLogs,
        Tool::Navigate,
        Tool::Click,
        Tool::Fill,
        Tool::Screenshot,
        Tool::Evaluate,
        Tool::GetContent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::StartSession => "startSession",
            Tool::StopSession => "stopSession",
            Tool::GetSessionStatus => "getSessionStatus",
            Tool::RestartSession => "restartSession",
            Tool::ListSessions => "listSessions",
            Tool::ReadLogs => "readLogs",
            Tool::Navigate => "navigate",
            Tool::Click => "click",
            Tool::Fill => "fill",
            Tool::Screenshot => "screenshot",
            Tool::Evaluate => "evaluate",
            Tool::GetContent => "getContent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::StartSession => {
                "Start a development server and create a browser session for E2E testing"
            }
            Tool::StopSession => {
                "Stop the E2E session, close browser, and shutdown the development server"
            }
            Tool::GetSessionStatus => "Get the current status of an E2E session",
            Tool::RestartSession => "Restart the development server of an E2E session",
            Tool::ListSessions => "List active E2E sessions",
            Tool::ReadLogs => "Read development server logs for an E2E session",
            Tool::Navigate => "Navigate the session browser to a URL",
            Tool::Click => "Click an element on the current page",
            Tool::Fill => "Fill an input element on the current page",
            Tool::Screenshot => "Capture a screenshot of the current page",
            Tool::Evaluate => "Execute JavaScript in the current page",
            Tool::GetContent => "Get the HTML content of the current page",
        }
    }

    pub fn input_schema(self) -> Value {
        let session_id = json!({"type": "string", "description": "Session ID"});
        let command_path =
            json!({"type": "string", "description": "Absolute path to the server command"});
        let command_args = |default: &str| {
            json!({
                "type": "array",
                "items": {"type": "string"},
                "description": format!("Command arguments (default: [\"{}\"])", default)
            })
        };

        match self {
            Tool::StartSession => json!({
                "type": "object",
                "properties": {"commandPath": command_path, "args": command_args("--start")},
                "required": ["commandPath"]
            }),
            Tool::StopSession => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "commandPath": command_path,
                    "args": command_args("--shutdown")
                },
                "required": ["sessionId", "commandPath"]
            }),
            Tool::GetSessionStatus => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "commandPath": command_path,
                    "args": command_args("--status")
                },
                "required": ["sessionId", "commandPath"]
            }),
            Tool::RestartSession => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "commandPath": command_path,
                    "args": command_args("--restart")
                },
                "required": ["sessionId", "commandPath"]
            }),
            Tool::ListSessions => json!({"type": "object", "properties": {}}),
            Tool::ReadLogs => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "logType": {
                        "type": "string",
                        "enum": ["stdout", "stderr", "combined"],
                        "description": "Log to read (default: combined)"
                    },
                    "lines": {"type": "number", "description": "Number of lines (default: 100)"},
                    "offset": {"type": "number", "description": "First line to return, counted from the start"}
                },
                "required": ["sessionId"]
            }),
            Tool::Navigate => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "url": {"type": "string", "description": "URL to navigate to"},
                    "waitUntil": {
                        "type": "string",
                        "enum": ["load", "domcontentloaded", "networkidle"],
                        "description": "Wait until event (default: load)"
                    }
                },
                "required": ["sessionId", "url"]
            }),
            Tool::Click => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "selector": {"type": "string", "description": "CSS selector"},
                    "timeout": {"type": "number", "description": "Timeout in milliseconds"}
                },
                "required": ["sessionId", "selector"]
            }),
            Tool::Fill => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "selector": {"type": "string", "description": "CSS selector for the input element"},
                    "text": {"type": "string", "description": "Text to fill"}
                },
                "required": ["sessionId", "selector", "text"]
            }),
            Tool::Screenshot => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "fullPage": {"type": "boolean", "description": "Capture full page screenshot (default: false)"}
                },
                "required": ["sessionId"]
            }),
            Tool::Evaluate => json!({
                "type": "object",
                "properties": {
                    "sessionId": session_id,
                    "script": {"type": "string", "description": "JavaScript code to execute"}
                },
                "required": ["sessionId", "script"]
            }),
            Tool::GetContent => json!({
                "type": "object",
                "properties": {"sessionId": session_id},
                "required": ["sessionId"]
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn definitions() -> Vec<ToolDefinition> {
    Tool::ALL
        .into_iter()
        .map(|tool| ToolDefinition {
            name: tool.name(),
            description: tool.description(),
            input_schema: tool.input_schema(),
        })
        .collect()
}

/// Payload of one tool call
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub body: Value,
    /// Failure tag, `None` on success
    pub error_kind: Option<&'static str>,
}

impl ToolReply {
    fn success(mut body: Value) -> Self {
        if let Value::Object(map) = &mut body {
            map.insert("result".to_string(), json!("success"));
        }
        Self {
            body,
            error_kind: None,
        }
    }

    fn error(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            body: json!({"error": message.into(), "type": kind}),
            error_kind: Some(kind),
        }
    }

    fn rate_limited(err: &RateLimitError) -> Self {
        let mut reply = Self::error(err.kind(), err.to_string());
        reply.body["limit"] = json!(err.limit);
        reply.body["windowMs"] = json!(err.window_ms);
        reply.body["retryAfter"] = json!(err.retry_after_ms);
        reply
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}

impl From<&SessionError> for ToolReply {
    fn from(err: &SessionError) -> Self {
        Self::error(err.kind(), err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionArgs {
    command_path: String,
    args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCommandArgs {
    session_id: String,
    command_path: String,
    args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadLogsArgs {
    session_id: String,
    #[serde(default)]
    log_type: LogType,
    lines: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateArgs {
    session_id: String,
    url: String,
    #[serde(default)]
    wait_until: WaitUntil,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClickArgs {
    session_id: String,
    selector: String,
    /// Milliseconds
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillArgs {
    session_id: String,
    selector: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreenshotArgs {
    session_id: String,
    #[serde(default)]
    full_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateArgs {
    session_id: String,
    script: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionArgs {
    session_id: String,
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolReply> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments)
        .map_err(|e| ToolReply::error("invalid_arguments", format!("Invalid arguments: {}", e)))
}

fn command_args(args: Option<Vec<String>>, default: &str) -> Vec<String> {
    args.unwrap_or_else(|| vec![default.to_string()])
}

/// Dispatches tool calls to the session manager behind per-caller rate limits
pub struct ToolService {
    manager: SessionManager,
    session_limiter: RateLimiter,
    tool_limiter: RateLimiter,
    metrics: Arc<MetricsCollector>,
}

impl ToolService {
    pub fn new(
        manager: SessionManager,
        session_create_limit: RateLimitConfig,
        tool_call_limit: RateLimitConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            manager,
            session_limiter: RateLimiter::new(session_create_limit),
            tool_limiter: RateLimiter::new(tool_call_limit),
            metrics,
        }
    }

    pub fn from_config(manager: SessionManager, config: &DaemonConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self::new(
            manager,
            config.security.session_create_limit,
            config.security.tool_call_limit,
            metrics,
        )
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub async fn call(&self, caller: &str, name: &str, arguments: Value) -> ToolReply {
        let Some(tool) = Tool::from_name(name) else {
            return ToolReply::error("unknown_tool", format!("Unknown tool: {}", name));
        };

        let started = Instant::now();
        let reply = match self.dispatch(caller, tool, arguments).await {
            Ok(reply) => reply,
            Err(reply) => reply,
        };
        self.metrics
            .record_tool_call(tool.name(), reply.is_success(), started.elapsed());

        match reply.error_kind {
            Some(kind) => debug!("Tool {} failed for {}: {}", name, caller, kind),
            None => debug!("Tool {} succeeded for {}", name, caller),
        }
        reply
    }

    async fn dispatch(&self, caller: &str, tool: Tool, arguments: Value) -> Result<ToolReply, ToolReply> {
        if let Err(e) = self.tool_limiter.check_limit(TOOL_CALL, caller) {
            warn!("Tool call rate limit hit by {}", caller);
            return Err(ToolReply::rate_limited(&e));
        }
        if tool == Tool::StartSession {
            if let Err(e) = self.session_limiter.check_limit(SESSION_CREATE, caller) {
                warn!("Session creation rate limit hit by {}", caller);
                return Err(ToolReply::rate_limited(&e));
            }
        }

        let body = match tool {
            Tool::StartSession => self.start_session(arguments).await?,
            Tool::StopSession => self.stop_session(arguments).await?,
            Tool::GetSessionStatus => self.session_status(arguments).await?,
            Tool::RestartSession => self.restart_session(arguments).await?,
            Tool::ListSessions => json!({"sessions": self.manager.list_sessions()}),
            Tool::ReadLogs => self.read_logs(arguments).await?,
            Tool::Navigate => self.navigate(arguments).await?,
            Tool::Click => self.click(arguments).await?,
            Tool::Fill => self.fill(arguments).await?,
            Tool::Screenshot => self.screenshot(arguments).await?,
            Tool::Evaluate => self.evaluate(arguments).await?,
            Tool::GetContent => self.content(arguments).await?,
        };
        Ok(ToolReply::success(body))
    }

    async fn start_session(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: StartSessionArgs = parse(arguments)?;
        let started = self
            .manager
            .start_session(&a.command_path, &command_args(a.args, "--start"))
            .await
            .map_err(|e| ToolReply::from(&e))?;

        Ok(json!({
            "sessionId": started.session_id,
            "url": started.server.url,
            "port": started.server.port,
            "pid": started.server.pid,
            "logs": started.server.logs,
        }))
    }

    async fn stop_session(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: SessionCommandArgs = parse(arguments)?;
        let response = self
            .manager
            .stop_session(&a.session_id, &a.command_path, &command_args(a.args, "--shutdown"))
            .await
            .map_err(|e| ToolReply::from(&e))?;

        Ok(json!({
            "message": "Session stopped successfully",
            "shutdown": response,
        }))
    }

    async fn session_status(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: SessionCommandArgs = parse(arguments)?;
        let response = self
            .manager
            .get_session_status(&a.session_id, &a.command_path, &command_args(a.args, "--status"))
            .await
            .map_err(|e| ToolReply::from(&e))?;

        Ok(json!({"status": response}))
    }

    async fn restart_session(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: SessionCommandArgs = parse(arguments)?;
        let response = self
            .manager
            .restart_session(&a.session_id, &a.command_path, &command_args(a.args, "--restart"))
            .await
            .map_err(|e| ToolReply::from(&e))?;

        Ok(json!({
            "url": response.url,
            "port": response.port,
            "pid": response.pid,
            "previousPid": response.previous_pid,
            "message": response.message,
        }))
    }

    async fn read_logs(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: ReadLogsArgs = parse(arguments)?;
        let options = LogReadOptions {
            lines: a.lines,
            offset: a.offset,
        };
        let excerpt = self
            .manager
            .read_session_logs(&a.session_id, a.log_type, options)
            .await
            .map_err(|e| ToolReply::from(&e))?;

        Ok(json!({
            "logType": a.log_type,
            "logs": excerpt.text(),
            "lines": excerpt.lines.len(),
            "start": excerpt.start,
            "totalLines": excerpt.total_lines,
        }))
    }

    async fn navigate(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: NavigateArgs = parse(arguments)?;
        match self.manager.navigate(&a.session_id, &a.url, a.wait_until).await {
            Ok(info) => Ok(json!({"url": info.url, "title": info.title})),
            Err(e) => Err(self.driver_failure(&a.session_id, &e).await),
        }
    }

    async fn click(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: ClickArgs = parse(arguments)?;
        let timeout = a.timeout.map(Duration::from_millis);
        match self.manager.click(&a.session_id, &a.selector, timeout).await {
            Ok(()) => Ok(json!({"selector": a.selector})),
            Err(e) => Err(self.driver_failure(&a.session_id, &e).await),
        }
    }

    async fn fill(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: FillArgs = parse(arguments)?;
        match self.manager.fill(&a.session_id, &a.selector, &a.text).await {
            Ok(()) => Ok(json!({"selector": a.selector})),
            Err(e) => Err(self.driver_failure(&a.session_id, &e).await),
        }
    }

    async fn screenshot(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: ScreenshotArgs = parse(arguments)?;
        match self.manager.screenshot(&a.session_id, a.full_page).await {
            Ok(png) => Ok(json!({
                "data": STANDARD.encode(&png),
                "mimeType": "image/png",
                "size": png.len(),
            })),
            Err(e) => Err(self.driver_failure(&a.session_id, &e).await),
        }
    }

    async fn evaluate(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: EvaluateArgs = parse(arguments)?;
        match self.manager.evaluate(&a.session_id, &a.script).await {
            Ok(value) => Ok(json!({"value": value})),
            Err(e) => Err(self.driver_failure(&a.session_id, &e).await),
        }
    }

    async fn content(&self, arguments: Value) -> Result<Value, ToolReply> {
        let a: SessionArgs = parse(arguments)?;
        match self.manager.content(&a.session_id).await {
            Ok(html) => Ok(json!({"length": html.len(), "html": html})),
            Err(e) => Err(self.driver_failure(&a.session_id, &e).await),
        }
    }

    /// Error reply for a browser operation, with recent server stderr attached
    async fn driver_failure(&self, session_id: &str, err: &SessionError) -> ToolReply {
        let mut reply = ToolReply::from(err);
        if err.is_driver_failure() {
            if let Some(stderr) = self.manager.stderr_tail(session_id, ERROR_LOG_LINES).await {
                reply.body["serverLogs"] = json!({
                    "stderr": stderr,
                    "capturedAt": Utc::now(),
                });
            }
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::test_utils::*;
    use std::fs;
    use tempfile::TempDir;

    fn service(harness: &TestHarness) -> ToolService {
        ToolService::new(
            harness.manager.clone(),
            RateLimitConfig::new(2, 60_000),
            RateLimitConfig::new(100, 60_000),
            Arc::new(MetricsCollector::new()),
        )
    }

    async fn start(svc: &ToolService) -> String {
        let reply = svc
            .call("agent", "startSession", json!({"commandPath": TEST_COMMAND}))
            .await;
        assert!(reply.is_success(), "{}", reply.body);
        reply.body["sessionId"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_definitions_cover_every_tool() {
        let defs = definitions();
        assert_eq!(defs.len(), Tool::ALL.len());
        for def in &defs {
            assert_eq!(Tool::from_name(def.name).unwrap().name(), def.name);
            assert_eq!(def.input_schema["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_start_uses_default_args() {
        let h = TestHarness::new(test_settings());
        let svc = service(&h);

        let reply = svc
            .call("agent", "startSession", json!({"commandPath": TEST_COMMAND}))
            .await;
        assert_eq!(reply.body["result"], "success");
        assert_eq!(reply.body["port"], 5173);
        assert_eq!(h.runner.calls()[0].1, vec!["--start".to_string()]);
    }

    #[tokio::test]
    async fn test_stop_and_status_payloads() {
        let h = TestHarness::new(test_settings());
        let svc = service(&h);
        let id = start(&svc).await;

        let status = svc
            .call("agent", "getSessionStatus", json!({"sessionId": id, "commandPath": TEST_COMMAND}))
            .await;
        assert_eq!(status.body["status"]["status"], "running");

        let stopped = svc
            .call("agent", "stopSession", json!({"sessionId": id, "commandPath": TEST_COMMAND}))
            .await;
        assert_eq!(stopped.body["result"], "success");
        assert_eq!(h.runner.calls().last().unwrap().1, vec!["--shutdown".to_string()]);

        let again = svc
            .call("agent", "stopSession", json!({"sessionId": id, "commandPath": TEST_COMMAND}))
            .await;
        assert_eq!(again.body["type"], "session_not_found");
    }

    #[tokio::test]
    async fn test_error_shape() {
        let h = TestHarness::new(test_settings());
        let svc = service(&h);

        let reply = svc
            .call("agent", "startSession", json!({"commandPath": "relative/dev.sh"}))
            .await;
        assert_eq!(reply.error_kind, Some("relative_path"));
        assert_eq!(reply.body["type"], "relative_path");
        assert!(reply.body["error"].as_str().unwrap().contains("absolute"));
        assert!(reply.body.get("result").is_none());
    }

    #[tokio::test]
    async fn test_invalid_and_unknown() {
        let h = TestHarness::new(test_settings());
        let svc = service(&h);

        let reply = svc.call("agent", "navigate", json!({"url": "https://example.com"})).await;
        assert_eq!(reply.error_kind, Some("invalid_arguments"));

        let reply = svc.call("agent", "teleport", json!({})).await;
        assert_eq!(reply.error_kind, Some("unknown_tool"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_creation_is_rate_limited() {
        let h = TestHarness::new(test_settings());
        let svc = service(&h);

        start(&svc).await;
        start(&svc).await;
        let reply = svc
            .call("agent", "startSession", json!({"commandPath": TEST_COMMAND}))
            .await;
        assert_eq!(reply.error_kind, Some("rate_limit_exceeded"));
        assert_eq!(reply.body["limit"], 2);
        assert_eq!(reply.body["windowMs"], 60_000);
        assert!(reply.body["retryAfter"].as_u64().unwrap() <= 60_000);
        assert_eq!(h.launcher.launch_count(), 2);

        // Other callers are unaffected.
        let other = svc
            .call("ci", "startSession", json!({"commandPath": TEST_COMMAND}))
            .await;
        assert!(other.is_success());
    }

    #[tokio::test]
    async fn test_browser_round_trip() {
        let h = TestHarness::new(test_settings());
        let svc = service(&h);
        let id = start(&svc).await;

        let nav = svc
            .call("agent", "navigate", json!({"sessionId": id, "url": "https://example.com", "waitUntil": "networkidle"}))
            .await;
        assert_eq!(nav.body["title"], "Fake Page");

        let shot = svc.call("agent", "screenshot", json!({"sessionId": id})).await;
        let data = shot.body["data"].as_str().unwrap();
        assert_eq!(STANDARD.decode(data).unwrap(), b"\x89PNG fake".to_vec());
        assert_eq!(shot.body["size"], 9);

        let content = svc.call("agent", "getContent", json!({"sessionId": id})).await;
        assert!(content.body["html"].as_str().unwrap().contains("example.com"));

        let listed = svc.call("agent", "listSessions", Value::Null).await;
        assert_eq!(listed.body["sessions"][0]["hasPage"], true);
    }

    #[tokio::test]
    async fn test_driver_failure_carries_server_logs() {
        let dir = TempDir::new().unwrap();
        let logs = log_paths(dir.path());
        fs::write(&logs.stderr, "TypeError: undefined is not a function\n").unwrap();

        let h = TestHarness::with_runner(test_settings(), ScriptedRunner::new(logs));
        let svc = service(&h);
        let id = start(&svc).await;

        svc.call("agent", "navigate", json!({"sessionId": id, "url": "https://example.com"}))
            .await;
        h.launcher.last_browser().unwrap().pages()[0].fail_with(DriverError::ElementNotFound {
            selector: "#buy".to_string(),
        });

        let reply = svc
            .call("agent", "click", json!({"sessionId": id, "selector": "#buy"}))
            .await;
        assert_eq!(reply.error_kind, Some("element_not_found"));
        assert_eq!(
            reply.body["serverLogs"]["stderr"],
            "TypeError: undefined is not a function"
        );

        // Validation failures are not enriched.
        let reply = svc
            .call("agent", "navigate", json!({"sessionId": id, "url": "http://10.0.0.1"}))
            .await;
        assert_eq!(reply.error_kind, Some("private_ip"));
        assert!(reply.body.get("serverLogs").is_none());
    }

    #[tokio::test]
    async fn test_read_logs_defaults() {
        let dir = TempDir::new().unwrap();
        let logs = log_paths(dir.path());
        let body: String = (1..=120).map(|i| format!("combined {i}\n")).collect();
        fs::write(&logs.combined, body).unwrap();

        let h = TestHarness::with_runner(test_settings(), ScriptedRunner::new(logs));
        let svc = service(&h);
        let id = start(&svc).await;

        let reply = svc.call("agent", "readLogs", json!({"sessionId": id})).await;
        assert_eq!(reply.body["logType"], "combined");
        assert_eq!(reply.body["lines"], 100);
        assert_eq!(reply.body["totalLines"], 120);
        assert!(reply.body["logs"].as_str().unwrap().starts_with("combined 21\n"));
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let h = TestHarness::new(test_settings());
        let svc = service(&h);
        start(&svc).await;
        svc.call("agent", "getContent", json!({"sessionId": "missing"})).await;

        let metrics = svc.metrics().metrics();
        assert_eq!(metrics.tool_calls.total, 2);
        assert_eq!(metrics.by_tool["getContent"].failed, 1);
        assert_eq!(metrics.by_tool["startSession"].successful, 1);
    }
}
