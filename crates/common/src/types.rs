//! Wire types exchanged with the external server command

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log file locations reported by a started server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPaths {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub combined: PathBuf,
}

impl LogPaths {
    pub fn path(&self, log_type: LogType) -> &PathBuf {
        match log_type {
            LogType::Stdout => &self.stdout,
            LogType::Stderr => &self.stderr,
            LogType::Combined => &self.combined,
        }
    }
}

/// Which server log to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Stdout,
    Stderr,
    #[default]
    Combined,
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogType::Stdout => write!(f, "stdout"),
            LogType::Stderr => write!(f, "stderr"),
            LogType::Combined => write!(f, "combined"),
        }
    }
}

/// Server metadata stored with a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub url: String,
    pub port: u16,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub logs: LogPaths,
}

impl From<ServerStartResponse> for ServerInfo {
    fn from(resp: ServerStartResponse) -> Self {
        Self {
            url: resp.url,
            port: resp.port,
            pid: resp.pid,
            started_at: resp.started_at,
            logs: resp.logs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Ready,
    AlreadyRunning,
}

/// Output of `--start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStartResponse {
    pub status: StartStatus,
    pub url: String,
    pub port: u16,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub logs: LogPaths,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStatus {
    Restarted,
    Started,
}

/// Output of `--restart`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRestartResponse {
    pub status: RestartStatus,
    pub url: String,
    pub port: u16,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_port: Option<u16>,
    pub started_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Running,
    Stopped,
    Unhealthy,
}

/// Output of `--status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusResponse {
    pub status: ServerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogPaths>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStatus {
    Stopped,
    AlreadyStopped,
    ForceStopped,
}

/// Output of `--shutdown`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerShutdownResponse {
    pub status: ShutdownStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_response_parses_camel_case() {
        let value = json!({
            "status": "ready",
            "url": "http://localhost:5173",
            "port": 5173,
            "pid": 4242,
            "startedAt": "2024-01-01T00:00:00.000Z",
            "logs": {
                "stdout": "/tmp/dev/stdout.log",
                "stderr": "/tmp/dev/stderr.log",
                "combined": "/tmp/dev/combined.log"
            },
            "message": "Server started"
        });

        let resp: ServerStartResponse = serde_json::from_value(value).unwrap();
        assert_eq!(resp.status, StartStatus::Ready);
        assert_eq!(resp.port, 5173);

        let info = ServerInfo::from(resp);
        assert_eq!(info.logs.path(LogType::Stderr), &PathBuf::from("/tmp/dev/stderr.log"));
    }

    #[test]
    fn test_status_response_optional_fields() {
        let resp: ServerStatusResponse =
            serde_json::from_value(json!({"status": "stopped", "message": "not running"})).unwrap();
        assert_eq!(resp.status, ServerState::Stopped);
        assert!(resp.pid.is_none());
        assert!(resp.logs.is_none());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result: Result<ServerShutdownResponse, _> =
            serde_json::from_value(json!({"status": "exploded", "message": "?"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_log_type_default_is_combined() {
        assert_eq!(LogType::default(), LogType::Combined);
        let parsed: LogType = serde_json::from_value(json!("stderr")).unwrap();
        assert_eq!(parsed.to_string(), "stderr");
    }
}
