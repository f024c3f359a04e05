//! Daemon configuration

use e2e_common::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP listen address
    pub listen: String,

    /// Session lifecycle configuration
    pub session: SessionConfig,

    /// Security configuration
    pub security: SecurityConfig,

    /// Browser configuration
    pub browser: BrowserConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            session: SessionConfig::default(),
            security: SecurityConfig::default(),
            browser: BrowserConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is torn down
    pub session_timeout_ms: u64,

    /// Upper bound on every server command
    pub command_timeout_ms: u64,

    /// Check that the command exists and is executable before spawning
    pub verify_command_exists: bool,

    /// The only command path accepted, when set
    pub server_command_path: Option<PathBuf>,

    /// Log reads must stay below this directory, when set
    pub log_root: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: e2e_common::DEFAULT_SESSION_TIMEOUT_MS,
            command_timeout_ms: e2e_common::DEFAULT_COMMAND_TIMEOUT_MS,
            verify_command_exists: true,
            server_command_path: None,
            log_root: None,
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Hosts navigation may reach; `*.domain` wildcards allowed, empty means any public host
    pub allowed_hosts: Vec<String>,

    /// Limit for `startSession` per caller
    pub session_create_limit: RateLimitConfig,

    /// Limit for every tool call per caller
    pub tool_call_limit: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            session_create_limit: RateLimitConfig::new(10, 60_000),
            tool_call_limit: RateLimitConfig::new(300, 60_000),
        }
    }
}

/// Browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,

    /// Chromium binary, auto-detected when unset
    pub executable: Option<PathBuf>,

    pub launch_timeout_ms: u64,

    /// Upper bound on every page operation
    pub operation_timeout_ms: u64,

    /// Extra Chromium command-line flags
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            launch_timeout_ms: 30_000,
            operation_timeout_ms: 30_000,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session.session_timeout_ms == 0 {
            anyhow::bail!("session timeout must be a positive number");
        }
        if self.session.command_timeout_ms == 0 {
            anyhow::bail!("command timeout must be a positive number");
        }
        if self.browser.launch_timeout_ms == 0 || self.browser.operation_timeout_ms == 0 {
            anyhow::bail!("browser timeouts must be positive numbers");
        }

        let addr = self.listen_addr()?;
        if addr.port() == 0 {
            anyhow::bail!("port must be between 1 and 65535");
        }

        if let Some(path) = &self.session.server_command_path {
            if !path.is_absolute() {
                anyhow::bail!("server command path must be absolute: {}", path.display());
            }
        }

        for (name, limit) in [
            ("session create", self.security.session_create_limit),
            ("tool call", self.security.tool_call_limit),
        ] {
            if limit.max_requests == 0 || limit.window_ms == 0 {
                anyhow::bail!("{} rate limit must have positive max_requests and window_ms", name);
            }
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {}: {}", self.listen, e))
    }

    /// Replace the port of the listen address
    pub fn set_port(&mut self, port: u16) -> anyhow::Result<()> {
        let mut addr = self.listen_addr()?;
        addr.set_port(port);
        self.listen = addr.to_string();
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session.session_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.session.command_timeout_ms)
    }
}
