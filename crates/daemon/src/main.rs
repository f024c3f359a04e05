//! E2E session daemon
//!
//! Serves the session tools over HTTP until interrupted, then tears every
//! session down.

use clap::Parser;
use e2e_common::{ProcessExecutor, UrlValidator};
use e2e_daemon::config::{DaemonConfig, LogFormat};
use e2e_daemon::driver::ChromiumLauncher;
use e2e_daemon::server::{self, AppState};
use e2e_daemon::{ManagerSettings, MetricsCollector, SessionManager, SessionStore, ToolService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "e2e-sessiond")]
#[command(about = "E2E session daemon - dev servers and browsers as callable tools")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "E2E_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// HTTP port, overriding the port of the listen address
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Idle timeout per session, in milliseconds
    #[arg(long, env = "SESSION_TIMEOUT")]
    session_timeout: Option<u64>,

    /// Timeout for each server command, in milliseconds
    #[arg(long, env = "COMMAND_TIMEOUT")]
    command_timeout: Option<u64>,

    /// Only accept this server command path
    #[arg(long, env = "SERVER_COMMAND_PATH")]
    server_command_path: Option<PathBuf>,

    /// Comma-separated navigation allow-list; `*.` prefixes match subdomains
    #[arg(long, env = "ALLOWED_HOSTS")]
    allowed_hosts: Option<String>,

    /// Directory that log reads must stay inside
    #[arg(long, env = "E2E_LOG_ROOT")]
    log_root: Option<PathBuf>,

    /// Write the effective configuration as TOML to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load(path)?,
            None => DaemonConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(port) = self.port {
            config.set_port(port)?;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
        if let Some(ms) = self.session_timeout {
            config.session.session_timeout_ms = ms;
        }
        if let Some(ms) = self.command_timeout {
            config.session.command_timeout_ms = ms;
        }
        if let Some(path) = self.server_command_path {
            config.session.server_command_path = Some(path);
        }
        if let Some(hosts) = self.allowed_hosts {
            config.security.allowed_hosts = UrlValidator::from_list(&hosts).allowed_hosts();
        }
        if let Some(root) = self.log_root {
            config.session.log_root = Some(root);
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(config: &DaemonConfig, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    // stderr only
    match config.logging.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let debug = cli.debug;
    let write_config = cli.write_config.clone();
    let config = cli.into_config()?;

    if let Some(path) = write_config {
        config.save(&path)?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    init_logging(&config, debug);
    info!("E2E session daemon v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(SessionStore::new());
    let manager = SessionManager::new(
        store,
        Arc::new(ProcessExecutor::new()),
        Arc::new(ChromiumLauncher::new(config.browser.clone())),
        ManagerSettings::from(&config),
    );
    let metrics = Arc::new(MetricsCollector::new());
    let tools = ToolService::from_config(manager.clone(), &config, metrics);

    if let Some(path) = &config.session.server_command_path {
        info!("Server command restricted to {}", path.display());
    }
    if config.security.allowed_hosts.is_empty() {
        info!("Navigation allowed to any public host");
    } else {
        info!("Navigation allowed to {}", config.security.allowed_hosts.join(", "));
    }

    let state = Arc::new(AppState::new(tools));
    let result = server::serve(config.listen_addr()?, state, shutdown_signal()).await;

    manager.cleanup().await;
    info!("Daemon shutdown complete");
    result
}
