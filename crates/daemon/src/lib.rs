//! E2E session daemon
//!
//! Pairs a development server, driven through its command-line contract,
//! with an isolated browser, and exposes both as named tools over HTTP.

pub mod config;
pub mod driver;
pub mod error;
pub mod manager;
pub mod monitoring;
pub mod server;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tools;

pub use config::DaemonConfig;
pub use error::{DriverError, Result, SessionError};
pub use manager::{ManagerSettings, SessionManager, StartedSession};
pub use monitoring::{HealthMonitor, MetricsCollector};
pub use server::AppState;
pub use state::{SessionRecord, SessionStore, SessionSummary};
pub use tools::{Tool, ToolReply, ToolService};
