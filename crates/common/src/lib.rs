//! E2E Session Common Library
//!
//! Leaf components shared by the session daemon:
//! - input gates that reject command-injection and SSRF patterns
//! - a sliding-window rate limiter
//! - the command executor that runs a caller-supplied server command
//! - a bounded log reader
//!
//! Nothing in this crate knows about sessions or browsers.

pub mod error;
pub mod exec;
pub mod logs;
pub mod security;
pub mod types;

// Re-export commonly used types
pub use error::{CommandError, CommandValidationError, LogError, RateLimitError, UrlValidationError};
pub use exec::{CommandRunner, ExecOptions, ProcessExecutor};
pub use logs::{LogExcerpt, LogReadOptions, LogReader};
pub use security::command::{CommandPathValidator, ValidationOptions};
pub use security::rate_limit::{RateLimitConfig, RateLimiter};
pub use security::url::UrlValidator;
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default idle-session timeout in milliseconds (10 minutes)
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 600_000;

/// Default command execution timeout in milliseconds
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Default number of log lines returned when no window is requested
pub const DEFAULT_LOG_LINES: usize = 100;
