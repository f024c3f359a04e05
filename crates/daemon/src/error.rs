//! Error types for the session daemon

use e2e_common::{CommandError, CommandValidationError, LogError, UrlValidationError};
use thiserror::Error;

/// Failures reported by the automation driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Browser or page is closed")]
    Closed,

    #[error("Driver error: {0}")]
    Other(String),
}

impl DriverError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Launch(_) => "browser_launch_failed",
            Self::Navigation { .. } => "navigation_failed",
            Self::ElementNotFound { .. } => "element_not_found",
            Self::Evaluation(_) => "evaluation_failed",
            Self::Timeout { .. } => "driver_timeout",
            Self::Closed => "browser_closed",
            Self::Other(_) => "driver_error",
        }
    }
}

/// Any failure a session operation can surface to a caller
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error(transparent)]
    Validation(#[from] CommandValidationError),

    #[error(transparent)]
    Url(#[from] UrlValidationError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("Failed to launch browser for session {session_id}: {source}")]
    BrowserLaunch {
        session_id: String,
        #[source]
        source: DriverError,
    },

    #[error("Browser not initialized for session {session_id}")]
    BrowserNotInitialized { session_id: String },

    #[error("No page open in session {session_id}. Navigate to a URL first")]
    NoPage { session_id: String },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl SessionError {
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "session_not_found",
            Self::Validation(e) => e.kind(),
            Self::Url(e) => e.kind(),
            Self::Command(e) => e.kind(),
            Self::Log(e) => e.kind(),
            Self::BrowserLaunch { .. } => "browser_launch_failed",
            Self::BrowserNotInitialized { .. } => "browser_not_initialized",
            Self::NoPage { .. } => "no_page",
            Self::Driver(e) => e.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Failure raised by the browser rather than by validation or the server command
    pub fn is_driver_failure(&self) -> bool {
        matches!(
            self,
            Self::Driver(_) | Self::BrowserLaunch { .. } | Self::BrowserNotInitialized { .. } | Self::NoPage { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
