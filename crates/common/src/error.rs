//! Error taxonomies for the leaf components
//!
//! Each component has its own closed set of failures. `kind()` returns the
//! snake_case tag reported to callers as the error `type`.

use std::path::PathBuf;
use thiserror::Error;

/// Command-path validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandValidationError {
    #[error("Command path cannot be empty")]
    EmptyPath,

    #[error("Command path contains dangerous characters: {}", format_chars(.chars))]
    InvalidCharacters { path: String, chars: Vec<char> },

    #[error("Command path must be absolute: {path}")]
    RelativePath { path: String },

    #[error("Command path not allowed. Only {} is permitted", .allowed.display())]
    PathNotAllowed { path: PathBuf, allowed: PathBuf },

    #[error("Command file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Command file is not executable: {}", .path.display())]
    NotExecutable { path: PathBuf },
}

impl CommandValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyPath => "empty_path",
            Self::InvalidCharacters { .. } => "invalid_characters",
            Self::RelativePath { .. } => "relative_path",
            Self::PathNotAllowed { .. } => "path_not_allowed",
            Self::FileNotFound { .. } => "file_not_found",
            Self::NotExecutable { .. } => "not_executable",
        }
    }
}

fn format_chars(chars: &[char]) -> String {
    chars
        .iter()
        .map(|c| c.escape_default().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// URL validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Protocol {scheme}: is not allowed. Only HTTP and HTTPS are permitted")]
    InvalidProtocol { url: String, scheme: String },

    #[error("Access to private IP address is not allowed: {host}")]
    PrivateIp { url: String, host: String },

    #[error("Hostname {host} is not in allowed hosts list")]
    HostNotAllowed {
        url: String,
        host: String,
        allowed: Vec<String>,
    },
}

impl UrlValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::InvalidProtocol { .. } => "invalid_protocol",
            Self::PrivateIp { .. } => "private_ip",
            Self::HostNotAllowed { .. } => "host_not_allowed",
        }
    }
}

/// Rejection from the sliding-window rate limiter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limit exceeded: {limit} requests per {window_ms}ms")]
pub struct RateLimitError {
    pub limit: usize,
    pub window_ms: u64,
    /// Milliseconds until the oldest request in the window expires
    pub retry_after_ms: u64,
}

impl RateLimitError {
    pub fn kind(&self) -> &'static str {
        "rate_limit_exceeded"
    }
}

/// Command execution failures
///
/// Exactly one of these (or a parsed value) is produced per execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command timed out after {timeout_ms}ms")]
    Timeout {
        command: String,
        args: Vec<String>,
        timeout_ms: u64,
    },

    #[error("Command exited with code {exit_code}")]
    NonZeroExit {
        command: String,
        args: Vec<String>,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to parse command output as JSON: {parse_error}")]
    InvalidJson {
        command: String,
        args: Vec<String>,
        stdout: String,
        parse_error: String,
    },

    #[error("Failed to execute {command}: {message}")]
    ExecutionError {
        command: String,
        args: Vec<String>,
        message: String,
    },
}

impl CommandError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::NonZeroExit { .. } => "non_zero_exit",
            Self::InvalidJson { .. } => "invalid_json",
            Self::ExecutionError { .. } => "execution_error",
        }
    }

    /// The command path the failure refers to
    pub fn command(&self) -> &str {
        match self {
            Self::Timeout { command, .. }
            | Self::NonZeroExit { command, .. }
            | Self::InvalidJson { command, .. }
            | Self::ExecutionError { command, .. } => command,
        }
    }
}

/// Log reading failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("Invalid log path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Log file not found or not readable: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read log file {path}: {message}")]
    ReadError { path: String, message: String },
}

impl LogError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => "invalid_path",
            Self::FileNotFound { .. } => "file_not_found",
            Self::ReadError { .. } => "read_error",
        }
    }
}
