//! Sliding-window rate limiter
//!
//! Requests are counted per `(operation class, caller)` pair over a trailing
//! window. Pruning is lazy: expired timestamps are dropped on each check and a
//! key whose list drains is removed from the map.

use crate::error::RateLimitError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Operation class for session creation
pub const SESSION_CREATE: &str = "session-create";

/// Operation class for every tool invocation
pub const TOOL_CALL: &str = "tool-call";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn new(max_requests: usize, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

type Key = (String, String);

pub struct RateLimiter {
    config: RateLimitConfig,
    window: Duration,
    requests: Mutex<HashMap<Key, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Duration::from_millis(config.window_ms),
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Record a request if the caller is under its limit.
    pub fn check_limit(&self, operation: &str, caller: &str) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let key = (operation.to_string(), caller.to_string());
        let mut requests = self.requests.lock();

        let entries = requests.entry(key.clone()).or_default();
        while let Some(oldest) = entries.front() {
            if now.saturating_duration_since(*oldest) < self.window {
                break;
            }
            entries.pop_front();
        }

        if entries.len() >= self.config.max_requests {
            let retry_after = entries
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or_default();
            debug!(
                "Rate limit exceeded for {}:{} ({} per {}ms)",
                operation, caller, self.config.max_requests, self.config.window_ms
            );
            if entries.is_empty() {
                requests.remove(&key);
            }
            return Err(RateLimitError {
                limit: self.config.max_requests,
                window_ms: self.config.window_ms,
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }

        entries.push_back(now);
        Ok(())
    }

    /// Forget everything recorded for one caller.
    pub fn reset(&self, operation: &str, caller: &str) {
        self.requests
            .lock()
            .remove(&(operation.to_string(), caller.to_string()));
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }

    /// Number of `(operation, caller)` pairs currently holding timestamps
    pub fn tracked_keys(&self) -> usize {
        let mut requests = self.requests.lock();
        let now = Instant::now();
        let window = self.window;
        requests.retain(|_, entries| {
            entries.retain(|ts| now.saturating_duration_since(*ts) < window);
            !entries.is_empty()
        });
        requests.len()
    }
}
