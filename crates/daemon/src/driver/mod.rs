//! Automation driver abstraction
//!
//! A session owns one browser; pages belong to the browser and are only
//! weakly referenced by the session. Every operation is expected to be
//! bounded by a driver-level timeout.

pub mod chromium;

use crate::error::DriverError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use chromium::ChromiumLauncher;

/// Page readiness required before `navigate` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitUntil {
    #[default]
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

/// Where a page ended up after navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: Option<String>,
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn navigate(&self, url: &str, wait_until: WaitUntil) -> Result<PageInfo, DriverError>;

    /// Click the first element matching `selector`; `timeout` overrides the
    /// driver's operation timeout.
    async fn click(&self, selector: &str, timeout: Option<Duration>) -> Result<(), DriverError>;

    /// Replace the value of the input matching `selector`
    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    /// PNG bytes of the viewport, or of the whole page
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, DriverError>;

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError>;

    /// Serialized HTML of the current document
    async fn content(&self) -> Result<String, DriverError>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Open a blank page owned by this browser
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError>;

    fn is_connected(&self) -> bool;

    /// Close every page and the browser process
    async fn close(&self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, DriverError>;
}
