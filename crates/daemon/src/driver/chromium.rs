//! Headless Chromium over CDP

use super::{BrowserHandle, BrowserLauncher, PageHandle, PageInfo, WaitUntil};
use crate::config::BrowserConfig;
use crate::error::DriverError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CLEAR_VALUE_JS: &str = "function() { this.value = ''; }";

/// Launches one Chromium process per session
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: BrowserConfig,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.config.operation_timeout_ms)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        let launch_timeout = Duration::from_millis(self.config.launch_timeout_ms);
        // Separate profile per browser so concurrent sessions never share a lock.
        let user_data_dir =
            std::env::temp_dir().join(format!("e2e-session-{}", uuid::Uuid::new_v4()));

        let mut builder = CdpConfig::builder()
            .user_data_dir(&user_data_dir)
            .launch_timeout(launch_timeout)
            .request_timeout(self.operation_timeout())
            .args(self.config.args.iter().map(String::as_str));
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }
        let cdp_config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = tokio::time::timeout(launch_timeout, Browser::launch(cdp_config))
            .await
            .map_err(|_| DriverError::Timeout {
                operation: "launch".to_string(),
                timeout_ms: self.config.launch_timeout_ms,
            })?
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error (continuing): {}", e);
                }
            }
            flag.store(false, Ordering::SeqCst);
            debug!("CDP handler task completed");
        });

        info!("Launched Chromium (profile {})", user_data_dir.display());

        Ok(Arc::new(ChromiumBrowser {
            browser: Mutex::new(Some(browser)),
            handler: parking_lot::Mutex::new(Some(handler_task)),
            connected,
            pages: parking_lot::Mutex::new(Vec::new()),
            operation_timeout: self.operation_timeout(),
            user_data_dir,
        }))
    }
}

pub struct ChromiumBrowser {
    browser: Mutex<Option<Browser>>,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    pages: parking_lot::Mutex<Vec<Arc<ChromiumPage>>>,
    operation_timeout: Duration,
    user_data_dir: PathBuf,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(DriverError::Closed)?;
        if !self.is_connected() {
            return Err(DriverError::Closed);
        }

        let page = tokio::time::timeout(self.operation_timeout, browser.new_page("about:blank"))
            .await
            .map_err(|_| DriverError::Timeout {
                operation: "new_page".to_string(),
                timeout_ms: self.operation_timeout.as_millis() as u64,
            })?
            .map_err(|e| DriverError::Other(e.to_string()))?;

        let page = Arc::new(ChromiumPage {
            page,
            closed: AtomicBool::new(false),
            connected: self.connected.clone(),
            timeout: self.operation_timeout,
        });
        let mut pages = self.pages.lock();
        pages.retain(|p| !p.is_closed());
        pages.push(page.clone());
        Ok(page)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), DriverError> {
        for page in self.pages.lock().drain(..) {
            page.closed.store(true, Ordering::SeqCst);
        }

        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let closed = tokio::time::timeout(self.operation_timeout, browser.close()).await;
                let _ = tokio::time::timeout(self.operation_timeout, browser.wait()).await;
                match closed {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(DriverError::Other(e.to_string())),
                    Err(_) => Err(DriverError::Timeout {
                        operation: "close".to_string(),
                        timeout_ms: self.operation_timeout.as_millis() as u64,
                    }),
                }
            }
            None => Ok(()),
        };

        self.connected.store(false, Ordering::SeqCst);
        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            debug!("Failed to remove {}: {}", self.user_data_dir.display(), e);
        }

        result
    }
}

pub struct ChromiumPage {
    page: Page,
    closed: AtomicBool,
    connected: Arc<AtomicBool>,
    timeout: Duration,
}

impl ChromiumPage {
    async fn bounded<T, F>(&self, operation: &str, limit: Duration, fut: F) -> Result<T, DriverError>
    where
        F: Future<Output = Result<T, DriverError>> + Send,
    {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Page {} timed out after {}ms", operation, limit.as_millis());
                Err(DriverError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        }
    }

    async fn element(&self, selector: &str) -> Result<chromiumoxide::element::Element, DriverError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::ElementNotFound {
                selector: selector.to_string(),
            })
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn navigate(&self, url: &str, wait_until: WaitUntil) -> Result<PageInfo, DriverError> {
        self.bounded("navigate", self.timeout, async {
            self.page.goto(url).await.map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            // goto resolves on the load event, which covers domcontentloaded.
            if wait_until == WaitUntil::NetworkIdle {
                if let Err(e) = self.page.wait_for_navigation().await {
                    debug!("wait_for_navigation after {}: {}", url, e);
                }
            }

            let current = self
                .page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string());
            let title = self.page.get_title().await.ok().flatten();
            Ok(PageInfo { url: current, title })
        })
        .await
    }

    async fn click(&self, selector: &str, timeout: Option<Duration>) -> Result<(), DriverError> {
        self.bounded("click", timeout.unwrap_or(self.timeout), async {
            let element = self.element(selector).await?;
            element
                .click()
                .await
                .map(|_| ())
                .map_err(|e| DriverError::Other(e.to_string()))
        })
        .await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.bounded("fill", self.timeout, async {
            let element = self.element(selector).await?;
            element
                .call_js_fn(CLEAR_VALUE_JS, false)
                .await
                .map_err(|e| DriverError::Other(e.to_string()))?;
            element
                .focus()
                .await
                .map_err(|e| DriverError::Other(e.to_string()))?;
            element
                .type_str(text)
                .await
                .map(|_| ())
                .map_err(|e| DriverError::Other(e.to_string()))
        })
        .await
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, DriverError> {
        self.bounded("screenshot", self.timeout, async {
            self.page
                .screenshot(ScreenshotParams::builder().full_page(full_page).build())
                .await
                .map_err(|e| DriverError::Other(e.to_string()))
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        self.bounded("evaluate", self.timeout, async {
            let result = self
                .page
                .evaluate(script.to_string())
                .await
                .map_err(|e| DriverError::Evaluation(e.to_string()))?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        })
        .await
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.bounded("content", self.timeout, async {
            self.page
                .content()
                .await
                .map_err(|e| DriverError::Other(e.to_string()))
        })
        .await
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst)
    }
}
