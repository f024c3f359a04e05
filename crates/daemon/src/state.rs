//! Session registry
//!
//! The registry is the only shared mutable structure in the daemon. It is
//! constructed once by the process and handed to the manager by `Arc`.

use crate::driver::{BrowserHandle, PageHandle};
use crate::error::{Result, SessionError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use e2e_common::ServerInfo;
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

/// A live session
#[derive(Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub server_info: ServerInfo,
    /// Exclusively owned by this session
    pub browser: Option<Arc<dyn BrowserHandle>>,
    /// The browser owns its pages; the session only points at the current one
    pub page: Option<Weak<dyn PageHandle>>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    /// Current page, if it is still alive and open
    pub fn current_page(&self) -> Option<Arc<dyn PageHandle>> {
        self.page
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|page| !page.is_closed())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            server_info: self.server_info.clone(),
            browser_connected: self
                .browser
                .as_ref()
                .map(|b| b.is_connected())
                .unwrap_or(false),
            has_page: self.current_page().is_some(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("session_id", &self.session_id)
            .field("server_info", &self.server_info)
            .field("browser", &self.browser.is_some())
            .field("page", &self.page.is_some())
            .field("created_at", &self.created_at)
            .field("last_activity", &self.last_activity)
            .finish()
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub server_info: ServerInfo,
    pub browser_connected: bool,
    pub has_page: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Partial update; the outer `None` leaves a field unchanged
#[derive(Default)]
pub struct SessionUpdate {
    pub browser: Option<Option<Arc<dyn BrowserHandle>>>,
    pub page: Option<Option<Weak<dyn PageHandle>>>,
    pub server_info: Option<ServerInfo>,
}

impl SessionUpdate {
    /// Refresh `last_activity` only
    pub fn touch() -> Self {
        Self::default()
    }

    pub fn browser(browser: Arc<dyn BrowserHandle>) -> Self {
        Self {
            browser: Some(Some(browser)),
            ..Default::default()
        }
    }

    pub fn page(page: &Arc<dyn PageHandle>) -> Self {
        Self {
            page: Some(Some(Arc::downgrade(page))),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under a fresh identifier
    pub fn create(&self, server_info: ServerInfo) -> SessionRecord {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            server_info,
            browser: None,
            page: None,
            created_at: now,
            last_activity: now,
        };
        self.sessions.insert(record.session_id.clone(), record.clone());
        debug!("Created session record {}", record.session_id);
        record
    }

    pub fn get(&self, session_id: &str) -> Result<SessionRecord> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SessionError::not_found(session_id))
    }

    /// Merge `update` into the record and refresh `last_activity`
    pub fn update(&self, session_id: &str, update: SessionUpdate) -> Result<SessionRecord> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::not_found(session_id))?;

        let record = entry.value_mut();
        if let Some(browser) = update.browser {
            record.browser = browser;
        }
        if let Some(page) = update.page {
            record.page = page;
        }
        if let Some(server_info) = update.server_info {
            record.server_info = server_info;
        }
        record.last_activity = record.last_activity.max(Utc::now());

        Ok(record.clone())
    }

    /// Remove the record. Deleting an absent id is an error.
    pub fn delete(&self, session_id: &str) -> Result<SessionRecord> {
        self.sessions
            .remove(session_id)
            .map(|(_, record)| record)
            .ok_or_else(|| SessionError::not_found(session_id))
    }

    pub fn list(&self) -> Vec<SessionRecord> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
