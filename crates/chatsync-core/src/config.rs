//! Client configuration model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::{CacheSettings, DEFAULT_MAX_AUTHORITY_PAGES, DEFAULT_REPLY_LATENCY_MS};

/// Root of `config.toml`.
///
/// Every field has a default, so an empty or partial file is valid.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST authority, e.g. `http://localhost:8000`.
    /// Without one the local authority is used.
    pub api_base: Option<String>,
    /// Use the local authority even when `api_base` is set.
    pub force_local: bool,
    pub reply_latency_ms: u64,
    pub request_timeout_secs: u64,
    pub reconcile_interval_secs: u64,
    /// Page size of history listings.
    pub display_page_size: usize,
    pub max_authority_pages: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            force_local: false,
            reply_latency_ms: DEFAULT_REPLY_LATENCY_MS,
            request_timeout_secs: 10,
            reconcile_interval_secs: 300,
            display_page_size: 5,
            max_authority_pages: DEFAULT_MAX_AUTHORITY_PAGES,
        }
    }
}

impl ClientConfig {
    /// Whether the in-process local authority backs this client.
    pub fn uses_local_authority(&self) -> bool {
        self.force_local || self.api_base.as_deref().is_none_or(|b| b.trim().is_empty())
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            reply_latency: Duration::from_millis(self.reply_latency_ms),
            max_authority_pages: self.max_authority_pages.max(1),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }
}
