use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::event_types::DEFAULT_RECONCILE_EVENTS;
use crate::model::{PageQuery, SortDirection};

pub const ENV_API_BASE_URL: &str = "NOTIFY_API_BASE_URL";
pub const ENV_PUSH_URL: &str = "NOTIFY_PUSH_URL";
pub const ENV_PAGE_SIZE: &str = "NOTIFY_PAGE_SIZE";
pub const ENV_SETTLE_DELAY_MS: &str = "NOTIFY_SETTLE_DELAY_MS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
    /// `None` keeps retrying forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_reconnect_base_delay_ms(),
            max_delay_ms: default_reconnect_max_delay_ms(),
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Exponential backoff without jitter: `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt.min(16)));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Only events whose `data[key]` equals `value` trigger a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationFilter {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_push_url")]
    pub push_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_latest_limit")]
    pub latest_limit: u32,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default = "default_event_types")]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub correlation: Option<CorrelationFilter>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            push_url: default_push_url(),
            page_size: default_page_size(),
            latest_limit: default_latest_limit(),
            settle_delay_ms: default_settle_delay_ms(),
            sort_by: default_sort_by(),
            sort_direction: SortDirection::default(),
            request_timeout_ms: default_request_timeout_ms(),
            reconnect: ReconnectConfig::default(),
            event_types: default_event_types(),
            correlation: None,
        }
    }
}

impl SyncConfig {
    /// Read a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| SyncError::Config(format!("{}: {error}", path.display())))?;
        let config: SyncConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = non_empty_env(ENV_API_BASE_URL) {
            self.api_base_url = value;
        }
        if let Some(value) = non_empty_env(ENV_PUSH_URL) {
            self.push_url = value;
        }
        if let Some(value) = non_empty_env(ENV_PAGE_SIZE) {
            match value.parse::<u32>() {
                Ok(size) => self.page_size = size,
                Err(error) => tracing::warn!("ignoring {ENV_PAGE_SIZE}={value}: {error}"),
            }
        }
        if let Some(value) = non_empty_env(ENV_SETTLE_DELAY_MS) {
            match value.parse::<u64>() {
                Ok(ms) => self.settle_delay_ms = ms,
                Err(error) => tracing::warn!("ignoring {ENV_SETTLE_DELAY_MS}={value}: {error}"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.api_base_url.trim().is_empty() {
            return Err(SyncError::Config("apiBaseUrl cannot be empty".to_string()));
        }
        if self.push_url.trim().is_empty() {
            return Err(SyncError::Config("pushUrl cannot be empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(SyncError::Config(
                "pageSize must be greater than 0".to_string(),
            ));
        }
        if self.latest_limit == 0 {
            return Err(SyncError::Config(
                "latestLimit must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(SyncError::Config(
                "requestTimeoutMs must be greater than 0".to_string(),
            ));
        }
        if self.event_types.iter().all(|event| event.trim().is_empty()) {
            return Err(SyncError::Config(
                "eventTypes must name at least one event".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn page_query(&self, page: u32) -> PageQuery {
        self.query(self.page_size, page)
    }

    /// The small first-page fetch used to fold in pushed changes.
    pub fn latest_query(&self) -> PageQuery {
        self.query(self.latest_limit, 1)
    }

    fn query(&self, limit: u32, page: u32) -> PageQuery {
        PageQuery {
            limit,
            page,
            sort_by: self.sort_by.clone(),
            sort_direction: self.sort_direction,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_push_url() -> String {
    "http://127.0.0.1:3001/events".to_string()
}

fn default_page_size() -> u32 {
    4
}

fn default_latest_limit() -> u32 {
    2
}

fn default_settle_delay_ms() -> u64 {
    600
}

fn default_sort_by() -> String {
    "createdAt".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    100
}

fn default_reconnect_max_delay_ms() -> u64 {
    10_000
}

fn default_event_types() -> Vec<String> {
    DEFAULT_RECONCILE_EVENTS
        .iter()
        .map(|event| event.to_string())
        .collect()
}
