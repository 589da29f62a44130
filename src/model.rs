use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned notification identity. Servers send either integers or
/// strings; both are kept verbatim and never coerced into each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationId {
    Int(i64),
    Text(String),
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationId::Int(value) => write!(f, "{value}"),
            NotificationId::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for NotificationId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for NotificationId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Every other field the server sends (title, message, type, ...).
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub current_page: u32,
    pub total_pages: u32,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub item_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPage {
    #[serde(default)]
    pub items: Vec<Notification>,
    pub meta: PageMeta,
}

/// Pagination position after at least one page has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    pub page_number: u32,
    pub total_pages: u32,
}

impl PageCursor {
    pub fn from_meta(meta: &PageMeta) -> Self {
        Self {
            page_number: meta.current_page.max(1),
            total_pages: meta.total_pages,
        }
    }

    pub fn has_more(&self) -> bool {
        self.page_number < self.total_pages
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query parameters for the notification collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub limit: u32,
    pub page: u32,
    pub sort_by: String,
    pub sort_direction: SortDirection,
}

impl PageQuery {
    pub fn newest(limit: u32, page: u32) -> Self {
        Self {
            limit,
            page,
            sort_by: "createdAt".to_string(),
            sort_direction: SortDirection::Desc,
        }
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("limit", self.limit.to_string()),
            ("page", self.page.to_string()),
            ("sortBy", self.sort_by.clone()),
            ("sortDirection", self.sort_direction.as_str().to_string()),
        ]
    }
}
