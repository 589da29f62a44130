//! REST side of the sync layer.
//!
//! `NotificationApi` is the seam between the store/reconciler and the server:
//! production code uses `HttpNotificationApi`, tests swap in an in-memory
//! implementation.

mod http;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::model::{NotificationId, NotificationPage, PageQuery};

pub use http::HttpNotificationApi;

#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// `GET /notifications` with paging and sort parameters.
    async fn fetch_page(&self, query: &PageQuery) -> Result<NotificationPage, FetchError>;

    /// `PUT /notifications/{id}` with `{ "isRead": true }`.
    async fn mark_read(&self, id: &NotificationId) -> Result<(), FetchError>;
}
