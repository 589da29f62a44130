use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Serialize;

use crate::api::NotificationApi;
use crate::error::{FetchError, SyncError};
use crate::model::{NotificationId, NotificationPage, PageQuery};

pub struct HttpNotificationApi {
    base_url: String,
    timeout_ms: u64,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadRequest {
    is_read: bool,
}

impl HttpNotificationApi {
    pub fn new(base_url: &str, access_token: &str, timeout: Duration) -> Result<Self, SyncError> {
        if base_url.trim().is_empty() {
            return Err(SyncError::Config("api base url cannot be empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", access_token.trim()))
            .map_err(|error| SyncError::Config(format!("invalid access token: {error}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| SyncError::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            timeout_ms: timeout.as_millis() as u64,
            client,
        })
    }

    fn map_send_error(&self, error: reqwest::Error) -> FetchError {
        if error.is_connect() {
            return FetchError::Request(format!(
                "could not reach notification API at {}: {error}",
                self.base_url
            ));
        }
        if error.is_timeout() {
            return FetchError::Timeout(format!(
                "notification API request timed out after {} ms",
                self.timeout_ms
            ));
        }
        FetchError::from(error)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(FetchError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn fetch_page(&self, query: &PageQuery) -> Result<NotificationPage, FetchError> {
        let endpoint = format!("{}/notifications", self.base_url);
        tracing::debug!(page = query.page, limit = query.limit, "fetching notifications");

        let response = self
            .client
            .get(&endpoint)
            .query(&query.to_params())
            .send()
            .await
            .map_err(|error| self.map_send_error(error))?;
        let response = Self::check_status(response).await?;

        let body = response.text().await.map_err(FetchError::from)?;
        serde_json::from_str::<NotificationPage>(&body).map_err(|error| {
            FetchError::InvalidResponse(format!("failed to parse notification page: {error}"))
        })
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), FetchError> {
        let endpoint = format!(
            "{}/notifications/{}",
            self.base_url,
            urlencoding::encode(&id.to_string())
        );
        tracing::debug!(%id, "marking notification read");

        let response = self
            .client
            .put(&endpoint)
            .json(&MarkReadRequest { is_read: true })
            .send()
            .await
            .map_err(|error| self.map_send_error(error))?;
        Self::check_status(response).await?;
        Ok(())
    }
}
