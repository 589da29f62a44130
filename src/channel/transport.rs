//! Push transports.
//!
//! A transport only knows how to open one authenticated event stream. Retry,
//! backoff and dispatch live in the channel loop, so every transport gets the
//! same reconnect behaviour.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::sse::{SseDecoder, SseEvent};
use crate::error::{ConnectionError, SyncError};

/// A server-pushed event. `data` is a hint, never authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub event_type: String,
    pub data: serde_json::Value,
    pub id: Option<String>,
}

impl PushEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            id: None,
        }
    }
}

impl From<SseEvent> for PushEvent {
    fn from(event: SseEvent) -> Self {
        let data = serde_json::from_str(&event.data)
            .unwrap_or(serde_json::Value::String(event.data));
        Self {
            event_type: event.event_type,
            data,
            id: event.id,
        }
    }
}

pub type PushStream = Pin<Box<dyn Stream<Item = Result<PushEvent, ConnectionError>> + Send>>;

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open one event stream. The stream ending or yielding an error means
    /// the connection is gone.
    async fn connect(
        &self,
        access_token: &str,
        last_event_id: Option<&str>,
    ) -> Result<PushStream, ConnectionError>;
}

/// Server-Sent Events over a long-lived HTTP GET.
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
}

impl SseTransport {
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, SyncError> {
        if url.trim().is_empty() {
            return Err(SyncError::Config("push url cannot be empty".to_string()));
        }
        // No total timeout: the stream is expected to stay open indefinitely.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|error| SyncError::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            client,
            url: url.trim().to_string(),
        })
    }

    fn headers(
        access_token: &str,
        last_event_id: Option<&str>,
    ) -> Result<HeaderMap, ConnectionError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", access_token.trim()))
            .map_err(|error| ConnectionError::InvalidToken(error.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        if let Some(id) = last_event_id {
            if let Ok(value) = HeaderValue::from_str(id) {
                headers.insert("Last-Event-ID", value);
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn connect(
        &self,
        access_token: &str,
        last_event_id: Option<&str>,
    ) -> Result<PushStream, ConnectionError> {
        let headers = Self::headers(access_token, last_event_id)?;

        let response = self
            .client
            .get(&self.url)
            .headers(headers)
            .send()
            .await
            .map_err(|error| ConnectionError::Request(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(ConnectionError::Http {
                status: status.as_u16(),
                message,
            });
        }

        info!("connected to push stream at {}", self.url);

        let mut decoder = SseDecoder::default();
        let events = response.bytes_stream().flat_map(move |chunk| {
            let items: Vec<Result<PushEvent, ConnectionError>> = match chunk {
                Ok(bytes) => match decoder.push(&bytes) {
                    Ok(events) => events
                        .into_iter()
                        .map(|event| Ok(PushEvent::from(event)))
                        .collect(),
                    Err(error) => vec![Err(error)],
                },
                Err(error) => vec![Err(ConnectionError::Stream(error.to_string()))],
            };
            futures::stream::iter(items)
        });

        Ok(Box::pin(events))
    }
}
