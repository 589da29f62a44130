//! Shared test doubles for the sync layer.
//!
//! - `MockNotificationApi`: canned pages keyed by `(limit, page)`, scripted
//!   failures, an optional gate that holds fetches in flight.
//! - `ScriptedTransport`: a push transport whose stream the test drives.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futures::channel::mpsc;
use tokio::sync::{watch, Semaphore};

use crate::api::NotificationApi;
use crate::channel::{PushEvent, PushStream, PushTransport};
use crate::error::{ConnectionError, FetchError};
use crate::model::{Notification, NotificationId, NotificationPage, PageMeta, PageQuery};

// ============================================================================
// Fixtures
// ============================================================================

/// Notification `id`; higher ids are newer.
pub fn notification(id: i64) -> Notification {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut payload = serde_json::Map::new();
    payload.insert("title".to_string(), serde_json::json!(format!("notification {id}")));
    Notification {
        id: NotificationId::Int(id),
        is_read: false,
        created_at: base + ChronoDuration::minutes(id),
        payload,
    }
}

pub fn page_of(ids: &[i64], current_page: u32, total_pages: u32) -> NotificationPage {
    NotificationPage {
        items: ids.iter().map(|id| notification(*id)).collect(),
        meta: PageMeta {
            current_page,
            total_pages,
            total_items: None,
            item_count: Some(ids.len() as u64),
        },
    }
}

pub fn int_ids(ids: &[NotificationId]) -> Vec<i64> {
    ids.iter()
        .map(|id| match id {
            NotificationId::Int(value) => *value,
            NotificationId::Text(value) => panic!("unexpected text id {value}"),
        })
        .collect()
}

// ============================================================================
// Mock REST API
// ============================================================================

#[derive(Default)]
pub struct MockNotificationApi {
    pages: Mutex<HashMap<(u32, u32), NotificationPage>>,
    failures: Mutex<VecDeque<FetchError>>,
    queries: Mutex<Vec<PageQuery>>,
    marked: Mutex<Vec<NotificationId>>,
    fetch_count: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockNotificationApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for a permit from `release`.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    pub fn set_page(&self, limit: u32, page: u32, response: NotificationPage) {
        self.pages.lock().unwrap().insert((limit, page), response);
    }

    pub fn fail_next(&self, error: FetchError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<PageQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn marked(&self) -> Vec<NotificationId> {
        self.marked.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationApi for MockNotificationApi {
    async fn fetch_page(&self, query: &PageQuery) -> Result<NotificationPage, FetchError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.pages
            .lock()
            .unwrap()
            .get(&(query.limit, query.page))
            .cloned()
            .ok_or_else(|| FetchError::Http {
                status: 404,
                message: format!("no page {} with limit {}", query.page, query.limit),
            })
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), FetchError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.marked.lock().unwrap().push(id.clone());
        Ok(())
    }
}

// ============================================================================
// Scripted push transport
// ============================================================================

type EventSender = mpsc::UnboundedSender<Result<PushEvent, ConnectionError>>;

#[derive(Default)]
struct ScriptState {
    failures_left: usize,
    attempts: usize,
    tokens: Vec<String>,
    last_event_ids: Vec<Option<String>>,
    sender: Option<EventSender>,
}

pub struct ScriptedTransport {
    state: Mutex<ScriptState>,
    connected: watch::Sender<usize>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(0);
        Self {
            state: Mutex::new(ScriptState::default()),
            connected,
        }
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().unwrap().failures_left = count;
    }

    /// Deliver an event on the live stream; dropped when disconnected.
    pub fn push(&self, event: PushEvent) {
        if let Some(sender) = &self.state.lock().unwrap().sender {
            let _ = sender.unbounded_send(Ok(event));
        }
    }

    pub fn push_error(&self, error: ConnectionError) {
        if let Some(sender) = &self.state.lock().unwrap().sender {
            let _ = sender.unbounded_send(Err(error));
        }
    }

    /// Close the live stream as if the server hung up.
    pub fn end_stream(&self) {
        self.state.lock().unwrap().sender = None;
    }

    pub async fn wait_connected(&self, count: usize) {
        let mut rx = self.connected.subscribe();
        rx.wait_for(|connected| *connected >= count)
            .await
            .expect("transport dropped");
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }

    pub fn last_event_ids(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().last_event_ids.clone()
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn connect(
        &self,
        access_token: &str,
        last_event_id: Option<&str>,
    ) -> Result<PushStream, ConnectionError> {
        let receiver = {
            let mut state = self.state.lock().unwrap();
            state.attempts += 1;
            if state.failures_left > 0 {
                state.failures_left -= 1;
                return Err(ConnectionError::Request("scripted failure".to_string()));
            }
            state.tokens.push(access_token.to_string());
            state.last_event_ids.push(last_event_id.map(str::to_string));
            let (sender, receiver) = mpsc::unbounded();
            state.sender = Some(sender);
            receiver
        };
        self.connected.send_modify(|connected| *connected += 1);
        Ok(Box::pin(receiver))
    }
}
