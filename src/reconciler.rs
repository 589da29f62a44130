//! Notification Reconciler.
//!
//! Push events carry no authoritative state and may arrive before the REST
//! read path reflects the write behind them. For each whitelisted event the
//! reconciler waits a settle delay, fetches the newest small page and folds it
//! into the store with `merge_newest`. Every event gets its own settle task;
//! rapid repeats are not coalesced, which only costs extra fetches because the
//! merge is idempotent.
//!
//! Failed refreshes are logged and counted, never returned: the next event or
//! the next successful fetch heals the collection. Settle tasks are tracked and
//! cancelled on `detach` and on channel teardown. The stop flag is re-read
//! with the store locked, so no merge starts after either signal. `detach`
//! also waits out a merge already holding the lock; channel teardown only
//! signals, so such a merge may finish concurrently with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::api::NotificationApi;
use crate::channel::{EventChannel, PushEvent, Subscription, WeakEventChannel};
use crate::config::{CorrelationFilter, SyncConfig};
use crate::error::ReconciliationError;
use crate::event_types::is_failure_event;
use crate::model::PageQuery;
use crate::store::NotificationStore;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub settle_delay: Duration,
    pub latest_query: PageQuery,
    pub event_types: Vec<String>,
    pub correlation: Option<CorrelationFilter>,
}

impl From<&SyncConfig> for ReconcilerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            latest_query: config.latest_query(),
            event_types: config
                .event_types
                .iter()
                .map(|event| event.trim().to_string())
                .filter(|event| !event.is_empty())
                .collect(),
            correlation: config.correlation.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    pub scheduled: u64,
    /// Events dropped by the correlation filter.
    pub ignored: u64,
    /// Refreshes that completed, whether or not they added anything.
    pub refreshed: u64,
    pub merged_items: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    ignored: AtomicU64,
    refreshed: AtomicU64,
    merged_items: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

struct Shared {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationApi>,
    config: ReconcilerConfig,
    runtime: Handle,
    shutdown: watch::Receiver<bool>,
    detached: AtomicBool,
    pending: Mutex<HashMap<u64, AbortHandle>>,
    next_task: AtomicU64,
    counters: Counters,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.detached.load(Ordering::SeqCst) || *self.shutdown.borrow()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, AbortHandle>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_event(self: &Arc<Self>, event: &PushEvent) {
        if self.is_stopped() {
            return;
        }
        if let Some(filter) = &self.config.correlation {
            if !correlation_matches(filter, &event.data) {
                self.counters.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(event_type = %event.event_type, key = %filter.key, "push event not for this consumer");
                return;
            }
        }

        if is_failure_event(&event.event_type) {
            warn!(event_type = %event.event_type, data = %event.data, "server reported a failed job");
        } else {
            info!(event_type = %event.event_type, "push event received, scheduling refresh");
        }
        self.schedule_refresh();
    }

    fn schedule_refresh(self: &Arc<Self>) {
        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);

        let this = self.clone();
        let mut shutdown = self.shutdown.clone();
        // Held across the spawn so a fast task cannot finish before it is tracked.
        let mut pending = self.pending();
        let task = self.runtime.spawn(async move {
            let outcome = tokio::select! {
                _ = shutdown.wait_for(|closed| *closed) => Err(ReconciliationError::Cancelled),
                outcome = this.settle_and_refresh() => outcome,
            };
            this.finish(task_id, outcome);
        });
        pending.insert(task_id, task.abort_handle());
    }

    async fn settle_and_refresh(&self) -> Result<usize, ReconciliationError> {
        tokio::time::sleep(self.config.settle_delay).await;
        if self.is_stopped() {
            return Err(ReconciliationError::Cancelled);
        }
        debug!("fetching newest notifications");
        let page = self.api.fetch_page(&self.config.latest_query).await?;
        self.store
            .merge_newest_unless(page.items, || self.is_stopped())
            .ok_or(ReconciliationError::Cancelled)
    }

    fn finish(&self, task_id: u64, outcome: Result<usize, ReconciliationError>) {
        self.pending().remove(&task_id);
        match outcome {
            Ok(added) => {
                self.counters.refreshed.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .merged_items
                    .fetch_add(added as u64, Ordering::Relaxed);
                debug!(added, "refresh after push event merged");
            }
            Err(ReconciliationError::Cancelled) => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("refresh cancelled");
            }
            Err(error) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%error, "failed to fetch the latest notifications");
            }
        }
    }

    fn abort_pending(&self) -> usize {
        let tasks: Vec<AbortHandle> = self.pending().drain().map(|(_, task)| task).collect();
        for task in &tasks {
            task.abort();
        }
        self.counters
            .cancelled
            .fetch_add(tasks.len() as u64, Ordering::Relaxed);
        tasks.len()
    }
}

/// Numbers and numeric strings compare equal (`7 == "7"`).
fn correlation_matches(filter: &CorrelationFilter, data: &serde_json::Value) -> bool {
    let Some(value) = data.get(&filter.key) else {
        return false;
    };
    value == &filter.value || loose_key(value) == loose_key(&filter.value)
}

fn loose_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

pub struct NotificationReconciler {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationApi>,
    config: ReconcilerConfig,
}

impl NotificationReconciler {
    pub fn new(
        store: Arc<NotificationStore>,
        api: Arc<dyn NotificationApi>,
        config: ReconcilerConfig,
    ) -> Self {
        Self { store, api, config }
    }

    /// Subscribe to every whitelisted event type on `channel`. Must be called
    /// inside a Tokio runtime; settle tasks are spawned onto it.
    pub fn attach(self, channel: &EventChannel) -> ReconcilerHandle {
        let shared = Arc::new(Shared {
            store: self.store,
            api: self.api,
            runtime: Handle::current(),
            shutdown: channel.shutdown_signal(),
            detached: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            next_task: AtomicU64::new(0),
            counters: Counters::default(),
            config: self.config,
        });

        let subscriptions = shared
            .config
            .event_types
            .iter()
            .map(|event_type| {
                let handler_state = shared.clone();
                channel.subscribe(event_type.clone(), move |event: &PushEvent| {
                    handler_state.on_event(event)
                })
            })
            .collect();

        info!(
            event_types = shared.config.event_types.len(),
            settle_ms = shared.config.settle_delay.as_millis() as u64,
            "reconciler attached"
        );

        ReconcilerHandle {
            shared,
            channel: channel.downgrade(),
            subscriptions: Mutex::new(subscriptions),
        }
    }
}

/// Owns the reconciler's subscriptions and settle tasks. Detaches on drop.
pub struct ReconcilerHandle {
    shared: Arc<Shared>,
    channel: WeakEventChannel,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ReconcilerHandle {
    /// Unsubscribe and cancel pending settle tasks. Idempotent.
    pub fn detach(&self) {
        if self.shared.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscriptions: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        if let Some(channel) = self.channel.upgrade() {
            for subscription in &subscriptions {
                channel.unsubscribe(subscription);
            }
        }
        let cancelled = self.shared.abort_pending();
        // A task already past its stop check finishes its merge before this returns.
        self.shared.store.quiesce();
        info!(cancelled, "reconciler detached");
    }

    pub fn is_detached(&self) -> bool {
        self.shared.detached.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }

    pub fn stats(&self) -> ReconcilerStats {
        let counters = &self.shared.counters;
        ReconcilerStats {
            scheduled: counters.scheduled.load(Ordering::Relaxed),
            ignored: counters.ignored.load(Ordering::Relaxed),
            refreshed: counters.refreshed.load(Ordering::Relaxed),
            merged_items: counters.merged_items.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
