//! Event Channel: one authenticated push connection and its subscribers.
//!
//! `EventChannel::connect` spawns a loop that owns the connection:
//! connect → read events → dispatch to subscribers → on error or stream end,
//! back off and reconnect. Connection transitions are only logged. Events that
//! arrive while disconnected are lost; subscribers treat every event as a
//! "go re-check" hint.
//!
//! `teardown` is idempotent. Once it returns no handler starts again, and the
//! shutdown signal handed out by `shutdown_signal` has fired so dependents can
//! cancel their own pending work.

mod registry;
pub mod sse;
pub mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ReconnectConfig, SyncConfig};
use crate::error::SyncError;

use registry::SubscriptionRegistry;
pub use registry::{EventHandler, Subscription, SubscriptionId};
pub use transport::{PushEvent, PushStream, PushTransport, SseTransport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub connects: u64,
    pub disconnects: u64,
    pub events_received: u64,
}

#[derive(Default)]
struct StatCounters {
    connects: AtomicU64,
    disconnects: AtomicU64,
    events_received: AtomicU64,
}

struct ChannelInner {
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<StatCounters>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelInner {
    fn teardown(&self) {
        let already_closed = self.shutdown_tx.send_replace(true);
        let removed = self.registry.close();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        if !already_closed {
            info!(removed_handlers = removed, "push channel torn down");
        }
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Cheap to clone; all clones share one connection. The connection is torn
/// down on `teardown` or when the last clone is dropped.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    /// Start the connection loop. Must be called inside a Tokio runtime.
    /// Never fails: connection errors are retried by the loop.
    pub fn connect(
        transport: Arc<dyn PushTransport>,
        access_token: impl Into<String>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let registry = Arc::new(SubscriptionRegistry::default());
        let counters = Arc::new(StatCounters::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_connection(
            transport,
            access_token.into(),
            reconnect,
            registry.clone(),
            counters.clone(),
            shutdown_rx,
        ));

        Self {
            inner: Arc::new(ChannelInner {
                registry,
                counters,
                shutdown_tx,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Connect over SSE using the push URL and reconnect policy from `config`.
    pub fn connect_sse(config: &SyncConfig, access_token: &str) -> Result<Self, SyncError> {
        let transport = SseTransport::new(&config.push_url, config.request_timeout())?;
        Ok(Self::connect(
            Arc::new(transport),
            access_token,
            config.reconnect.clone(),
        ))
    }

    pub fn subscribe<F>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let subscription = self.inner.registry.add(event_type.into(), Arc::new(handler));
        debug!(event_type = subscription.event_type(), "subscribed");
        subscription
    }

    /// Remove one handler. Unknown or already-removed handles are ignored.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.inner.registry.remove(subscription.id())
    }

    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Flips to `true` on teardown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// A handle that does not keep the connection alive.
    pub fn downgrade(&self) -> WeakEventChannel {
        WeakEventChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn stats(&self) -> ChannelStats {
        let counters = &self.inner.counters;
        ChannelStats {
            connects: counters.connects.load(Ordering::Relaxed),
            disconnects: counters.disconnects.load(Ordering::Relaxed),
            events_received: counters.events_received.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub struct WeakEventChannel {
    inner: Weak<ChannelInner>,
}

impl WeakEventChannel {
    pub fn upgrade(&self) -> Option<EventChannel> {
        self.inner.upgrade().map(|inner| EventChannel { inner })
    }
}

async fn run_connection(
    transport: Arc<dyn PushTransport>,
    access_token: String,
    reconnect: ReconnectConfig,
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<StatCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    let mut last_event_id: Option<String> = None;

    loop {
        if *shutdown.borrow() {
            return;
        }

        let connected = tokio::select! {
            _ = shutdown.changed() => return,
            result = transport.connect(&access_token, last_event_id.as_deref()) => result,
        };

        match connected {
            Ok(mut stream) => {
                counters.connects.fetch_add(1, Ordering::Relaxed);
                info!("push channel connected");
                attempt = 0;

                loop {
                    let next = tokio::select! {
                        _ = shutdown.changed() => return,
                        next = stream.next() => next,
                    };
                    match next {
                        Some(Ok(event)) => {
                            counters.events_received.fetch_add(1, Ordering::Relaxed);
                            if let Some(id) = &event.id {
                                last_event_id = Some(id.clone());
                            }
                            let invoked = registry.dispatch(&event);
                            debug!(event_type = %event.event_type, invoked, "push event received");
                        }
                        Some(Err(error)) => {
                            warn!(%error, "push channel disconnected");
                            break;
                        }
                        None => {
                            info!("push channel disconnected: stream ended");
                            break;
                        }
                    }
                }
                counters.disconnects.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) if error.is_permanent() => {
                error!(%error, "push channel cannot connect, giving up");
                return;
            }
            Err(error) => {
                warn!(%error, attempt, "push channel connection error");
            }
        }

        if let Some(max_attempts) = reconnect.max_attempts {
            if attempt >= max_attempts {
                error!(attempt, "push channel exceeded reconnect attempts");
                return;
            }
        }

        let delay = with_jitter(reconnect.backoff(attempt));
        attempt = attempt.saturating_add(1);
        debug!(?delay, attempt, "push channel reconnecting");

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Up to 25% extra so many clients do not reconnect in lockstep.
fn with_jitter(delay: Duration) -> Duration {
    let max_extra = (delay.as_millis() / 4) as u64;
    if max_extra == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_extra))
}
