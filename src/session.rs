//! One consumer's notification session.
//!
//! The session owns the store, the push channel and the reconciler wiring
//! them together, and passes the store to the reconciler explicitly. Nothing
//! here is global: two sessions (two users, two tabs) never share state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::api::{HttpNotificationApi, NotificationApi};
use crate::bus::{SyncBus, SyncEvent};
use crate::channel::{EventChannel, PushTransport, SseTransport};
use crate::config::SyncConfig;
use crate::error::{FetchError, SyncError};
use crate::model::{Notification, NotificationId};
use crate::reconciler::{NotificationReconciler, ReconcilerConfig, ReconcilerHandle, ReconcilerStats};
use crate::store::{NotificationStore, PageLoad};

pub struct NotificationSession {
    store: Arc<NotificationStore>,
    bus: Arc<SyncBus>,
    channel: EventChannel,
    reconciler: ReconcilerHandle,
    closed: AtomicBool,
}

impl NotificationSession {
    /// Connect to the configured REST API and SSE push endpoint.
    pub async fn start(config: SyncConfig, access_token: &str) -> Result<Self, SyncError> {
        config.validate()?;
        if access_token.trim().is_empty() {
            return Err(SyncError::Config("access token cannot be empty".to_string()));
        }

        let api = Arc::new(HttpNotificationApi::new(
            &config.api_base_url,
            access_token,
            config.request_timeout(),
        )?);
        let transport = Arc::new(SseTransport::new(&config.push_url, config.request_timeout())?);
        Ok(Self::with_parts(&config, api, transport, access_token).await)
    }

    /// Build a session over any API and push transport. Loads the first page;
    /// a failure there is logged and left for `load_next_page` to retry.
    pub async fn with_parts(
        config: &SyncConfig,
        api: Arc<dyn NotificationApi>,
        transport: Arc<dyn PushTransport>,
        access_token: &str,
    ) -> Self {
        let bus = Arc::new(SyncBus::new());
        let store = Arc::new(NotificationStore::new(api.clone(), config, bus.clone()));
        let channel = EventChannel::connect(transport, access_token, config.reconnect.clone());
        let reconciler =
            NotificationReconciler::new(store.clone(), api, ReconcilerConfig::from(config))
                .attach(&channel);

        if let Err(error) = store.load_next_page().await {
            warn!(%error, "initial notification load failed");
        }
        info!(loaded = store.len(), "notification session started");

        Self {
            store,
            bus,
            channel,
            reconciler,
            closed: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<SyncEvent> {
        self.bus.subscribe()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.store.snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    pub async fn load_next_page(&self) -> Result<PageLoad, FetchError> {
        self.store.load_next_page().await
    }

    pub async fn acknowledge(&self, id: &NotificationId) -> Result<bool, FetchError> {
        self.store.acknowledge(id).await
    }

    pub fn reconciler_stats(&self) -> ReconcilerStats {
        self.reconciler.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Detach the reconciler and tear down the channel. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reconciler.detach();
        self.channel.teardown();
        info!("notification session closed");
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
