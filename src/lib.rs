//! Real-time notification sync.
//!
//! Keeps a client-side list of notifications in step with the server:
//! - `channel`: one authenticated push connection (SSE) with named-event
//!   subscriptions, reconnect with backoff, idempotent teardown
//! - `store`: paginated, unique-by-id notification collection
//! - `reconciler`: turns push events into delayed "fetch newest and merge"
//!   refreshes
//! - `session`: owns one of each for a single consumer
//!
//! # Flow
//!
//! Push event → reconciler (settle delay) → newest-page fetch →
//! `NotificationStore::merge_newest` → `SyncEvent` on the bus → consumer.

pub mod api;
pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod event_types;
pub mod model;
pub mod reconciler;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{HttpNotificationApi, NotificationApi};
pub use bus::{SyncBus, SyncEvent};
pub use channel::{EventChannel, PushEvent, PushTransport, SseTransport, Subscription};
pub use config::{CorrelationFilter, ReconnectConfig, SyncConfig};
pub use error::{ConnectionError, FetchError, ReconciliationError, SyncError};
pub use model::{Notification, NotificationId, NotificationPage, PageCursor, PageMeta, PageQuery};
pub use reconciler::{NotificationReconciler, ReconcilerConfig, ReconcilerHandle, ReconcilerStats};
pub use session::NotificationSession;
pub use store::{NotificationStore, PageLoad};

/// Install the fmt subscriber. `RUST_LOG` wins over the default filter.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("notification_sync=debug,info")),
        )
        .try_init();
}
