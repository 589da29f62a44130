//! Change feed for consumers of the sync layer.
//!
//! The store publishes one `SyncEvent` per collection change (page loaded,
//! newest items merged, item marked read). Consumers (a view layer, the
//! `notification-feed` binary) subscribe and re-read the store snapshot.

mod event_bus;

pub use event_bus::{SyncBus, SyncEvent};

pub const KIND_PAGE_LOADED: &str = "page_loaded";
pub const KIND_MERGED: &str = "merged";
pub const KIND_MARKED_READ: &str = "marked_read";
