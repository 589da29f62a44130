//! Paginated Collection Store.
//!
//! Holds the notifications loaded so far (server order, newest first, unique
//! by id) and the page cursor from the latest page fetch. Page loads append;
//! `merge_newest` prepends out-of-band items. State lives behind a mutex that
//! is never held across an await; page loads are serialised by an in-flight
//! flag so overlapping calls coalesce instead of queueing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tracing::{debug, warn};

use crate::api::NotificationApi;
use crate::bus::{SyncBus, KIND_MARKED_READ, KIND_MERGED, KIND_PAGE_LOADED};
use crate::config::SyncConfig;
use crate::error::FetchError;
use crate::model::{Notification, NotificationId, PageCursor, PageQuery};

/// Result of a page-load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    Loaded { page: u32, added: usize },
    /// Another load was running; nothing was fetched.
    InFlight,
    /// The latest metadata says there are no more pages.
    Exhausted,
}

#[derive(Default)]
struct CollectionState {
    items: Vec<Notification>,
    cursor: Option<PageCursor>,
}

/// Releases the in-flight flag when the load finishes or is dropped mid-await.
struct LoadGuard<'a>(&'a AtomicBool);

impl<'a> LoadGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    page_query: PageQuery,
    state: Mutex<CollectionState>,
    loading: AtomicBool,
    bus: Arc<SyncBus>,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>, config: &SyncConfig, bus: Arc<SyncBus>) -> Self {
        Self {
            api,
            page_query: config.page_query(1),
            state: Mutex::new(CollectionState::default()),
            loading: AtomicBool::new(false),
            bus,
        }
    }

    /// Fetch page `page` (1-indexed) and append the items not already held.
    /// Returns `InFlight` without fetching if another load is running.
    pub async fn load_page(&self, page: u32) -> Result<PageLoad, FetchError> {
        let Some(_guard) = LoadGuard::acquire(&self.loading) else {
            debug!(page, "page load already in flight");
            return Ok(PageLoad::InFlight);
        };
        self.fetch_and_append(page.max(1)).await
    }

    /// Load the page after the cursor, or page 1 when nothing is loaded yet.
    pub async fn load_next_page(&self) -> Result<PageLoad, FetchError> {
        let Some(_guard) = LoadGuard::acquire(&self.loading) else {
            debug!("page load already in flight");
            return Ok(PageLoad::InFlight);
        };
        let next = match self.cursor() {
            Some(cursor) if !cursor.has_more() => return Ok(PageLoad::Exhausted),
            Some(cursor) => cursor.page_number + 1,
            None => 1,
        };
        self.fetch_and_append(next).await
    }

    async fn fetch_and_append(&self, page: u32) -> Result<PageLoad, FetchError> {
        let query = PageQuery {
            page,
            ..self.page_query.clone()
        };
        let fetched = self.api.fetch_page(&query).await.map_err(|error| {
            warn!(page, %error, "failed to load notification page");
            error
        })?;

        let cursor = PageCursor::from_meta(&fetched.meta);
        let added = {
            let mut state = self.lock_state();
            let mut seen: HashSet<NotificationId> =
                state.items.iter().map(|item| item.id.clone()).collect();
            let before = state.items.len();
            for item in fetched.items {
                if seen.insert(item.id.clone()) {
                    state.items.push(item);
                }
            }
            state.cursor = Some(cursor);
            state.items.len() - before
        };

        debug!(
            page = cursor.page_number,
            total_pages = cursor.total_pages,
            added,
            "notification page loaded"
        );
        self.bus.emit(
            KIND_PAGE_LOADED,
            json!({
                "page": cursor.page_number,
                "totalPages": cursor.total_pages,
                "added": added,
                "hasMore": cursor.has_more(),
            }),
        );
        Ok(PageLoad::Loaded {
            page: cursor.page_number,
            added,
        })
    }

    /// Prepend the items not already held, keeping their relative order.
    /// The cursor is untouched. Returns how many items were added.
    pub fn merge_newest(&self, items: Vec<Notification>) -> usize {
        self.merge_newest_unless(items, || false).unwrap_or(0)
    }

    /// `merge_newest`, skipped when `stopped` returns true. `stopped` runs
    /// with the collection locked, so a stop signalled before `quiesce`
    /// returns can never be followed by this merge. `None` means skipped.
    pub fn merge_newest_unless<F>(&self, items: Vec<Notification>, stopped: F) -> Option<usize>
    where
        F: FnOnce() -> bool,
    {
        let added_ids: Vec<NotificationId> = {
            let mut state = self.lock_state();
            if stopped() {
                return None;
            }
            let mut seen: HashSet<NotificationId> =
                state.items.iter().map(|item| item.id.clone()).collect();
            let fresh: Vec<Notification> = items
                .into_iter()
                .filter(|item| seen.insert(item.id.clone()))
                .collect();
            let ids = fresh.iter().map(|item| item.id.clone()).collect();
            state.items.splice(0..0, fresh);
            ids
        };

        if !added_ids.is_empty() {
            debug!(added = added_ids.len(), "merged newest notifications");
            self.bus.emit(
                KIND_MERGED,
                json!({ "added": added_ids.len(), "ids": added_ids }),
            );
        }
        Some(added_ids.len())
    }

    /// Wait out any merge currently holding the collection lock.
    pub fn quiesce(&self) {
        drop(self.lock_state());
    }

    /// Local read flag update. Returns whether the item is held.
    pub fn mark_read(&self, id: &NotificationId) -> bool {
        let changed = {
            let mut state = self.lock_state();
            match state.items.iter_mut().find(|item| &item.id == id) {
                Some(item) if !item.is_read => {
                    item.is_read = true;
                    Some(true)
                }
                Some(_) => Some(false),
                None => None,
            }
        };

        if changed == Some(true) {
            self.bus.emit(KIND_MARKED_READ, json!({ "id": id }));
        }
        changed.is_some()
    }

    /// Tell the server the item was read, then mark it locally. Items already
    /// read locally are skipped. Returns whether a request was sent.
    pub async fn acknowledge(&self, id: &NotificationId) -> Result<bool, FetchError> {
        let already_read = self
            .lock_state()
            .items
            .iter()
            .any(|item| &item.id == id && item.is_read);
        if already_read {
            return Ok(false);
        }

        self.api.mark_read(id).await?;
        self.mark_read(id);
        Ok(true)
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock_state().items.clone()
    }

    pub fn ids(&self) -> Vec<NotificationId> {
        self.lock_state()
            .items
            .iter()
            .map(|item| item.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unread_count(&self) -> usize {
        self.lock_state()
            .items
            .iter()
            .filter(|item| !item.is_read)
            .count()
    }

    pub fn cursor(&self) -> Option<PageCursor> {
        self.lock_state().cursor
    }

    /// True until a page fetch reports the last page.
    pub fn has_more(&self) -> bool {
        self.cursor().map_or(true, |cursor| cursor.has_more())
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> MutexGuard<'_, CollectionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
