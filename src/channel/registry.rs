use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::transport::PushEvent;

pub type EventHandler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handle returned by `EventChannel::subscribe`. Pass it back to
/// `unsubscribe`; dropping it keeps the handler registered.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    event_type: String,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

struct Entry {
    id: SubscriptionId,
    event_type: String,
    handler: EventHandler,
}

/// Handlers in registration order. The lock is never held while a handler
/// runs, so handlers may subscribe, unsubscribe or tear the channel down.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SubscriptionRegistry {
    pub fn add(&self, event_type: String, handler: EventHandler) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if !self.closed.load(Ordering::SeqCst) {
            let mut entries = lock(&self.entries);
            // Re-checked under the lock so a concurrent close cannot miss it.
            if !self.closed.load(Ordering::SeqCst) {
                entries.push(Entry {
                    id,
                    event_type: event_type.clone(),
                    handler,
                });
            }
        }
        Subscription { id, event_type }
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Drop every handler and refuse new ones. Returns how many were removed.
    pub fn close(&self) -> usize {
        let mut entries = lock(&self.entries);
        self.closed.store(true, Ordering::SeqCst);
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    fn is_registered(&self, id: SubscriptionId) -> bool {
        lock(&self.entries).iter().any(|entry| entry.id == id)
    }

    /// Invoke each matching handler once, in registration order. A handler
    /// removed by an earlier handler in the same dispatch is skipped.
    pub fn dispatch(&self, event: &PushEvent) -> usize {
        let matching: Vec<(SubscriptionId, EventHandler)> = lock(&self.entries)
            .iter()
            .filter(|entry| entry.event_type == event.event_type)
            .map(|entry| (entry.id, entry.handler.clone()))
            .collect();

        let mut invoked = 0;
        for (id, handler) in matching {
            if self.is_closed() || !self.is_registered(id) {
                continue;
            }
            handler(event);
            invoked += 1;
        }
        invoked
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
