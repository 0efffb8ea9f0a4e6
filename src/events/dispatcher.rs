//! Single-slot listener registration and synchronous dispatch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::LifecycleEvent;

type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

struct Slot {
    id: u64,
    listener: Listener,
}

struct DispatcherInner {
    slot: RwLock<Option<Slot>>,
    next_id: AtomicU64,
    dispatched: AtomicU64,
    failures: AtomicU64,
}

/// Delivers lifecycle events to at most one listener.
///
/// Cloning is cheap; all clones share the same listener slot. The engine and
/// the caller each hold a clone, so there is no process-wide state.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                slot: RwLock::new(None),
                next_id: AtomicU64::new(1),
                dispatched: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Installs `listener` as the only active listener, replacing any
    /// previous one.
    ///
    /// The listener runs synchronously on whichever engine worker thread
    /// produced the event. It must return quickly and must not call back
    /// into the engine, or it will stall (or deadlock) that worker.
    ///
    /// Install before submitting the work whose events you want to see: a
    /// dispatch racing with installation may observe either listener.
    pub fn set_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.write_slot().replace(Slot {
            id,
            listener: Arc::new(listener),
        });

        tracing::debug!(
            listener = id,
            replaced = previous.as_ref().map(|s| s.id),
            "pool listener installed"
        );

        ListenerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Removes whichever listener is installed.
    pub fn clear(&self) {
        if let Some(slot) = self.write_slot().take() {
            tracing::debug!(listener = slot.id, "pool listener cleared");
        }
    }

    /// Returns true if a listener is installed.
    pub fn has_listener(&self) -> bool {
        self.inner
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Delivers `event` to the installed listener on the calling thread.
    ///
    /// A panicking listener is contained here and logged; the caller's
    /// transition is never affected.
    pub fn dispatch(&self, event: &LifecycleEvent) {
        // Clone out of the lock so a listener may replace itself
        let listener = {
            let slot = self
                .inner
                .slot
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(slot) => Arc::clone(&slot.listener),
                None => return,
            }
        };

        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
            self.inner.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                category = %event.category(),
                kind = %event.kind(),
                resource = event.resource().unwrap_or("<global>"),
                error = panic_message(payload.as_ref()),
                "pool listener panicked"
            );
        }
    }

    /// Number of events handed to a listener.
    pub fn dispatched(&self) -> u64 {
        self.inner.dispatched.load(Ordering::Relaxed)
    }

    /// Number of listener invocations that panicked.
    pub fn listener_failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    fn write_slot(&self) -> std::sync::RwLockWriteGuard<'_, Option<Slot>> {
        self.inner
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("has_listener", &self.has_listener())
            .field("dispatched", &self.dispatched())
            .field("listener_failures", &self.listener_failures())
            .finish()
    }
}

/// Registration returned by [`EventDispatcher::set_listener`].
///
/// Dropping the handle leaves the listener installed; call
/// [`revoke`](Self::revoke) to remove it.
#[derive(Debug)]
#[must_use = "dropping the handle keeps the listener installed"]
pub struct ListenerHandle {
    id: u64,
    inner: Weak<DispatcherInner>,
}

impl ListenerHandle {
    /// Registration id, unique per dispatcher.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True while this registration is the installed listener.
    pub fn is_active(&self) -> bool {
        self.inner.upgrade().is_some_and(|inner| {
            inner
                .slot
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|slot| slot.id == self.id)
        })
    }

    /// Removes the listener if it is still the installed one.
    ///
    /// Returns false if it was already replaced or the dispatcher is gone.
    pub fn revoke(self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut slot = inner.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|s| s.id == self.id) {
            *slot = None;
            tracing::debug!(listener = self.id, "pool listener revoked");
            true
        } else {
            false
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, ResourceCategory};
    use std::sync::Mutex;

    fn event(resource: &str, kind: EventKind) -> LifecycleEvent {
        LifecycleEvent::new(ResourceCategory::Writer, kind, Some(Arc::from(resource)))
    }

    #[test]
    fn test_dispatch_without_listener_is_noop() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch(&event("trades", EventKind::Acquire));
        assert_eq!(dispatcher.dispatched(), 0);
        assert!(!dispatcher.has_listener());
    }

    #[test]
    fn test_delivers_on_calling_thread_in_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _handle = dispatcher.set_listener(move |e| {
            assert_eq!(e.thread(), std::thread::current().id());
            sink.lock().unwrap().push(e.kind());
        });

        let producer = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                for kind in [EventKind::Create, EventKind::Acquire, EventKind::Release] {
                    dispatcher.dispatch(&event("trades", kind));
                }
            })
        };
        producer.join().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::Create, EventKind::Acquire, EventKind::Release]
        );
        assert_eq!(dispatcher.dispatched(), 3);
    }

    #[test]
    fn test_replacement_silences_previous_listener() {
        let dispatcher = EventDispatcher::new();
        let old_hits = Arc::new(AtomicU64::new(0));
        let new_hits = Arc::new(AtomicU64::new(0));

        let hits = Arc::clone(&old_hits);
        let old = dispatcher.set_listener(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.dispatch(&event("trades", EventKind::Acquire));

        let hits = Arc::clone(&new_hits);
        let new = dispatcher.set_listener(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.dispatch(&event("trades", EventKind::Release));
        dispatcher.dispatch(&event("trades", EventKind::Acquire));

        assert_eq!(old_hits.load(Ordering::SeqCst), 1);
        assert_eq!(new_hits.load(Ordering::SeqCst), 2);
        assert!(!old.is_active());
        assert!(new.is_active());

        // Stale handle must not remove the successor
        assert!(!old.revoke());
        assert!(dispatcher.has_listener());
        assert!(new.revoke());
        assert!(!dispatcher.has_listener());
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let dispatcher = EventDispatcher::new();
        let _handle = dispatcher.set_listener(|e| {
            if e.kind() == EventKind::Release {
                panic!("listener bug");
            }
        });

        let producer = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                dispatcher.dispatch(&event("trades", EventKind::Release));
                // The producer carries on with its transition
                dispatcher.dispatch(&event("trades", EventKind::Acquire));
                "transition finished"
            })
        };

        assert_eq!(producer.join().unwrap(), "transition finished");
        assert_eq!(dispatcher.listener_failures(), 1);
        assert_eq!(dispatcher.dispatched(), 2);
    }

    #[test]
    fn test_listener_may_replace_itself() {
        let dispatcher = EventDispatcher::new();
        let inner = dispatcher.clone();
        let _handle = dispatcher.set_listener(move |_| {
            inner.clear();
        });

        dispatcher.dispatch(&event("trades", EventKind::Release));
        assert!(!dispatcher.has_listener());
    }

    #[test]
    fn test_revoke_after_dispatcher_dropped() {
        let dispatcher = EventDispatcher::new();
        let handle = dispatcher.set_listener(|_| {});
        drop(dispatcher);
        assert!(!handle.is_active());
        assert!(!handle.revoke());
    }
}
