//! The immediate prioritized event dispatcher.
//!
//! Handlers are registered per event type with an `i32` priority and run in
//! descending priority order (ties run in registration order). Dispatch
//! snapshots the handler list before invoking anything, so handlers may
//! freely add or remove handlers and re-dispatch events from inside a
//! running handler: structural changes apply to the next dispatch, nested
//! dispatches run to completion before returning.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Flow control returned by cancellable handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Keep dispatching to lower-priority handlers.
    Continue,
    /// Stop dispatching this event.
    Stop,
}

/// Identifier of a registered handler, used for removal.
pub type HandlerId = u64;

struct Entry<E> {
    id: HandlerId,
    priority: i32,
    once: bool,
    spent: Arc<AtomicBool>,
    callback: Arc<dyn Fn(&E) -> EventOutcome + Send + Sync>,
}

impl<E> Clone for Entry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            priority: self.priority,
            once: self.once,
            spent: self.spent.clone(),
            callback: self.callback.clone(),
        }
    }
}

/// Handlers for one event type, sorted by descending priority, then
/// registration order.
struct HandlerList<E> {
    entries: Vec<Entry<E>>,
}

impl<E> Default for HandlerList<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E: 'static> HandlerList<E> {
    fn insert(&mut self, entry: Entry<E>) {
        let pos = self
            .entries
            .partition_point(|existing| existing.priority >= entry.priority);
        self.entries.insert(pos, entry);
    }
}

#[derive(Default)]
struct Inner {
    /// `TypeId` of the event type to its `HandlerList<E>`.
    lists: HashMap<TypeId, Box<dyn Any + Send>>,
    next_id: HandlerId,
}

impl Inner {
    fn list_mut<E: 'static>(&mut self) -> &mut HandlerList<E> {
        self.lists
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(HandlerList::<E>::default()))
            .downcast_mut()
            .expect("handler list type mismatch")
    }
}

/// Dispatches typed events synchronously to prioritized handlers.
#[derive(Default)]
pub struct EventDispatcher {
    inner: Mutex<Inner>,
}

impl EventDispatcher {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_entry<E: 'static>(
        &self,
        priority: i32,
        once: bool,
        callback: Arc<dyn Fn(&E) -> EventOutcome + Send + Sync>,
    ) -> HandlerId {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.list_mut::<E>().insert(Entry {
            id,
            priority,
            once,
            spent: Arc::new(AtomicBool::new(false)),
            callback,
        });
        id
    }

    /// Registers a handler for events of type `E`.
    pub fn add_handler<E: 'static>(
        &self,
        priority: i32,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> HandlerId {
        self.add_entry(
            priority,
            false,
            Arc::new(move |event: &E| {
                handler(event);
                EventOutcome::Continue
            }),
        )
    }

    /// Registers a handler whose return value can stop cancellable dispatch.
    pub fn add_cancellable_handler<E: 'static>(
        &self,
        priority: i32,
        handler: impl Fn(&E) -> EventOutcome + Send + Sync + 'static,
    ) -> HandlerId {
        self.add_entry(priority, false, Arc::new(handler))
    }

    /// Registers a handler that is removed after its first invocation.
    pub fn add_one_time_handler<E: 'static>(
        &self,
        priority: i32,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> HandlerId {
        self.add_entry(
            priority,
            true,
            Arc::new(move |event: &E| {
                handler(event);
                EventOutcome::Continue
            }),
        )
    }

    /// Removes a handler by ID. Returns whether it existed. Removal from
    /// inside a running handler takes effect for the next dispatch.
    pub fn remove_handler<E: 'static>(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(list) = inner
            .lists
            .get_mut(&TypeId::of::<E>())
            .and_then(|l| l.downcast_mut::<HandlerList<E>>())
        else {
            return false;
        };
        let before = list.entries.len();
        list.entries.retain(|entry| entry.id != id);
        before != list.entries.len()
    }

    /// Returns `true` if handlers may exist for events of type `E`.
    #[must_use]
    pub fn has_handlers_for<E: 'static>(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .lists
            .get(&TypeId::of::<E>())
            .and_then(|l| l.downcast_ref::<HandlerList<E>>())
            .is_some_and(|list| !list.entries.is_empty())
    }

    fn snapshot<E: 'static>(&self) -> Vec<Entry<E>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .lists
            .get(&TypeId::of::<E>())
            .and_then(|l| l.downcast_ref::<HandlerList<E>>())
            .map(|list| list.entries.clone())
            .unwrap_or_default()
    }

    fn run<E: 'static>(&self, event: &E, cancellable: bool) -> EventOutcome {
        // The lock is not held while handlers run, so handlers may mutate
        // the dispatcher and dispatch nested events.
        for entry in self.snapshot::<E>() {
            if entry.spent.load(Ordering::Acquire) {
                continue;
            }
            if entry.once && entry.spent.swap(true, Ordering::AcqRel) {
                continue;
            }

            let outcome = (entry.callback)(event);

            if entry.once {
                self.remove_handler::<E>(entry.id);
            }
            if cancellable && outcome == EventOutcome::Stop {
                return EventOutcome::Stop;
            }
        }
        EventOutcome::Continue
    }

    /// Runs all handlers for the event in descending priority order.
    pub fn dispatch<E: 'static>(&self, event: &E) {
        let _ = self.run(event, false);
    }

    /// Runs handlers in descending priority order, stopping at the first
    /// one returning [`EventOutcome::Stop`]. Returns the overall outcome.
    pub fn dispatch_cancellable<E: 'static>(&self, event: &E) -> EventOutcome {
        self.run(event, true)
    }
}
