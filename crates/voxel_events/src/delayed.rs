//! The delayed prioritized event dispatcher.
//!
//! Events are buffered by [`DelayedEventDispatcher::enqueue`] and run in
//! FIFO order when the owner calls
//! [`dispatch_pending`](DelayedEventDispatcher::dispatch_pending), typically
//! once per tick on the owning thread. Each drained event runs through the
//! wrapped immediate dispatcher with full priority semantics. Events
//! enqueued from inside a running handler are held for the next drain.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::immediate::EventDispatcher;

type PendingEvent = Box<dyn FnOnce(&EventDispatcher) + Send>;

/// Buffers typed events for deferred dispatch.
#[derive(Default)]
pub struct DelayedEventDispatcher {
    dispatcher: EventDispatcher,
    pending: Mutex<VecDeque<PendingEvent>>,
}

impl DelayedEventDispatcher {
    /// Creates a dispatcher with no handlers and no pending events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers an event for the next [`dispatch_pending`] call.
    ///
    /// [`dispatch_pending`]: DelayedEventDispatcher::dispatch_pending
    pub fn enqueue<E: Send + 'static>(&self, event: E) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.push_back(Box::new(move |dispatcher| dispatcher.dispatch(&event)));
    }

    /// Drains the buffer, dispatching each event in enqueue order. Events
    /// enqueued while draining stay buffered for the next call.
    pub fn dispatch_pending(&self) {
        let batch: VecDeque<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *pending)
        };
        for event in batch {
            event(&self.dispatcher);
        }
    }

    /// Returns `true` if events are waiting to be dispatched.
    #[must_use]
    pub fn has_pending_events(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        !pending.is_empty()
    }

    /// The wrapped immediate dispatcher, for handler registration and
    /// immediate dispatch.
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}

impl std::ops::Deref for DelayedEventDispatcher {
    type Target = EventDispatcher;

    fn deref(&self) -> &Self::Target {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    struct Tick(u32);

    #[test]
    fn test_enqueue_does_not_dispatch() {
        let dispatcher = DelayedEventDispatcher::new();
        let runs = Arc::new(StdMutex::new(0));

        {
            let runs = runs.clone();
            dispatcher.add_handler(0, move |_: &Tick| *runs.lock().unwrap() += 1);
        }

        dispatcher.enqueue(Tick(1));
        dispatcher.enqueue(Tick(2));
        assert!(dispatcher.has_pending_events());
        assert_eq!(*runs.lock().unwrap(), 0);

        dispatcher.dispatch_pending();
        assert_eq!(*runs.lock().unwrap(), 2);
        assert!(!dispatcher.has_pending_events());
    }

    #[test]
    fn test_drain_preserves_enqueue_order() {
        let dispatcher = DelayedEventDispatcher::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        {
            let order = order.clone();
            dispatcher.add_handler(0, move |event: &Tick| {
                order.lock().unwrap().push(event.0);
            });
        }

        for n in [3, 1, 4, 1, 5] {
            dispatcher.enqueue(Tick(n));
        }
        dispatcher.dispatch_pending();
        assert_eq!(*order.lock().unwrap(), vec![3, 1, 4, 1, 5]);
    }

    #[test]
    fn test_events_enqueued_while_draining_wait_for_next_drain() {
        let dispatcher = Arc::new(DelayedEventDispatcher::new());
        let runs = Arc::new(StdMutex::new(0));

        {
            let dispatcher_handle = dispatcher.clone();
            let runs = runs.clone();
            dispatcher.add_handler(0, move |event: &Tick| {
                *runs.lock().unwrap() += 1;
                if event.0 == 1 {
                    dispatcher_handle.enqueue(Tick(2));
                }
            });
        }

        dispatcher.enqueue(Tick(1));
        dispatcher.dispatch_pending();
        assert_eq!(*runs.lock().unwrap(), 1);
        assert!(dispatcher.has_pending_events());

        dispatcher.dispatch_pending();
        assert_eq!(*runs.lock().unwrap(), 2);
    }
}
