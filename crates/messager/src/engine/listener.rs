// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic listeners and connection-state listeners.
//!
//! Listeners are `Arc` values; the pointer is their identity, so removal takes
//! the same `Arc` that was registered.
//!
//! # Thread Safety
//!
//! Callbacks run synchronously on the dispatching thread: the transport's
//! delivery thread for inbound messages, the submitting thread for
//! self-delivered ones. A listener that blocks stalls that path.

use crate::api::{Topic, TopicId, TopicValue};
use crate::engine::fanout::{Registration, TopicFanout};
use crate::message::Payload;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Callback invoked with the content of every message routed on its topic.
///
/// Implemented for any `Fn(&T) + Send + Sync` closure.
pub trait TopicListener<T>: Send + Sync {
    fn received_message_for_topic(&self, content: &T);
}

impl<T, F> TopicListener<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn received_message_for_topic(&self, content: &T) {
        self(content);
    }
}

/// Callback invoked with the new open/closed state of the messager.
///
/// Implemented for any `Fn(bool) + Send + Sync` closure.
pub trait MessagerStateListener: Send + Sync {
    fn messager_state_changed(&self, open: bool);
}

impl<F> MessagerStateListener for F
where
    F: Fn(bool) + Send + Sync,
{
    fn messager_state_changed(&self, open: bool) {
        self(open);
    }
}

fn listener_key<L: ?Sized>(listener: &Arc<L>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

/// Outcome of one topic dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned normally.
    pub delivered: usize,
    /// Listeners that panicked (isolated, later listeners still ran).
    pub panicked: usize,
}

pub(crate) trait ListenerSlot: Registration {
    fn deliver(&self, payload: &Payload) -> bool;
}

struct TypedListener<T> {
    listener: Arc<dyn TopicListener<T>>,
    _payload: PhantomData<fn(&T)>,
}

impl<T: 'static> Registration for TypedListener<T> {
    fn key(&self) -> usize {
        listener_key(&self.listener)
    }
}

impl<T: Send + Sync + 'static> ListenerSlot for TypedListener<T> {
    #[inline]
    fn deliver(&self, payload: &Payload) -> bool {
        match (**payload).downcast_ref::<T>() {
            Some(content) => {
                self.listener.received_message_for_topic(content);
                true
            }
            None => false,
        }
    }
}

/// Topic -> registered callbacks.
pub struct ListenerManager {
    listeners: TopicFanout<dyn ListenerSlot>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self {
            listeners: TopicFanout::new(),
        }
    }

    /// Register `listener` on `topic`; `false` if that `Arc` is already registered.
    pub fn register_topic_listener<T: TopicValue>(
        &self,
        topic: &Topic<T>,
        listener: Arc<dyn TopicListener<T>>,
    ) -> bool {
        let slot = Arc::new(TypedListener {
            listener,
            _payload: PhantomData,
        });
        self.listeners.insert(topic.id(), slot)
    }

    /// Deregister; `true` only if registration changed.
    pub fn remove_topic_listener<T: TopicValue>(
        &self,
        topic: &Topic<T>,
        listener: &Arc<dyn TopicListener<T>>,
    ) -> bool {
        self.listeners.remove(topic.id(), listener_key(listener))
    }

    pub fn listener_count(&self, topic: TopicId) -> usize {
        self.listeners.len(topic)
    }

    /// Invoke every listener of `topic` in registration order, isolating panics.
    pub(crate) fn dispatch(&self, topic: TopicId, payload: &Payload) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(listeners) = self.listeners.snapshot(topic) else {
            return report;
        };

        for listener in listeners.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener.deliver(payload))) {
                Ok(true) => report.delivered += 1,
                Ok(false) => {
                    log::debug!("[listener] payload type mismatch on topic {}", topic);
                }
                Err(_) => {
                    report.panicked += 1;
                    log::error!("[listener] listener on topic {} panicked", topic);
                }
            }
        }

        report
    }
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered connection-state listeners, notified in registration order.
pub struct StateListeners {
    listeners: Mutex<Vec<Arc<dyn MessagerStateListener>>>,
}

impl StateListeners {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, listener: Arc<dyn MessagerStateListener>) {
        self.listeners.lock().push(listener);
    }

    /// `true` only if the listener was registered.
    pub fn remove(&self, listener: &Arc<dyn MessagerStateListener>) -> bool {
        let key = listener_key(listener);
        let mut listeners = self.listeners.lock();
        match listeners.iter().position(|l| listener_key(l) == key) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Call every listener with `open`. The lock is not held during callbacks.
    pub fn notify(&self, open: bool) {
        let snapshot: Vec<_> = self.listeners.lock().clone();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener.messager_state_changed(open))).is_err() {
                log::error!("[listener] state listener panicked (open={})", open);
            }
        }
    }
}

impl Default for StateListeners {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MessagerApi;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn speed_topic() -> (Topic<f64>, Topic<f64>) {
        let mut builder = MessagerApi::builder("Test");
        let speed = builder.topic::<f64>("Speed").expect("speed");
        let heading = builder.topic::<f64>("Heading").expect("heading");
        (speed, heading)
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let (speed, _) = speed_topic();
        let manager = ListenerManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let listener: Arc<dyn TopicListener<f64>> =
                Arc::new(move |_: &f64| order.lock().push(tag));
            assert!(manager.register_topic_listener(&speed, listener));
        }

        let payload: Payload = Arc::new(1.0_f64);
        let report = manager.dispatch(speed.id(), &payload);

        assert_eq!(report.delivered, 3);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dispatch_isolated_per_topic() {
        let (speed, heading) = speed_topic();
        let manager = ListenerManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let listener: Arc<dyn TopicListener<f64>> = Arc::new(move |_: &f64| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        manager.register_topic_listener(&heading, listener);

        let payload: Payload = Arc::new(1.0_f64);
        let report = manager.dispatch(speed.id(), &payload);

        assert_eq!(report, DispatchReport::default());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let (speed, _) = speed_topic();
        let manager = ListenerManager::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let boom: Arc<dyn TopicListener<f64>> =
            Arc::new(|_: &f64| std::panic::panic_any("listener panic"));
        let h = Arc::clone(&hits);
        let counter: Arc<dyn TopicListener<f64>> = Arc::new(move |_: &f64| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        manager.register_topic_listener(&speed, boom);
        manager.register_topic_listener(&speed, counter);

        let payload: Payload = Arc::new(1.0_f64);
        let report = manager.dispatch(speed.id(), &payload);

        assert_eq!(report.panicked, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_topic_listener_twice() {
        let (speed, _) = speed_topic();
        let manager = ListenerManager::new();
        let listener: Arc<dyn TopicListener<f64>> = Arc::new(|_: &f64| {});

        manager.register_topic_listener(&speed, Arc::clone(&listener));
        assert_eq!(manager.listener_count(speed.id()), 1);

        assert!(manager.remove_topic_listener(&speed, &listener));
        assert!(!manager.remove_topic_listener(&speed, &listener));
        assert_eq!(manager.listener_count(speed.id()), 0);
    }

    #[test]
    fn test_state_listeners_notify_and_remove() {
        let listeners = StateListeners::new();
        let last = Arc::new(AtomicBool::new(false));
        let l = Arc::clone(&last);
        let listener: Arc<dyn MessagerStateListener> =
            Arc::new(move |open: bool| l.store(open, Ordering::SeqCst));

        listeners.register(Arc::clone(&listener));
        listeners.notify(true);
        assert!(last.load(Ordering::SeqCst));

        assert!(listeners.remove(&listener));
        assert!(!listeners.remove(&listener));

        listeners.notify(false);
        assert!(last.load(Ordering::SeqCst));
    }
}
