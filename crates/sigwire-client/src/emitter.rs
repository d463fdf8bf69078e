//! Event dispatcher
//!
//! A multi-subscriber publish/subscribe hub keyed by event tag.
//!
//! Delivery is synchronous: [`EventEmitter::publish`] runs every handler
//! registered for the tag on the calling task, in subscription order, before
//! it returns. The handler list is snapshotted first, so a handler may
//! subscribe, unsubscribe or publish without deadlocking. A handler that
//! panics is logged and skipped; the remaining handlers still run.

use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

/// Handler callback type
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Identifies one registration, for [`EventEmitter::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub struct EventEmitter<E> {
    handlers: DashMap<String, Vec<(SubscriptionId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for `tag`
    pub fn subscribe<F>(&self, tag: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.handlers
            .entry(tag.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a registration. Returns false if it was not registered.
    pub fn unsubscribe(&self, tag: &str, id: SubscriptionId) -> bool {
        let mut removed = false;
        if let Some(mut list) = self.handlers.get_mut(tag) {
            let before = list.len();
            list.retain(|(sub_id, _)| *sub_id != id);
            removed = list.len() != before;
        }
        self.handlers.remove_if(tag, |_, list| list.is_empty());
        removed
    }

    /// Invoke every handler registered for `tag` with `event`.
    ///
    /// Returns the number of handlers invoked, including ones that panicked.
    pub fn publish(&self, tag: &str, event: &E) -> usize {
        let snapshot: Vec<Handler<E>> = match self.handlers.get(tag) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        for handler in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Event handler for '{}' panicked", tag);
            }
        }

        snapshot.len()
    }

    pub fn subscriber_count(&self, tag: &str) -> usize {
        self.handlers.get(tag).map(|list| list.len()).unwrap_or(0)
    }
}

impl<E: Clone + Send + 'static> EventEmitter<E> {
    /// Subscribe with a channel instead of a callback.
    ///
    /// Every event published under `tag` is cloned into the returned
    /// receiver. Events published after the receiver is dropped are discarded.
    pub fn channel(
        &self,
        tag: impl Into<String>,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(tag, move |event: &E| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("tags", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_invokes_each_handler_once() {
        let emitter = EventEmitter::<u32>::new();
        let counters: Vec<Arc<AtomicUsize>> =
            (0..5).map(|_| Arc::new(AtomicUsize::new(0))).collect();

        for counter in &counters {
            let counter = counter.clone();
            emitter.subscribe("tick", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(emitter.publish("tick", &7), 5);
        for counter in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_publish_only_matching_tag() {
        let emitter = EventEmitter::<&'static str>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        emitter.subscribe("message", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(emitter.publish("other", &"x"), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_order() {
        let emitter = EventEmitter::<()>::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            emitter.subscribe("e", move |_| order.lock().push(i));
        }
        emitter.publish("e", &());

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let emitter = EventEmitter::<u8>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let before = hits.clone();
        emitter.subscribe("e", move |_| {
            before.fetch_add(1, Ordering::SeqCst);
        });
        emitter.subscribe("e", |_| panic!("handler failure"));
        let after = hits.clone();
        emitter.subscribe("e", move |_| {
            after.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(emitter.publish("e", &1), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let emitter = EventEmitter::<()>::new();
        let a = emitter.subscribe("e", |_| {});
        let b = emitter.subscribe("e", |_| {});

        assert!(emitter.unsubscribe("e", a));
        assert!(!emitter.unsubscribe("e", a));
        assert_eq!(emitter.subscriber_count("e"), 1);

        assert!(emitter.unsubscribe("e", b));
        assert_eq!(emitter.subscriber_count("e"), 0);
        assert_eq!(emitter.publish("e", &()), 0);
    }

    #[test]
    fn test_reentrant_subscribe_from_handler() {
        let emitter = Arc::new(EventEmitter::<()>::new());
        let inner = emitter.clone();
        emitter.subscribe("e", move |_| {
            inner.subscribe("late", |_| {});
        });

        emitter.publish("e", &());
        assert_eq!(emitter.subscriber_count("late"), 1);
    }

    #[tokio::test]
    async fn test_channel_adapter() {
        let emitter = EventEmitter::<String>::new();
        let (_, mut rx) = emitter.channel("message");

        emitter.publish("message", &"hello".to_string());
        emitter.publish("message", &"world".to_string());

        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx.recv().await.as_deref(), Some("world"));
    }

    #[test]
    fn test_concurrent_subscribe_and_publish() {
        let emitter = Arc::new(EventEmitter::<usize>::new());
        let total = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let emitter = emitter.clone();
                let total = total.clone();
                std::thread::spawn(move || {
                    emitter.subscribe("n", move |n| {
                        total.fetch_add(*n, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(emitter.publish("n", &1), 8);
        assert_eq!(total.load(Ordering::SeqCst), 8);
    }
}
