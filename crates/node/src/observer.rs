//! Typed publish/subscribe primitive for engine events.
//!
//! Publishers hold weak references to subscriber closures: dropping the
//! [`Subscription`] unsubscribes, and a panicking subscriber is contained
//! and logged rather than breaking the publisher or its caller.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::warn;

type Callback<T> = dyn Fn(&T) + Send + Sync;

/// Keeps a subscriber alive. Dropping it detaches the callback.
pub struct Subscription<T: ?Sized> {
    _callback: Arc<Callback<T>>,
}

/// A typed event publisher.
///
/// # Example
///
/// ```rust
/// use basalt_node::Observable;
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
///
/// let events: Observable<u64> = Observable::new();
/// let seen = Arc::new(AtomicU64::new(0));
/// let seen2 = Arc::clone(&seen);
/// let sub = events.subscribe(move |v| {
///     seen2.fetch_add(*v, Ordering::SeqCst);
/// });
/// events.notify(&7);
/// assert_eq!(seen.load(Ordering::SeqCst), 7);
/// drop(sub);
/// events.notify(&1);
/// assert_eq!(seen.load(Ordering::SeqCst), 7);
/// ```
pub struct Observable<T> {
    subscribers: RwLock<Vec<Weak<Callback<T>>>>,
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observable<T> {
    /// Creates a publisher with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Attaches a subscriber. The returned handle owns the callback.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription<T> {
        let callback: Arc<Callback<T>> = Arc::new(callback);
        self.subscribers.write().push(Arc::downgrade(&callback));
        Subscription {
            _callback: callback,
        }
    }

    /// Delivers `value` to every live subscriber, pruning dead ones.
    ///
    /// Subscribers must be non-blocking; a panic inside one is contained.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Arc<Callback<T>>> = {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                warn!("observer callback panicked; continuing");
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
