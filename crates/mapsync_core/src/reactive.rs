//! Observable values
//!
//! A minimal read / write / observe primitive for the single-threaded binding
//! layer. Each [`Observable`] holds a value, a version counter for change
//! detection and a set of subscribers that are notified after every write that
//! actually changes the value.
//!
//! ```
//! use mapsync_core::reactive::Observable;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let loaded = Observable::new(false);
//! let seen = Rc::new(Cell::new(0));
//!
//! let seen_clone = seen.clone();
//! let subscription = loaded.subscribe(move |value| {
//!     if *value {
//!         seen_clone.set(seen_clone.get() + 1);
//!     }
//! });
//!
//! loaded.set(true);
//! loaded.set(true); // unchanged, no notification
//! assert_eq!(seen.get(), 1);
//!
//! subscription.unsubscribe();
//! ```
//!
//! Subscribers may freely read the observable, subscribe others, or drop their own
//! [`Subscription`] while being notified. A write issued from inside a subscriber
//! is applied immediately and notifies every subscriber that is not currently
//! running.

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

new_key_type! {
    /// Unique identifier for a subscriber of an [`Observable`]
    pub struct SubscriptionId;
}

type Subscriber<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct ObservableInner<T> {
    value: RefCell<T>,
    /// Incremented on every change
    version: Cell<u64>,
    subscribers: RefCell<SlotMap<SubscriptionId, Subscriber<T>>>,
}

/// A shared, observable value (cheap to clone, clones share state)
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new observable with an initial value
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(initial),
                version: Cell::new(0),
                subscribers: RefCell::new(SlotMap::with_key()),
            }),
        }
    }

    /// Get a copy of the current value
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Read the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Version counter, incremented on every change
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Set a new value
    ///
    /// Returns `true` and notifies subscribers if the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.inner.version.set(self.inner.version.get() + 1);
        self.notify();
        true
    }

    /// Update the value using a function
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    /// Subscribe to changes
    ///
    /// The callback is not invoked for the current value, only for later changes.
    /// The returned [`Subscription`] releases the callback when dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        let subscriber: Subscriber<T> = Rc::new(RefCell::new(callback));
        let id = self.inner.subscribers.borrow_mut().insert(subscriber);
        let weak: Weak<ObservableInner<T>> = Rc::downgrade(&self.inner);
        Subscription {
            id,
            release: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.borrow_mut().remove(id);
                }
            })),
        }
    }

    fn notify(&self) {
        // Snapshot so subscribers can (un)subscribe while we iterate
        let snapshot: SmallVec<[(SubscriptionId, Subscriber<T>); 4]> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(id, sub)| (id, Rc::clone(sub)))
            .collect();

        for (id, subscriber) in snapshot {
            // Skip subscribers released by an earlier callback in this pass
            if !self.inner.subscribers.borrow().contains_key(id) {
                continue;
            }
            let value = self.get();
            match subscriber.try_borrow_mut() {
                Ok(mut callback) => (*callback)(&value),
                Err(_) => {
                    tracing::trace!("observable: skipping re-entrant notification");
                }
            }
        }
    }
}

/// Handle for a live subscription
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) releases the
/// callback.
pub struct Subscription {
    id: SubscriptionId,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Release the subscription
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("live", &self.release.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observable_get_set() {
        let value = Observable::new(1i32);
        assert_eq!(value.get(), 1);
        assert!(value.set(2));
        assert_eq!(value.get(), 2);
        assert_eq!(value.version(), 1);
    }

    #[test]
    fn test_equal_write_does_not_notify() {
        let value = Observable::new(5i32);
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let _sub = value.subscribe(move |_| runs_clone.set(runs_clone.get() + 1));

        assert!(!value.set(5));
        assert_eq!(runs.get(), 0);
        assert_eq!(value.version(), 0);

        value.set(6);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let value = Observable::new(0i32);
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let sub = value.subscribe(move |_| runs_clone.set(runs_clone.get() + 1));
        assert_eq!(value.subscriber_count(), 1);

        value.set(1);
        drop(sub);
        value.set(2);

        assert_eq!(runs.get(), 1);
        assert_eq!(value.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_can_release_itself() {
        let value = Observable::new(0i32);
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let runs = Rc::new(Cell::new(0));

        let slot_clone = slot.clone();
        let runs_clone = runs.clone();
        let sub = value.subscribe(move |_| {
            runs_clone.set(runs_clone.get() + 1);
            slot_clone.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(sub);

        value.set(1);
        value.set(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(value.subscriber_count(), 0);
    }

    #[test]
    fn test_update() {
        let value = Observable::new(vec![1, 2]);
        assert!(value.update(|v| v.push(3)));
        assert_eq!(value.get(), vec![1, 2, 3]);
        assert!(!value.update(|_| {}));
    }

    #[test]
    fn test_subscription_outlives_observable() {
        let value = Observable::new(0u8);
        let sub = value.subscribe(|_| {});
        drop(value);
        sub.unsubscribe();
    }
}
