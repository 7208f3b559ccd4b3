//! Readiness gate
//!
//! Tracks the live engine handle and two asynchronous milestones: the engine
//! has been instantiated, and its style (sprites, glyphs, source descriptors)
//! has fully loaded. Bindings must not touch the engine before both are true.
//!
//! ```
//! use mapsync_core::readiness::ReadinessGate;
//!
//! let gate = ReadinessGate::new();
//! let waiter = gate.when_ready(|_engine| {
//!     // create sources and layers here
//! });
//! assert!(waiter.is_pending());
//! ```
//!
//! Flags are monotonic for one engine handle: once set they stay set until the
//! handle itself is replaced, which resets both.

use crate::engine::MapEngine;
use crate::reactive::{Observable, Subscription};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Readiness flags of the current engine handle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadinessState {
    /// The engine instance has loaded
    pub engine_ready: bool,
    /// The engine's style and its resources have loaded
    pub style_ready: bool,
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        self.engine_ready && self.style_ready
    }
}

struct GateInner {
    engine: RefCell<Option<Rc<dyn MapEngine>>>,
    state: Observable<ReadinessState>,
}

/// Shared readiness gate for one map (cheap to clone)
#[derive(Clone)]
pub struct ReadinessGate {
    inner: Rc<GateInner>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("has_engine", &self.inner.engine.borrow().is_some())
            .field("state", &self.state())
            .finish()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(GateInner {
                engine: RefCell::new(None),
                state: Observable::new(ReadinessState::default()),
            }),
        }
    }

    /// The current engine handle, if any
    pub fn engine(&self) -> Option<Rc<dyn MapEngine>> {
        self.inner.engine.borrow().clone()
    }

    pub fn state(&self) -> ReadinessState {
        self.inner.state.get()
    }

    /// The engine handle, only when both milestones have been reached
    pub fn ready_engine(&self) -> Option<Rc<dyn MapEngine>> {
        if self.state().is_ready() {
            self.engine()
        } else {
            None
        }
    }

    /// Observe readiness changes
    pub fn observe(&self) -> &Observable<ReadinessState> {
        &self.inner.state
    }

    /// Replace the engine handle
    ///
    /// Readiness is reset wholesale; the new engine must report its own milestones.
    pub fn set_engine(&self, engine: Option<Rc<dyn MapEngine>>) {
        tracing::debug!(has_engine = engine.is_some(), "readiness: engine handle replaced");
        *self.inner.engine.borrow_mut() = engine;
        self.inner.state.set(ReadinessState::default());
    }

    /// Record that the engine instance has loaded
    pub fn mark_engine_ready(&self) {
        self.inner.state.update(|state| state.engine_ready = true);
    }

    /// Record that the engine's style has loaded
    pub fn mark_style_ready(&self) {
        self.inner.state.update(|state| state.style_ready = true);
    }

    /// Run `continuation` once the engine is fully ready
    ///
    /// Runs synchronously if the gate is already open. Otherwise the continuation
    /// is deferred and runs exactly once, the first time both flags are true and an
    /// engine handle is present; the subscription is released afterwards. Dropping
    /// the returned [`ReadyWaiter`] before that cancels the continuation.
    pub fn when_ready<F>(&self, continuation: F) -> ReadyWaiter
    where
        F: FnOnce(Rc<dyn MapEngine>) + 'static,
    {
        if let Some(engine) = self.ready_engine() {
            continuation(engine);
            return ReadyWaiter::completed();
        }

        let has_engine: Weak<GateInner> = Rc::downgrade(&self.inner);
        let weak: Weak<GateInner> = Rc::downgrade(&self.inner);
        once_when(
            &self.inner.state,
            move |state| {
                state.is_ready()
                    && has_engine
                        .upgrade()
                        .map(|inner| {
                            let present = inner.engine.borrow().is_some();
                            present
                        })
                        .unwrap_or(false)
            },
            move || {
                let engine = weak.upgrade().and_then(|inner| {
                    let engine = inner.engine.borrow().clone();
                    engine
                });
                if let Some(engine) = engine {
                    continuation(engine);
                }
            },
        )
    }
}

/// Pending deferred continuation
///
/// Dropping the waiter cancels the continuation if it has not run yet.
#[derive(Default)]
pub struct ReadyWaiter {
    subscription: Option<Rc<RefCell<Option<Subscription>>>>,
}

impl ReadyWaiter {
    fn completed() -> Self {
        Self { subscription: None }
    }

    /// Whether the continuation is still waiting
    pub fn is_pending(&self) -> bool {
        self.subscription
            .as_ref()
            .map(|slot| slot.borrow().is_some())
            .unwrap_or(false)
    }

    /// Cancel the continuation
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(slot) = self.subscription.take() {
            // Bind before dropping so the RefCell borrow ends first
            let subscription = slot.borrow_mut().take();
            drop(subscription);
        }
    }
}

impl fmt::Debug for ReadyWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyWaiter")
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl Drop for ReadyWaiter {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run `fire` the first time `predicate` holds for a later value of `observable`
///
/// The subscription is released before `fire` runs. Used by the readiness gate and
/// the marker context.
pub fn once_when<T, P, F>(observable: &Observable<T>, predicate: P, fire: F) -> ReadyWaiter
where
    T: Clone + PartialEq + 'static,
    P: Fn(&T) -> bool + 'static,
    F: FnOnce() + 'static,
{
    let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
    let pending: RefCell<Option<F>> = RefCell::new(Some(fire));

    let slot_clone = Rc::clone(&slot);
    let subscription = observable.subscribe(move |value| {
        if !predicate(value) {
            return;
        }
        let Some(fire) = pending.borrow_mut().take() else {
            return;
        };
        let released = slot_clone.borrow_mut().take();
        drop(released);
        fire();
    });
    *slot.borrow_mut() = Some(subscription);

    ReadyWaiter {
        subscription: Some(slot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_state_requires_both_flags() {
        let gate = ReadinessGate::new();
        assert!(!gate.state().is_ready());
        gate.mark_engine_ready();
        assert!(!gate.state().is_ready());
        gate.mark_style_ready();
        assert!(gate.state().is_ready());
        // No engine handle yet
        assert!(gate.ready_engine().is_none());
    }

    #[test]
    fn test_once_when_fires_once() {
        let value = Observable::new(0i32);
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let waiter = once_when(
            &value,
            |v| *v >= 2,
            move || runs_clone.set(runs_clone.get() + 1),
        );

        value.set(1);
        assert_eq!(runs.get(), 0);
        assert!(waiter.is_pending());

        value.set(2);
        value.set(3);
        assert_eq!(runs.get(), 1);
        assert!(!waiter.is_pending());
        assert_eq!(value.subscriber_count(), 0);
    }

    #[test]
    fn test_once_when_cancel() {
        let value = Observable::new(false);
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let waiter = once_when(
            &value,
            |v| *v,
            move || runs_clone.set(runs_clone.get() + 1),
        );
        waiter.cancel();
        value.set(true);
        assert_eq!(runs.get(), 0);
        assert_eq!(value.subscriber_count(), 0);
    }
}
