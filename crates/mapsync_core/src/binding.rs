//! Layer binding state machine
//!
//! A [`Binding`] owns the lifecycle of one declarative layer instance against the
//! engine. The kind-specific work (which sources and layers exist, how a config
//! change maps onto engine calls) lives in a [`ResourceBundle`]; the binding
//! sequences it:
//!
//! ```text
//! Unmounted ──attach──▶ Pending ──ready + setup ok──▶ Active ──detach──▶ TornDown
//!                          │                                                ▲
//!                          └──setup failed, retries exhausted──▶ Degraded ──┘
//! ```
//!
//! - Setup runs at most once per successful attempt, only after the readiness gate
//!   opens, and is skipped when the engine already reports the bundle's source.
//! - A setup that fails midway is rolled back, so the engine never holds half a
//!   bundle. Bundles that declare a [`RetryPolicy`] are retried after a delay.
//! - Updates always record the latest configuration. They reach the engine only
//!   while set up, as a diff against the last applied configuration.
//! - Teardown is idempotent and clears the setup flag unconditionally.

use crate::config::{RetryPolicy, SyncConfig};
use crate::context::MapContext;
use crate::engine::MapEngine;
use crate::error::EngineError;
use crate::host::{HostScheduler, TimerToken};
use crate::readiness::ReadyWaiter;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Lifecycle state of a [`Binding`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingState {
    /// Created but not attached
    Unmounted,
    /// Attached, waiting for readiness (or for a retry)
    Pending,
    /// Resources present and handlers wired
    Active,
    /// Setup failed and will not be retried; the map works without this layer
    Degraded,
    /// Detached; terminal
    TornDown,
}

/// Handles passed to bundle operations
#[derive(Clone)]
pub struct BundleContext {
    pub engine: Rc<dyn MapEngine>,
    pub scheduler: Rc<dyn HostScheduler>,
    pub config: Rc<SyncConfig>,
}

impl fmt::Debug for BundleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The kind-specific half of a layer binding
pub trait ResourceBundle: 'static {
    /// Declarative configuration of this layer kind
    type Config: Clone + 'static;

    /// Name used in logs
    const KIND: &'static str;

    /// Source id probed before setup; if the engine already has it, setup is skipped
    fn probe_source(&self) -> Option<&str>;

    /// Create the source, then the layers in order, push `config`, then wire handlers
    ///
    /// On error the binding calls [`ResourceBundle::teardown`] to roll back whatever
    /// was created.
    fn setup(&mut self, cx: &BundleContext, config: &Self::Config) -> Result<(), EngineError>;

    /// Apply the minimal engine mutations for `previous → next`
    fn update(&mut self, cx: &BundleContext, previous: &Self::Config, next: &Self::Config);

    /// Deregister every handler, then remove layers in reverse creation order, then
    /// the source; absent resources are ignored
    fn teardown(&mut self, cx: &BundleContext);

    /// Cancel deferred work (frames, timers) owned by the bundle
    ///
    /// Called on detach whether or not setup ever completed.
    fn cancel_pending(&mut self, _scheduler: &dyn HostScheduler) {}

    /// Retry policy for failed setups; `None` means fail once and degrade
    fn retry_policy(&self, _config: &SyncConfig) -> Option<RetryPolicy> {
        None
    }
}

struct BindingInner<B: ResourceBundle> {
    bundle: B,
    /// Latest configuration supplied by the caller
    config: B::Config,
    /// Configuration last pushed to the engine
    applied: Option<B::Config>,
    state: BindingState,
    is_setup: bool,
    engine: Option<Rc<dyn MapEngine>>,
    waiter: ReadyWaiter,
    retry_timer: Option<TimerToken>,
    retries: u32,
}

/// Lifecycle driver for one layer instance
///
/// Dropping an attached binding detaches it.
pub struct Binding<B: ResourceBundle> {
    inner: Rc<RefCell<BindingInner<B>>>,
    context: MapContext,
}

impl<B: ResourceBundle> Binding<B> {
    pub fn new(context: &MapContext, bundle: B, config: B::Config) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BindingInner {
                bundle,
                config,
                applied: None,
                state: BindingState::Unmounted,
                is_setup: false,
                engine: None,
                waiter: ReadyWaiter::default(),
                retry_timer: None,
                retries: 0,
            })),
            context: context.clone(),
        }
    }

    pub fn state(&self) -> BindingState {
        self.inner.borrow().state
    }

    pub fn is_setup(&self) -> bool {
        self.inner.borrow().is_setup
    }

    /// The latest configuration supplied by the caller
    pub fn config(&self) -> B::Config {
        self.inner.borrow().config.clone()
    }

    /// Read the bundle
    pub fn with_bundle<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.inner.borrow().bundle)
    }

    /// Start waiting for readiness; setup runs as soon as the gate opens
    pub fn attach(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != BindingState::Unmounted {
                return;
            }
            inner.state = BindingState::Pending;
        }
        tracing::debug!(kind = B::KIND, "binding attached");

        // The gate may run the continuation synchronously, so no borrow is held here
        let waiter = wait_for_ready(&self.inner, &self.context);
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.waiter = waiter;
        }
    }

    /// Record a new configuration and project it onto the engine if set up
    pub fn update(&self, config: B::Config) {
        let Ok(mut guard) = self.inner.try_borrow_mut() else {
            tracing::warn!(kind = B::KIND, "update re-entered during a binding operation");
            return;
        };
        let inner = &mut *guard;
        inner.config = config.clone();

        if !inner.is_setup {
            tracing::trace!(kind = B::KIND, "update dropped, not set up");
            return;
        }
        let Some(engine) = inner.engine.clone() else {
            return;
        };
        let cx = bundle_context(&self.context, engine);
        let previous = inner.applied.replace(config.clone()).unwrap_or_else(|| config.clone());
        inner.bundle.update(&cx, &previous, &config);
    }

    /// Tear the binding down; safe to call any number of times
    pub fn detach(&self) {
        let Ok(mut guard) = self.inner.try_borrow_mut() else {
            tracing::warn!(kind = B::KIND, "detach re-entered during a binding operation");
            return;
        };
        let inner = &mut *guard;
        if inner.state == BindingState::TornDown {
            return;
        }

        // Release the readiness wait first so a late gate cannot set us up again
        let waiter = std::mem::take(&mut inner.waiter);
        drop(waiter);
        if let Some(timer) = inner.retry_timer.take() {
            self.context.scheduler.clear_timeout(timer);
        }
        inner.bundle.cancel_pending(self.context.scheduler.as_ref());

        if inner.is_setup {
            if let Some(engine) = inner.engine.take() {
                let cx = bundle_context(&self.context, engine);
                inner.bundle.teardown(&cx);
            }
        }

        inner.is_setup = false;
        inner.applied = None;
        inner.state = BindingState::TornDown;
        tracing::debug!(kind = B::KIND, "binding torn down");
    }
}

impl<B: ResourceBundle> Drop for Binding<B> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<B: ResourceBundle> fmt::Debug for Binding<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Binding")
                .field("kind", &B::KIND)
                .field("state", &inner.state)
                .field("is_setup", &inner.is_setup)
                .finish(),
            Err(_) => f.debug_struct("Binding").field("kind", &B::KIND).finish_non_exhaustive(),
        }
    }
}

fn bundle_context(context: &MapContext, engine: Rc<dyn MapEngine>) -> BundleContext {
    BundleContext {
        engine,
        scheduler: Rc::clone(&context.scheduler),
        config: Rc::clone(&context.config),
    }
}

fn wait_for_ready<B: ResourceBundle>(
    inner: &Rc<RefCell<BindingInner<B>>>,
    context: &MapContext,
) -> ReadyWaiter {
    let weak: Weak<RefCell<BindingInner<B>>> = Rc::downgrade(inner);
    let context_clone = context.clone();
    context.gate.when_ready(move |engine| {
        if let Some(inner) = weak.upgrade() {
            run_setup(&inner, &context_clone, engine);
        }
    })
}

fn run_setup<B: ResourceBundle>(
    inner_rc: &Rc<RefCell<BindingInner<B>>>,
    context: &MapContext,
    engine: Rc<dyn MapEngine>,
) {
    let Ok(mut guard) = inner_rc.try_borrow_mut() else {
        tracing::warn!(kind = B::KIND, "setup re-entered during a binding operation");
        return;
    };
    let inner = &mut *guard;
    if inner.is_setup || inner.state != BindingState::Pending {
        return;
    }
    if let Some(source_id) = inner.bundle.probe_source() {
        if engine.has_source(source_id) {
            tracing::debug!(kind = B::KIND, source_id, "source already present, skipping setup");
            return;
        }
    }

    let cx = bundle_context(context, Rc::clone(&engine));
    let config = inner.config.clone();
    match inner.bundle.setup(&cx, &config) {
        Ok(()) => {
            inner.is_setup = true;
            inner.applied = Some(config);
            inner.engine = Some(engine);
            inner.state = BindingState::Active;
            tracing::debug!(kind = B::KIND, retries = inner.retries, "binding set up");
        }
        Err(err) => {
            inner.bundle.teardown(&cx);
            let policy = inner.bundle.retry_policy(&context.config);
            match policy {
                Some(policy) if inner.retries < policy.max_retries => {
                    inner.retries += 1;
                    tracing::warn!(
                        kind = B::KIND,
                        %err,
                        attempt = inner.retries,
                        delay_ms = policy.delay_ms,
                        "setup failed, retrying"
                    );
                    let weak = Rc::downgrade(inner_rc);
                    let context_clone = context.clone();
                    let timer = context.scheduler.set_timeout(
                        policy.delay(),
                        Box::new(move || {
                            if let Some(inner) = weak.upgrade() {
                                retry_setup(&inner, &context_clone);
                            }
                        }),
                    );
                    inner.retry_timer = Some(timer);
                }
                _ => {
                    tracing::warn!(kind = B::KIND, %err, "setup failed, layer disabled");
                    inner.state = BindingState::Degraded;
                }
            }
        }
    }
}

fn retry_setup<B: ResourceBundle>(inner: &Rc<RefCell<BindingInner<B>>>, context: &MapContext) {
    if let Ok(mut guard) = inner.try_borrow_mut() {
        guard.retry_timer = None;
    }
    // The engine may have been replaced while we waited
    let waiter = wait_for_ready(inner, context);
    if let Ok(mut guard) = inner.try_borrow_mut() {
        guard.waiter = waiter;
    }
}
