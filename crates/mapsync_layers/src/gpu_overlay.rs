//! GPU overlay
//!
//! Attaches an external GPU compositor to the map as a control. The compositor
//! needs one rendered frame with a valid viewport before it accepts non-empty
//! layer lists, so setup has two phases:
//!
//! 1. create the compositor with no layers and attach it
//! 2. on the next animation frame, push the current layer list
//!
//! Phase 1 can fail on some GPU contexts. The binding then retries the whole
//! sequence according to the map's [`RetryPolicy`](mapsync_core::RetryPolicy) and
//! degrades to "no overlay" when retries run out.
//!
//! Layer updates that arrive before phase 2 are not pushed; phase 2 always sends
//! the latest list. If the compositor refuses that list the overlay still goes
//! live, so the next update pushes again.

use mapsync_core::binding::{Binding, BindingState, BundleContext, ResourceBundle};
use mapsync_core::config::{RetryPolicy, SyncConfig};
use mapsync_core::context::{ContextRegistry, MapContext, ScopeId};
use mapsync_core::engine::{Compositor, CompositorFactory, CompositorOptions, ControlId, GpuLayer};
use mapsync_core::error::EngineError;
use mapsync_core::host::{FrameToken, HostScheduler};
use std::cell::RefCell;
use std::rc::Rc;

/// Declarative description of a GPU overlay
#[derive(Clone, Debug, PartialEq)]
pub struct GpuOverlayOptions {
    pub layers: Vec<GpuLayer>,
    /// Render interleaved with the map's own layers; read once at setup
    pub interleaved: bool,
}

impl Default for GpuOverlayOptions {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            interleaved: true,
        }
    }
}

impl GpuOverlayOptions {
    pub fn new(layers: Vec<GpuLayer>) -> Self {
        Self {
            layers,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct OverlayState {
    compositor: Option<Rc<dyn Compositor>>,
    control: Option<ControlId>,
    /// Phase 2 has run (accepted or not); updates go straight to the compositor
    live: bool,
    /// Latest layer list supplied by the caller
    layers: Vec<GpuLayer>,
    /// The compositor refused the last list it was sent
    stale: bool,
}

/// Compositor attachment of one GPU overlay
pub struct GpuOverlayBundle {
    factory: Rc<dyn CompositorFactory>,
    state: Rc<RefCell<OverlayState>>,
    frame: Option<FrameToken>,
}

impl GpuOverlayBundle {
    fn cancel_frame(&mut self, scheduler: &dyn HostScheduler) {
        if let Some(frame) = self.frame.take() {
            scheduler.cancel_frame(frame);
        }
    }
}

impl ResourceBundle for GpuOverlayBundle {
    type Config = GpuOverlayOptions;
    const KIND: &'static str = "gpu-overlay";

    fn probe_source(&self) -> Option<&str> {
        None
    }

    fn setup(&mut self, cx: &BundleContext, options: &GpuOverlayOptions) -> Result<(), EngineError> {
        let compositor = self.factory.create(CompositorOptions {
            layers: Vec::new(),
            interleaved: options.interleaved,
            use_device_pixels: true,
        })?;
        let control = cx.engine.add_control(Rc::clone(&compositor))?;

        {
            let mut state = self.state.borrow_mut();
            state.compositor = Some(compositor);
            state.control = Some(control);
            state.live = false;
            state.stale = false;
            state.layers = options.layers.clone();
        }

        let state = Rc::downgrade(&self.state);
        let frame = cx.scheduler.request_frame(Box::new(move |_| {
            let Some(state) = state.upgrade() else {
                return;
            };
            let (compositor, layers) = {
                let state = state.borrow();
                (state.compositor.clone(), state.layers.clone())
            };
            let Some(compositor) = compositor else {
                return;
            };
            let result = compositor.set_layers(&layers);
            let mut state = state.borrow_mut();
            state.live = true;
            state.stale = result.is_err();
            match result {
                Ok(()) => tracing::debug!(layers = layers.len(), "gpu overlay live"),
                Err(err) => tracing::warn!(%err, "gpu overlay rejected its first layers"),
            }
        }));
        self.frame = Some(frame);
        Ok(())
    }

    fn update(&mut self, _cx: &BundleContext, previous: &GpuOverlayOptions, next: &GpuOverlayOptions) {
        if previous.interleaved != next.interleaved {
            tracing::trace!("gpu overlay interleaving is fixed after setup");
        }

        let (compositor, live, stale) = {
            let mut state = self.state.borrow_mut();
            state.layers = next.layers.clone();
            (state.compositor.clone(), state.live, state.stale)
        };
        if previous.layers == next.layers && !stale {
            return;
        }
        if !live {
            tracing::trace!("gpu overlay update held until first frame");
            return;
        }
        let Some(compositor) = compositor else {
            return;
        };
        let result = compositor.set_layers(&next.layers);
        self.state.borrow_mut().stale = result.is_err();
        if let Err(err) = result {
            tracing::debug!(%err, "gpu overlay layer update refused");
        }
    }

    fn teardown(&mut self, cx: &BundleContext) {
        self.cancel_frame(cx.scheduler.as_ref());
        let control = {
            let mut state = self.state.borrow_mut();
            state.compositor = None;
            state.live = false;
            state.stale = false;
            state.control.take()
        };
        if let Some(control) = control {
            if let Err(err) = cx.engine.remove_control(control) {
                tracing::debug!(%err, "ignoring failed control removal");
            }
        }
    }

    fn cancel_pending(&mut self, scheduler: &dyn HostScheduler) {
        self.cancel_frame(scheduler);
    }

    fn retry_policy(&self, config: &SyncConfig) -> Option<RetryPolicy> {
        Some(config.retry)
    }
}

/// GPU-composited layers drawn over the map
pub struct GpuOverlay {
    binding: Binding<GpuOverlayBundle>,
    state: Rc<RefCell<OverlayState>>,
}

impl GpuOverlay {
    pub fn new(
        context: &MapContext,
        factory: Rc<dyn CompositorFactory>,
        options: GpuOverlayOptions,
    ) -> Self {
        let state = Rc::new(RefCell::new(OverlayState::default()));
        let bundle = GpuOverlayBundle {
            factory,
            state: Rc::clone(&state),
            frame: None,
        };
        Self {
            binding: Binding::new(context, bundle, options),
            state,
        }
    }

    /// Create an overlay under the nearest map of `scope`
    pub fn in_scope(
        registry: &ContextRegistry,
        scope: ScopeId,
        factory: Rc<dyn CompositorFactory>,
        options: GpuOverlayOptions,
    ) -> mapsync_core::Result<Self> {
        Ok(Self::new(&registry.use_map(scope)?, factory, options))
    }

    pub fn attach(&self) {
        self.binding.attach();
    }

    pub fn update(&self, options: GpuOverlayOptions) {
        self.binding.update(options);
    }

    pub fn detach(&self) {
        self.binding.detach();
    }

    /// The compositor is attached (phase 1 done)
    pub fn is_setup(&self) -> bool {
        self.binding.is_setup()
    }

    /// Phase 2 has run and updates reach the compositor directly
    pub fn is_live(&self) -> bool {
        self.state.borrow().live
    }

    pub fn state(&self) -> BindingState {
        self.binding.state()
    }

    pub fn compositor(&self) -> Option<Rc<dyn Compositor>> {
        self.state.borrow().compositor.clone()
    }
}
