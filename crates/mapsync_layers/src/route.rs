//! Route layer
//!
//! A single line layer over a GeoJSON `LineString` source. The path can be
//! pushed at once or revealed frame by frame, and the camera can optionally fit
//! the path when it first appears.
//!
//! Engine ids: `route-source-{token}` and `route-layer-{token}`.

use mapsync_animation::{RevealSink, RouteReveal};
use mapsync_core::binding::{Binding, BindingState, BundleContext, ResourceBundle};
use mapsync_core::context::{ContextRegistry, MapContext, ScopeId};
use mapsync_core::engine::{
    Cursor, FitBoundsOptions, GeoJsonData, LayerEvent, LayerEventKind, LayerKind, LayerSpec,
    MapEngine, SourceSpec,
};
use mapsync_core::error::EngineError;
use mapsync_core::geo::{nearest_vertex, LngLat, LngLatBounds};
use mapsync_core::resources::{
    remove_layer_quietly, remove_source_quietly, set_data_if_present, set_paint_if_present,
    Listeners,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

// =============================================================================
// OPTIONS
// =============================================================================

/// Declarative description of a route
#[derive(Clone, Debug, PartialEq)]
pub struct RouteOptions {
    /// Explicit instance token; generated when `None`
    pub id: Option<String>,
    pub coordinates: Vec<LngLat>,
    pub color: String,
    pub width: f64,
    pub opacity: f64,
    /// Dash and gap lengths, in line widths
    pub dash_array: Option<[f64; 2]>,
    /// Reveal new paths frame by frame; turning this off mid-reveal draws the
    /// full path at once
    pub animated: bool,
    /// Reveal duration; the map's configured default when `None`. Read when a
    /// reveal starts.
    pub animation_duration: Option<Duration>,
    pub fit_bounds: bool,
    /// Camera fit options; padding defaults to the map's configured padding
    pub fit_bounds_options: Option<FitBoundsOptions>,
    pub interactive: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            id: None,
            coordinates: Vec::new(),
            color: "#4285F4".to_string(),
            width: 3.0,
            opacity: 0.8,
            dash_array: None,
            animated: false,
            animation_duration: None,
            fit_bounds: false,
            fit_bounds_options: None,
            interactive: true,
        }
    }
}

impl RouteOptions {
    pub fn new(coordinates: impl IntoIterator<Item = LngLat>) -> Self {
        Self {
            coordinates: coordinates.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn dash_array(mut self, dash: f64, gap: f64) -> Self {
        self.dash_array = Some([dash, gap]);
        self
    }

    pub fn animated(mut self, duration: Option<Duration>) -> Self {
        self.animated = true;
        self.animation_duration = duration;
        self
    }

    pub fn fit_bounds(mut self, options: Option<FitBoundsOptions>) -> Self {
        self.fit_bounds = true;
        self.fit_bounds_options = options;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    fn has_path(&self) -> bool {
        self.coordinates.len() >= 2
    }
}

/// Interaction callbacks of a route
#[derive(Default)]
pub struct RouteCallbacks {
    /// Receives the route vertex nearest to the cursor, on the cursor's side of
    /// the antimeridian
    pub on_click: Option<Rc<dyn Fn(LngLat)>>,
    pub on_mouse_enter: Option<Rc<dyn Fn()>>,
    pub on_mouse_leave: Option<Rc<dyn Fn()>>,
}

// =============================================================================
// BUNDLE
// =============================================================================

/// Engine resources of one route
pub struct RouteBundle {
    source_id: String,
    layer_id: String,
    listeners: Listeners,
    reveal: RouteReveal,
    callbacks: Rc<RefCell<RouteCallbacks>>,
    /// Path last pushed, used to anchor click coordinates
    path: Rc<RefCell<Vec<LngLat>>>,
}

impl RouteBundle {
    fn push_path(&mut self, cx: &BundleContext, options: &RouteOptions) {
        *self.path.borrow_mut() = options.coordinates.clone();

        if options.animated {
            let engine = Rc::clone(&cx.engine);
            let source_id = self.source_id.clone();
            let sink: RevealSink = Rc::new(move |prefix: &[LngLat]| {
                set_data_if_present(engine.as_ref(), &source_id, GeoJsonData::line_string(prefix));
            });
            let duration = options
                .animation_duration
                .unwrap_or_else(|| cx.config.route_animation());
            self.reveal.start(options.coordinates.clone(), duration, sink);
        } else {
            self.reveal.cancel();
            set_data_if_present(
                cx.engine.as_ref(),
                &self.source_id,
                GeoJsonData::line_string(&options.coordinates),
            );
        }
    }

    fn fit_camera(&self, cx: &BundleContext, options: &RouteOptions) {
        let Some(bounds) = LngLatBounds::from_points(&options.coordinates) else {
            return;
        };
        let fit = options.fit_bounds_options.unwrap_or(FitBoundsOptions {
            padding: cx.config.fit_bounds_padding,
            ..Default::default()
        });
        cx.engine.fit_bounds(bounds, fit);
    }

    fn register_handlers(&mut self, cx: &BundleContext) {
        let engine: Weak<dyn MapEngine> = Rc::downgrade(&cx.engine);

        let callbacks = Rc::clone(&self.callbacks);
        let path = Rc::clone(&self.path);
        self.listeners.on(
            cx.engine.as_ref(),
            LayerEventKind::Click,
            &self.layer_id,
            Rc::new(move |event: &LayerEvent| {
                let on_click = callbacks.borrow().on_click.clone();
                let Some(on_click) = on_click else {
                    return;
                };
                let anchor = {
                    let path = path.borrow();
                    nearest_vertex(&path, event.lng_lat).map(|index| path[index])
                };
                let position = anchor
                    .map(|vertex| vertex.wrapped_near(event.lng_lat.lng))
                    .unwrap_or(event.lng_lat);
                on_click(position);
            }),
        );

        let callbacks = Rc::clone(&self.callbacks);
        let enter_engine = engine.clone();
        self.listeners.on(
            cx.engine.as_ref(),
            LayerEventKind::MouseEnter,
            &self.layer_id,
            Rc::new(move |_: &LayerEvent| {
                if let Some(engine) = enter_engine.upgrade() {
                    engine.set_cursor(Cursor::Pointer);
                }
                let on_enter = callbacks.borrow().on_mouse_enter.clone();
                if let Some(on_enter) = on_enter {
                    on_enter();
                }
            }),
        );

        let callbacks = Rc::clone(&self.callbacks);
        self.listeners.on(
            cx.engine.as_ref(),
            LayerEventKind::MouseLeave,
            &self.layer_id,
            Rc::new(move |_: &LayerEvent| {
                if let Some(engine) = engine.upgrade() {
                    engine.set_cursor(Cursor::Default);
                }
                let on_leave = callbacks.borrow().on_mouse_leave.clone();
                if let Some(on_leave) = on_leave {
                    on_leave();
                }
            }),
        );
    }
}

fn dash_value(dash_array: Option<[f64; 2]>) -> Value {
    match dash_array {
        Some(dash) => json!(dash),
        None => Value::Null,
    }
}

impl ResourceBundle for RouteBundle {
    type Config = RouteOptions;
    const KIND: &'static str = "route";

    fn probe_source(&self) -> Option<&str> {
        Some(&self.source_id)
    }

    fn setup(&mut self, cx: &BundleContext, options: &RouteOptions) -> Result<(), EngineError> {
        cx.engine.add_source(
            &self.source_id,
            SourceSpec::GeoJson {
                data: GeoJsonData::line_string(&[]),
                cluster: None,
            },
        )?;

        let mut layer = LayerSpec::new(&self.layer_id, LayerKind::Line, &self.source_id)
            .layout("line-join", "round")
            .layout("line-cap", "round")
            .paint("line-color", options.color.as_str())
            .paint("line-width", options.width)
            .paint("line-opacity", options.opacity);
        if options.dash_array.is_some() {
            layer = layer.paint("line-dasharray", dash_value(options.dash_array));
        }
        cx.engine.add_layer(layer, None)?;

        if options.has_path() {
            self.push_path(cx, options);
            if options.fit_bounds {
                self.fit_camera(cx, options);
            }
        }

        if options.interactive {
            self.register_handlers(cx);
        }
        Ok(())
    }

    fn update(&mut self, cx: &BundleContext, previous: &RouteOptions, next: &RouteOptions) {
        let engine = cx.engine.as_ref();

        if previous.coordinates != next.coordinates {
            if next.has_path() {
                self.push_path(cx, next);
            } else {
                tracing::trace!(
                    points = next.coordinates.len(),
                    "route update ignored, fewer than two points"
                );
            }
        } else if previous.animated && !next.animated && self.reveal.is_running() {
            self.push_path(cx, next);
        }

        if previous.color != next.color {
            set_paint_if_present(engine, &self.layer_id, "line-color", json!(next.color));
        }
        if previous.width != next.width {
            set_paint_if_present(engine, &self.layer_id, "line-width", json!(next.width));
        }
        if previous.opacity != next.opacity {
            set_paint_if_present(engine, &self.layer_id, "line-opacity", json!(next.opacity));
        }
        if previous.dash_array != next.dash_array {
            set_paint_if_present(
                engine,
                &self.layer_id,
                "line-dasharray",
                dash_value(next.dash_array),
            );
        }

        match (previous.interactive, next.interactive) {
            (false, true) => self.register_handlers(cx),
            (true, false) => self.listeners.off_all(engine),
            _ => {}
        }
    }

    fn teardown(&mut self, cx: &BundleContext) {
        self.reveal.cancel();
        self.listeners.off_all(cx.engine.as_ref());
        remove_layer_quietly(cx.engine.as_ref(), &self.layer_id);
        remove_source_quietly(cx.engine.as_ref(), &self.source_id);
    }

    fn cancel_pending(&mut self, _scheduler: &dyn mapsync_core::host::HostScheduler) {
        self.reveal.cancel();
    }
}

// =============================================================================
// LAYER
// =============================================================================

/// A route drawn on the map
pub struct RouteLayer {
    binding: Binding<RouteBundle>,
    callbacks: Rc<RefCell<RouteCallbacks>>,
    source_id: String,
    layer_id: String,
}

impl RouteLayer {
    pub fn new(context: &MapContext, options: RouteOptions) -> Self {
        let namespace = context.namespace(options.id.as_deref());
        let source_id = namespace.id("route-source");
        let layer_id = namespace.id("route-layer");
        let callbacks = Rc::new(RefCell::new(RouteCallbacks::default()));

        let bundle = RouteBundle {
            source_id: source_id.clone(),
            layer_id: layer_id.clone(),
            listeners: Listeners::new(),
            reveal: RouteReveal::new(Rc::clone(&context.scheduler)),
            callbacks: Rc::clone(&callbacks),
            path: Rc::new(RefCell::new(Vec::new())),
        };

        Self {
            binding: Binding::new(context, bundle, options),
            callbacks,
            source_id,
            layer_id,
        }
    }

    /// Create a route under the nearest map of `scope`
    pub fn in_scope(
        registry: &ContextRegistry,
        scope: ScopeId,
        options: RouteOptions,
    ) -> mapsync_core::Result<Self> {
        Ok(Self::new(&registry.use_map(scope)?, options))
    }

    pub fn on_click(&self, callback: impl Fn(LngLat) + 'static) {
        self.callbacks.borrow_mut().on_click = Some(Rc::new(callback));
    }

    pub fn on_mouse_enter(&self, callback: impl Fn() + 'static) {
        self.callbacks.borrow_mut().on_mouse_enter = Some(Rc::new(callback));
    }

    pub fn on_mouse_leave(&self, callback: impl Fn() + 'static) {
        self.callbacks.borrow_mut().on_mouse_leave = Some(Rc::new(callback));
    }

    pub fn attach(&self) {
        self.binding.attach();
    }

    pub fn update(&self, options: RouteOptions) {
        self.binding.update(options);
    }

    pub fn detach(&self) {
        self.binding.detach();
    }

    pub fn is_setup(&self) -> bool {
        self.binding.is_setup()
    }

    pub fn state(&self) -> BindingState {
        self.binding.state()
    }

    pub fn options(&self) -> RouteOptions {
        self.binding.config()
    }

    /// Whether a reveal animation is in flight
    pub fn is_animating(&self) -> bool {
        self.binding.with_bundle(|bundle| bundle.reveal.is_running())
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RouteOptions::default();
        assert_eq!(options.color, "#4285F4");
        assert_eq!(options.width, 3.0);
        assert_eq!(options.opacity, 0.8);
        assert!(options.interactive);
        assert!(!options.animated);
        assert!(!options.has_path());
    }

    #[test]
    fn test_builder() {
        let options = RouteOptions::new([LngLat::new(0.0, 0.0), LngLat::new(1.0, 1.0)])
            .id("commute")
            .color("#ff0000")
            .dash_array(2.0, 1.0)
            .animated(Some(Duration::from_millis(500)))
            .interactive(false);
        assert!(options.has_path());
        assert_eq!(options.id.as_deref(), Some("commute"));
        assert_eq!(options.dash_array, Some([2.0, 1.0]));
        assert_eq!(options.animation_duration, Some(Duration::from_millis(500)));
        assert!(!options.interactive);
    }

    #[test]
    fn test_cleared_dash_is_null() {
        assert_eq!(dash_value(None), Value::Null);
        assert_eq!(dash_value(Some([2.0, 2.0])), json!([2.0, 2.0]));
    }
}
