//! Test harness
//!
//! Provides an in-memory map engine and a scheduler that only advances on demand.

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use mapsync_core::config::SyncConfig;
use mapsync_core::context::MapContext;
use mapsync_core::custom::{CustomLayer, GraphicsContext, PointSprites, SceneRenderer};
use mapsync_core::engine::{
    CameraTarget, Compositor, CompositorFactory, CompositorOptions, ControlId, Cursor, Feature,
    FitBoundsOptions, GeoJsonData, GpuLayer, LayerEvent, LayerEventHandler, LayerEventKind,
    LayerSpec, ListenerId, MapEngine, SourceSpec,
};
use mapsync_core::error::EngineError;
use mapsync_core::geo::{LngLat, LngLatBounds, ScreenPoint};
use mapsync_core::host::{
    FrameCallback, FrameToken, HostScheduler, LocalBoxFuture, TimerCallback, TimerToken,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Interval between frames produced by [`ManualScheduler::run_frame`]
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

// =============================================================================
// RECORDING ENGINE
// =============================================================================

/// A mutating engine call, as logged by [`RecordingEngine`]
///
/// Calls are logged whether or not the engine accepted them.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    AddSource { id: String, source: SourceSpec },
    RemoveSource(String),
    SetData { source_id: String, data: GeoJsonData },
    UpdateImage {
        source_id: String,
        url: String,
        coordinates: [LngLat; 4],
    },
    AddLayer { layer: LayerSpec, before_id: Option<String> },
    RemoveLayer(String),
    SetPaint {
        layer_id: String,
        property: String,
        value: Value,
    },
    AddCustomLayer { id: String, before_id: Option<String> },
    On { event: LayerEventKind, layer_id: String },
    Off { event: LayerEventKind, layer_id: String },
    SetCursor(Cursor),
    EaseTo(CameraTarget),
    FitBounds {
        bounds: LngLatBounds,
        options: FitBoundsOptions,
    },
    TriggerRepaint,
    AddControl,
    RemoveControl,
}

impl EngineCall {
    pub fn is_paint(&self) -> bool {
        matches!(self, EngineCall::SetPaint { .. })
    }

    /// Removal of a layer or a source
    pub fn is_removal(&self) -> bool {
        matches!(self, EngineCall::RemoveLayer(_) | EngineCall::RemoveSource(_))
    }
}

struct ListenerEntry {
    event: LayerEventKind,
    layer_id: String,
    handler: LayerEventHandler,
}

/// In-memory map engine
///
/// Keeps the same bookkeeping a real engine does (duplicate and missing ids are
/// rejected) and logs every mutating call.
pub struct RecordingEngine {
    calls: RefCell<Vec<EngineCall>>,
    sources: RefCell<FxHashMap<String, SourceSpec>>,
    /// Layer ids in render order, bottom first
    layers: RefCell<Vec<String>>,
    paint: RefCell<FxHashMap<String, Map<String, Value>>>,
    listeners: RefCell<FxHashMap<u64, ListenerEntry>>,
    custom_layers: RefCell<Vec<Rc<RefCell<dyn CustomLayer>>>>,
    controls: RefCell<FxHashMap<u64, Rc<dyn Compositor>>>,
    next_id: Cell<u64>,
    cursor: Cell<Cursor>,
    rendered_features: RefCell<Vec<Feature>>,
    expansion_zoom: RefCell<Result<f64, EngineError>>,
    failing_layers: RefCell<FxHashSet<String>>,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            sources: RefCell::new(FxHashMap::default()),
            layers: RefCell::new(Vec::new()),
            paint: RefCell::new(FxHashMap::default()),
            listeners: RefCell::new(FxHashMap::default()),
            custom_layers: RefCell::new(Vec::new()),
            controls: RefCell::new(FxHashMap::default()),
            next_id: Cell::new(1),
            cursor: Cell::new(Cursor::Default),
            rendered_features: RefCell::new(Vec::new()),
            expansion_zoom: RefCell::new(Ok(0.0)),
            failing_layers: RefCell::new(FxHashSet::default()),
        }
    }

    // ========== Inspection ==========

    /// Every mutating call so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.borrow().clone()
    }

    /// Return the call log and start a fresh one
    pub fn take_calls(&self) -> Vec<EngineCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Layer ids in render order, bottom first
    pub fn layer_ids(&self) -> Vec<String> {
        self.layers.borrow().clone()
    }

    pub fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    pub fn source(&self, id: &str) -> Option<SourceSpec> {
        self.sources.borrow().get(id).cloned()
    }

    /// Coordinates of a GeoJSON source holding a single `LineString` feature
    pub fn line_coordinates(&self, source_id: &str) -> Option<Vec<[f64; 2]>> {
        let Some(SourceSpec::GeoJson {
            data: GeoJsonData::Inline(value),
            ..
        }) = self.source(source_id)
        else {
            return None;
        };
        serde_json::from_value(value["geometry"]["coordinates"].clone()).ok()
    }

    pub fn paint_value(&self, layer_id: &str, property: &str) -> Option<Value> {
        self.paint
            .borrow()
            .get(layer_id)
            .and_then(|paint| paint.get(property))
            .cloned()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn control_count(&self) -> usize {
        self.controls.borrow().len()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor.get()
    }

    pub fn custom_layer(&self, id: &str) -> Option<Rc<RefCell<dyn CustomLayer>>> {
        self.custom_layers
            .borrow()
            .iter()
            .find(|layer| layer.borrow().id() == id)
            .cloned()
    }

    // ========== Scripting ==========

    /// Features returned by every subsequent `query_rendered_features`
    pub fn set_rendered_features(&self, features: Vec<Feature>) {
        *self.rendered_features.borrow_mut() = features;
    }

    /// Result of every subsequent `cluster_expansion_zoom`
    pub fn set_expansion_zoom(&self, result: Result<f64, EngineError>) {
        *self.expansion_zoom.borrow_mut() = result;
    }

    /// Make `add_layer` reject this layer id
    pub fn fail_layer(&self, id: &str) {
        self.failing_layers.borrow_mut().insert(id.to_string());
    }

    /// Deliver `event` to every listener registered for it on `layer_id`
    ///
    /// Returns the number of handlers called.
    pub fn emit(&self, event: LayerEventKind, layer_id: &str, payload: &LayerEvent) -> usize {
        let mut handlers: Vec<(u64, LayerEventHandler)> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.event == event && entry.layer_id == layer_id)
            .map(|(id, entry)| (*id, Rc::clone(&entry.handler)))
            .collect();
        handlers.sort_by_key(|(id, _)| *id);

        tracing::trace!(event = event.as_str(), layer_id, handlers = handlers.len(), "emit");
        for (_, handler) in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    fn record(&self, call: EngineCall) {
        self.calls.borrow_mut().push(call);
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn insert_layer(&self, id: &str, before_id: Option<&str>) {
        let mut layers = self.layers.borrow_mut();
        let position = before_id.and_then(|before| layers.iter().position(|l| l == before));
        match position {
            Some(index) => layers.insert(index, id.to_string()),
            None => layers.push(id.to_string()),
        }
    }
}

impl fmt::Debug for RecordingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingEngine")
            .field("calls", &self.calls.borrow().len())
            .field("sources", &self.sources.borrow().len())
            .field("layers", &self.layers.borrow())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl MapEngine for RecordingEngine {
    fn add_source(&self, id: &str, source: SourceSpec) -> Result<(), EngineError> {
        self.record(EngineCall::AddSource {
            id: id.to_string(),
            source: source.clone(),
        });
        let mut sources = self.sources.borrow_mut();
        if sources.contains_key(id) {
            return Err(EngineError::DuplicateSource(id.to_string()));
        }
        sources.insert(id.to_string(), source);
        Ok(())
    }

    fn remove_source(&self, id: &str) -> Result<(), EngineError> {
        self.record(EngineCall::RemoveSource(id.to_string()));
        match self.sources.borrow_mut().remove(id) {
            Some(_) => Ok(()),
            None => Err(EngineError::MissingSource(id.to_string())),
        }
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.borrow().contains_key(id)
    }

    fn set_geojson_data(&self, source_id: &str, data: GeoJsonData) -> Result<(), EngineError> {
        self.record(EngineCall::SetData {
            source_id: source_id.to_string(),
            data: data.clone(),
        });
        match self.sources.borrow_mut().get_mut(source_id) {
            Some(SourceSpec::GeoJson { data: current, .. }) => {
                *current = data;
                Ok(())
            }
            Some(_) => Err(EngineError::Other(format!("`{source_id}` is not a GeoJSON source"))),
            None => Err(EngineError::MissingSource(source_id.to_string())),
        }
    }

    fn update_image(
        &self,
        source_id: &str,
        url: &str,
        coordinates: [LngLat; 4],
    ) -> Result<(), EngineError> {
        self.record(EngineCall::UpdateImage {
            source_id: source_id.to_string(),
            url: url.to_string(),
            coordinates,
        });
        match self.sources.borrow_mut().get_mut(source_id) {
            Some(SourceSpec::Image {
                url: current_url,
                coordinates: current,
            }) => {
                *current_url = url.to_string();
                *current = coordinates;
                Ok(())
            }
            Some(_) => Err(EngineError::Other(format!("`{source_id}` is not an image source"))),
            None => Err(EngineError::MissingSource(source_id.to_string())),
        }
    }

    fn cluster_expansion_zoom(
        &self,
        source_id: &str,
        _cluster_id: u64,
    ) -> LocalBoxFuture<'static, Result<f64, EngineError>> {
        let result = if self.has_source(source_id) {
            self.expansion_zoom.borrow().clone()
        } else {
            Err(EngineError::MissingSource(source_id.to_string()))
        };
        Box::pin(futures::future::ready(result))
    }

    fn add_layer(&self, layer: LayerSpec, before_id: Option<&str>) -> Result<(), EngineError> {
        self.record(EngineCall::AddLayer {
            layer: layer.clone(),
            before_id: before_id.map(str::to_string),
        });
        if self.failing_layers.borrow().contains(&layer.id) {
            return Err(EngineError::Other(format!("layer `{}` rejected", layer.id)));
        }
        if self.has_layer(&layer.id) {
            return Err(EngineError::DuplicateLayer(layer.id));
        }
        if !self.has_source(&layer.source) {
            return Err(EngineError::MissingSource(layer.source));
        }
        self.insert_layer(&layer.id, before_id);
        self.paint.borrow_mut().insert(layer.id, layer.paint);
        Ok(())
    }

    fn remove_layer(&self, id: &str) -> Result<(), EngineError> {
        self.record(EngineCall::RemoveLayer(id.to_string()));
        let mut layers = self.layers.borrow_mut();
        let Some(index) = layers.iter().position(|l| l == id) else {
            return Err(EngineError::MissingLayer(id.to_string()));
        };
        layers.remove(index);
        self.paint.borrow_mut().remove(id);
        self.custom_layers
            .borrow_mut()
            .retain(|layer| layer.borrow().id() != id);
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.borrow().iter().any(|l| l == id)
    }

    fn set_paint_property(
        &self,
        layer_id: &str,
        property: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::SetPaint {
            layer_id: layer_id.to_string(),
            property: property.to_string(),
            value: value.clone(),
        });
        match self.paint.borrow_mut().get_mut(layer_id) {
            Some(paint) => {
                paint.insert(property.to_string(), value);
                Ok(())
            }
            None => Err(EngineError::MissingLayer(layer_id.to_string())),
        }
    }

    fn add_custom_layer(
        &self,
        layer: Rc<RefCell<dyn CustomLayer>>,
        before_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let id = layer.borrow().id().to_string();
        self.record(EngineCall::AddCustomLayer {
            id: id.clone(),
            before_id: before_id.map(str::to_string),
        });
        if self.has_layer(&id) {
            return Err(EngineError::DuplicateLayer(id));
        }
        self.insert_layer(&id, before_id);
        self.custom_layers.borrow_mut().push(layer);
        Ok(())
    }

    fn on(&self, event: LayerEventKind, layer_id: &str, handler: LayerEventHandler) -> ListenerId {
        self.record(EngineCall::On {
            event,
            layer_id: layer_id.to_string(),
        });
        let id = self.next_id();
        self.listeners.borrow_mut().insert(
            id,
            ListenerEntry {
                event,
                layer_id: layer_id.to_string(),
                handler,
            },
        );
        ListenerId(id)
    }

    fn off(&self, event: LayerEventKind, layer_id: &str, listener: ListenerId) {
        self.record(EngineCall::Off {
            event,
            layer_id: layer_id.to_string(),
        });
        self.listeners.borrow_mut().remove(&listener.0);
    }

    fn query_rendered_features(&self, _point: ScreenPoint, layers: &[&str]) -> Vec<Feature> {
        if layers.iter().any(|id| !self.has_layer(id)) {
            return Vec::new();
        }
        self.rendered_features.borrow().clone()
    }

    fn set_cursor(&self, cursor: Cursor) {
        self.record(EngineCall::SetCursor(cursor));
        self.cursor.set(cursor);
    }

    fn ease_to(&self, target: CameraTarget) {
        self.record(EngineCall::EaseTo(target));
    }

    fn fit_bounds(&self, bounds: LngLatBounds, options: FitBoundsOptions) {
        self.record(EngineCall::FitBounds { bounds, options });
    }

    fn trigger_repaint(&self) {
        self.record(EngineCall::TriggerRepaint);
    }

    fn add_control(&self, control: Rc<dyn Compositor>) -> Result<ControlId, EngineError> {
        self.record(EngineCall::AddControl);
        let id = self.next_id();
        self.controls.borrow_mut().insert(id, control);
        Ok(ControlId(id))
    }

    fn remove_control(&self, id: ControlId) -> Result<(), EngineError> {
        self.record(EngineCall::RemoveControl);
        match self.controls.borrow_mut().remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(EngineError::Other(format!("unknown control {}", id.0))),
        }
    }
}

// =============================================================================
// MANUAL SCHEDULER
// =============================================================================

/// Host scheduler driven explicitly by the test
///
/// Frames run on [`run_frame`](Self::run_frame), timers on
/// [`advance`](Self::advance), local tasks on [`run_tasks`](Self::run_tasks).
pub struct ManualScheduler {
    next_token: Cell<u64>,
    now: Cell<Duration>,
    frames: RefCell<Vec<(FrameToken, FrameCallback)>>,
    timers: RefCell<Vec<(TimerToken, Duration, TimerCallback)>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            next_token: Cell::new(1),
            now: Cell::new(Duration::ZERO),
            frames: RefCell::new(Vec::new()),
            timers: RefCell::new(Vec::new()),
            pool: RefCell::new(pool),
            spawner,
        }
    }

    /// Current host time
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Advance one frame interval and run the frame callbacks requested so far
    ///
    /// Frames requested by these callbacks wait for the next call. Returns the
    /// number of callbacks run.
    pub fn run_frame(&self) -> usize {
        self.run_frame_at(self.now.get() + FRAME_INTERVAL)
    }

    /// Run pending frame callbacks with an explicit timestamp
    pub fn run_frame_at(&self, timestamp: Duration) -> usize {
        self.now.set(timestamp.max(self.now.get()));
        let batch = std::mem::take(&mut *self.frames.borrow_mut());
        let count = batch.len();
        for (_, callback) in batch {
            callback(timestamp);
        }
        count
    }

    /// Run frames until none are requested, at most `limit` of them
    pub fn run_frames(&self, limit: usize) -> usize {
        let mut frames = 0;
        while frames < limit && self.pending_frames() > 0 {
            self.run_frame();
            frames += 1;
        }
        frames
    }

    /// Move time forward, firing due timers in deadline order
    ///
    /// Returns the number of timers fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now.get() + by;
        let mut fired = 0;
        loop {
            let next = {
                let mut timers = self.timers.borrow_mut();
                let due = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, deadline, _))| *deadline <= target)
                    .min_by_key(|(_, (token, deadline, _))| (*deadline, token.0))
                    .map(|(index, _)| index);
                due.map(|index| timers.remove(index))
            };
            let Some((_, deadline, callback)) = next else {
                break;
            };
            self.now.set(deadline);
            callback();
            fired += 1;
        }
        self.now.set(target);
        fired
    }

    /// Poll spawned local tasks until none can make progress
    pub fn run_tasks(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    fn token(&self) -> u64 {
        let token = self.next_token.get();
        self.next_token.set(token + 1);
        token
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now.get())
            .field("frames", &self.pending_frames())
            .field("timers", &self.pending_timers())
            .finish()
    }
}

impl HostScheduler for ManualScheduler {
    fn request_frame(&self, callback: FrameCallback) -> FrameToken {
        let token = FrameToken(self.token());
        self.frames.borrow_mut().push((token, callback));
        token
    }

    fn cancel_frame(&self, token: FrameToken) {
        self.frames.borrow_mut().retain(|(t, _)| *t != token);
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerToken {
        let token = TimerToken(self.token());
        let deadline = self.now.get() + delay;
        self.timers.borrow_mut().push((token, deadline, callback));
        token
    }

    fn clear_timeout(&self, token: TimerToken) {
        self.timers.borrow_mut().retain(|(t, _, _)| *t != token);
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(err) = self.spawner.spawn_local(task) {
            tracing::warn!(%err, "local task rejected");
        }
    }
}

// =============================================================================
// COMPOSITOR
// =============================================================================

/// Compositor that records every layer list it accepts
#[derive(Debug)]
pub struct FakeCompositor {
    pub options: CompositorOptions,
    pushes: RefCell<Vec<Vec<GpuLayer>>>,
    /// Remaining `set_layers` calls to reject
    rejections: Cell<u32>,
    rejected: Cell<u32>,
}

impl FakeCompositor {
    /// Every layer list received through `set_layers`
    pub fn pushes(&self) -> Vec<Vec<GpuLayer>> {
        self.pushes.borrow().clone()
    }

    pub fn last_layers(&self) -> Option<Vec<GpuLayer>> {
        self.pushes.borrow().last().cloned()
    }

    /// Number of layer lists refused
    pub fn rejected(&self) -> u32 {
        self.rejected.get()
    }
}

impl Compositor for FakeCompositor {
    fn set_layers(&self, layers: &[GpuLayer]) -> Result<(), EngineError> {
        let rejections = self.rejections.get();
        if rejections > 0 {
            self.rejections.set(rejections - 1);
            self.rejected.set(self.rejected.get() + 1);
            return Err(EngineError::Compositor("viewport not ready".to_string()));
        }
        self.pushes.borrow_mut().push(layers.to_vec());
        Ok(())
    }
}

/// Compositor factory whose first `n` constructions fail
#[derive(Debug, Default)]
pub struct FakeCompositorFactory {
    failures: Cell<u32>,
    /// `set_layers` rejections handed to each created compositor
    layer_rejections: Cell<u32>,
    attempts: Cell<u32>,
    created: RefCell<Vec<Rc<FakeCompositor>>>,
}

impl FakeCompositorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that fails the next `failures` constructions
    pub fn failing(failures: u32) -> Self {
        let factory = Self::default();
        factory.failures.set(failures);
        factory
    }

    /// A factory whose compositors reject their first `rejections` layer lists
    pub fn rejecting_layers(rejections: u32) -> Self {
        let factory = Self::default();
        factory.layer_rejections.set(rejections);
        factory
    }

    /// Construction attempts, successful or not
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    pub fn created(&self) -> Vec<Rc<FakeCompositor>> {
        self.created.borrow().clone()
    }

    pub fn last(&self) -> Option<Rc<FakeCompositor>> {
        self.created.borrow().last().cloned()
    }
}

impl CompositorFactory for FakeCompositorFactory {
    fn create(&self, options: CompositorOptions) -> Result<Rc<dyn Compositor>, EngineError> {
        self.attempts.set(self.attempts.get() + 1);
        let failures = self.failures.get();
        if failures > 0 {
            self.failures.set(failures - 1);
            return Err(EngineError::Compositor("context lost".to_string()));
        }
        let compositor = Rc::new(FakeCompositor {
            options,
            pushes: RefCell::new(Vec::new()),
            rejections: Cell::new(self.layer_rejections.get()),
            rejected: Cell::new(0),
        });
        self.created.borrow_mut().push(Rc::clone(&compositor));
        Ok(compositor)
    }
}

// =============================================================================
// GRAPHICS
// =============================================================================

/// What a fake scene renderer was asked to do
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RendererLog {
    /// Number of points in the last upload
    pub points: Option<usize>,
    pub panorama: Option<(String, f32)>,
    pub draws: Vec<[f32; 16]>,
    pub disposed: bool,
}

struct FakeRenderer {
    log: Rc<RefCell<RendererLog>>,
    fail_panorama: bool,
}

impl SceneRenderer for FakeRenderer {
    fn upload_points(&mut self, points: &PointSprites) -> Result<(), EngineError> {
        self.log.borrow_mut().points = Some(points.len());
        Ok(())
    }

    fn load_panorama(&mut self, url: &str, brightness: f32) -> Result<(), EngineError> {
        if self.fail_panorama {
            return Err(EngineError::Graphics(format!("cannot load {url}")));
        }
        self.log.borrow_mut().panorama = Some((url.to_string(), brightness));
        Ok(())
    }

    fn draw(&mut self, view_projection: &[f32; 16]) {
        self.log.borrow_mut().draws.push(*view_projection);
    }

    fn dispose(&mut self) {
        self.log.borrow_mut().disposed = true;
    }
}

/// Graphics context handing out logging renderers
#[derive(Debug, Default)]
pub struct FakeGraphics {
    fail_renderer: bool,
    fail_panorama: bool,
    /// Number of `reset_state` calls
    pub resets: usize,
    renderers: Vec<Rc<RefCell<RendererLog>>>,
}

impl FakeGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that refuses to create renderers
    pub fn without_renderer() -> Self {
        Self {
            fail_renderer: true,
            ..Default::default()
        }
    }

    /// A context whose renderers cannot load panoramas
    pub fn without_panorama() -> Self {
        Self {
            fail_panorama: true,
            ..Default::default()
        }
    }

    /// Log of the `index`-th renderer created
    pub fn renderer(&self, index: usize) -> Option<RendererLog> {
        self.renderers.get(index).map(|log| log.borrow().clone())
    }

    pub fn renderer_count(&self) -> usize {
        self.renderers.len()
    }
}

impl GraphicsContext for FakeGraphics {
    fn create_scene_renderer(&mut self) -> Result<Box<dyn SceneRenderer>, EngineError> {
        if self.fail_renderer {
            return Err(EngineError::Graphics("no WebGL context".to_string()));
        }
        let log = Rc::new(RefCell::new(RendererLog::default()));
        self.renderers.push(Rc::clone(&log));
        Ok(Box::new(FakeRenderer {
            log,
            fail_panorama: self.fail_panorama,
        }))
    }

    fn reset_state(&mut self) {
        self.resets += 1;
    }
}

// =============================================================================
// TEST MAP
// =============================================================================

/// One map context wired to a recording engine and a manual scheduler
pub struct TestMap {
    pub engine: Rc<RecordingEngine>,
    pub scheduler: Rc<ManualScheduler>,
    pub context: MapContext,
}

impl Default for TestMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TestMap {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let engine = Rc::new(RecordingEngine::new());
        let scheduler = Rc::new(ManualScheduler::new());
        let context = MapContext::with_config(scheduler.clone(), config);
        Self {
            engine,
            scheduler,
            context,
        }
    }

    /// The engine as the bindings see it
    pub fn engine_handle(&self) -> Rc<dyn MapEngine> {
        self.engine.clone()
    }

    /// Hand the engine to the readiness gate without marking anything loaded
    pub fn set_engine(&self) {
        self.context.gate.set_engine(Some(self.engine_handle()));
    }

    /// Hand over the engine and report both load milestones
    pub fn ready(&self) {
        self.set_engine();
        self.context.gate.mark_engine_ready();
        self.context.gate.mark_style_ready();
    }
}

impl fmt::Debug for TestMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMap")
            .field("engine", &self.engine)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
