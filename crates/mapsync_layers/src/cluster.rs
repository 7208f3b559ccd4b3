//! Cluster layer
//!
//! One clustered GeoJSON source feeding three layers, created in this order:
//!
//! 1. `clusters-{token}`: circles for clusters, colored and sized by a step
//!    expression over `point_count`
//! 2. `cluster-count-{token}`: abbreviated point counts on top of the circles
//! 3. `unclustered-point-{token}`: individual points
//!
//! Clicking a cluster either hands it to the caller or zooms the camera to the
//! level where the cluster splits. That zoom level comes from an asynchronous
//! engine query which runs as a local task, so the click handler returns at once.

use mapsync_core::binding::{Binding, BindingState, BundleContext, ResourceBundle};
use mapsync_core::context::{ContextRegistry, MapContext, ScopeId};
use mapsync_core::engine::{
    CameraTarget, ClusterOptions, Cursor, Feature, GeoJsonData, LayerEvent, LayerEventKind,
    LayerKind, LayerSpec, MapEngine, SourceSpec,
};
use mapsync_core::error::EngineError;
use mapsync_core::geo::LngLat;
use mapsync_core::host::HostScheduler;
use mapsync_core::resources::{
    remove_layer_quietly, remove_source_quietly, set_data_if_present, set_paint_if_present,
    Listeners,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Declarative description of a clustered point layer
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterLayerOptions {
    /// URL or inline `FeatureCollection` of points
    pub data: GeoJsonData,
    /// Highest zoom at which points are clustered; read once at setup
    pub cluster_max_zoom: u32,
    /// Cluster radius in pixels; read once at setup
    pub cluster_radius: u32,
    /// Colors for small, medium and large clusters
    pub cluster_colors: [String; 3],
    /// Point counts where the medium and large steps begin
    pub cluster_thresholds: [u64; 2],
    pub point_color: String,
}

impl Default for ClusterLayerOptions {
    fn default() -> Self {
        Self {
            data: GeoJsonData::Inline(json!({ "type": "FeatureCollection", "features": [] })),
            cluster_max_zoom: 14,
            cluster_radius: 50,
            cluster_colors: [
                "#22c55e".to_string(),
                "#eab308".to_string(),
                "#ef4444".to_string(),
            ],
            cluster_thresholds: [100, 750],
            point_color: "#3b82f6".to_string(),
        }
    }
}

impl ClusterLayerOptions {
    pub fn new(data: GeoJsonData) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    fn color_expression(&self) -> Value {
        let [small, medium, large] = &self.cluster_colors;
        let [first, second] = self.cluster_thresholds;
        json!(["step", ["get", "point_count"], small, first, medium, second, large])
    }

    fn radius_expression(&self) -> Value {
        let [first, second] = self.cluster_thresholds;
        json!(["step", ["get", "point_count"], 20, first, 30, second, 40])
    }
}

type PointClick = Rc<dyn Fn(&Feature, LngLat)>;
type ClusterClick = Rc<dyn Fn(u64, LngLat, u64)>;

/// Interaction callbacks of a cluster layer
#[derive(Default)]
pub struct ClusterCallbacks {
    /// Receives the clicked point and its coordinate on the cursor's side of the
    /// antimeridian
    pub on_point_click: Option<PointClick>,
    /// Receives cluster id, coordinate and point count; replaces the default zoom
    pub on_cluster_click: Option<ClusterClick>,
}

/// Engine resources of one cluster layer
pub struct ClusterBundle {
    source_id: String,
    clusters_id: String,
    count_id: String,
    points_id: String,
    listeners: Listeners,
    callbacks: Rc<RefCell<ClusterCallbacks>>,
}

impl ClusterBundle {
    fn register_handlers(&mut self, cx: &BundleContext) {
        let engine = cx.engine.as_ref();
        let weak: Weak<dyn MapEngine> = Rc::downgrade(&cx.engine);

        let handler = cluster_click_handler(
            weak.clone(),
            Rc::clone(&cx.scheduler),
            Rc::clone(&self.callbacks),
            self.source_id.clone(),
            self.clusters_id.clone(),
        );
        self.listeners
            .on(engine, LayerEventKind::Click, &self.clusters_id, handler);

        let callbacks = Rc::clone(&self.callbacks);
        self.listeners.on(
            engine,
            LayerEventKind::Click,
            &self.points_id,
            Rc::new(move |event: &LayerEvent| {
                let on_point_click = callbacks.borrow().on_point_click.clone();
                let Some(on_point_click) = on_point_click else {
                    return;
                };
                let Some(feature) = event.features.first() else {
                    return;
                };
                let Some(point) = feature.point() else {
                    return;
                };
                on_point_click(feature, point.wrapped_near(event.lng_lat.lng));
            }),
        );

        let cursor = |engine: Weak<dyn MapEngine>, cursor: Cursor| -> Rc<dyn Fn(&LayerEvent)> {
            Rc::new(move |_: &LayerEvent| {
                if let Some(engine) = engine.upgrade() {
                    engine.set_cursor(cursor);
                }
            })
        };
        self.listeners.on(
            engine,
            LayerEventKind::MouseEnter,
            &self.clusters_id,
            cursor(weak.clone(), Cursor::Pointer),
        );
        self.listeners.on(
            engine,
            LayerEventKind::MouseLeave,
            &self.clusters_id,
            cursor(weak.clone(), Cursor::Default),
        );

        // Points only look clickable when someone listens
        let callbacks = Rc::clone(&self.callbacks);
        let enter_engine = weak.clone();
        self.listeners.on(
            engine,
            LayerEventKind::MouseEnter,
            &self.points_id,
            Rc::new(move |_: &LayerEvent| {
                let clickable = callbacks.borrow().on_point_click.is_some();
                if clickable {
                    if let Some(engine) = enter_engine.upgrade() {
                        engine.set_cursor(Cursor::Pointer);
                    }
                }
            }),
        );
        self.listeners.on(
            engine,
            LayerEventKind::MouseLeave,
            &self.points_id,
            cursor(weak, Cursor::Default),
        );
    }
}

fn cluster_click_handler(
    engine: Weak<dyn MapEngine>,
    scheduler: Rc<dyn HostScheduler>,
    callbacks: Rc<RefCell<ClusterCallbacks>>,
    source_id: String,
    clusters_id: String,
) -> Rc<dyn Fn(&LayerEvent)> {
    Rc::new(move |event: &LayerEvent| {
        let Some(map) = engine.upgrade() else {
            return;
        };
        let features = map.query_rendered_features(event.point, &[clusters_id.as_str()]);
        let Some(feature) = features.first() else {
            return;
        };
        let (Some(cluster_id), Some(center)) = (feature.property_u64("cluster_id"), feature.point())
        else {
            return;
        };
        let point_count = feature.property_u64("point_count").unwrap_or(0);

        let on_cluster_click = callbacks.borrow().on_cluster_click.clone();
        if let Some(on_cluster_click) = on_cluster_click {
            on_cluster_click(cluster_id, center, point_count);
            return;
        }

        let query = map.cluster_expansion_zoom(&source_id, cluster_id);
        let engine = engine.clone();
        scheduler.spawn_local(Box::pin(async move {
            match query.await {
                Ok(zoom) => {
                    if let Some(engine) = engine.upgrade() {
                        engine.ease_to(CameraTarget {
                            center,
                            zoom: Some(zoom),
                        });
                    }
                }
                Err(err) => {
                    tracing::debug!(cluster_id, %err, "cluster expansion zoom unavailable");
                }
            }
        }));
    })
}

impl ResourceBundle for ClusterBundle {
    type Config = ClusterLayerOptions;
    const KIND: &'static str = "cluster";

    fn probe_source(&self) -> Option<&str> {
        Some(&self.source_id)
    }

    fn setup(
        &mut self,
        cx: &BundleContext,
        options: &ClusterLayerOptions,
    ) -> Result<(), EngineError> {
        let engine = cx.engine.as_ref();
        engine.add_source(
            &self.source_id,
            SourceSpec::GeoJson {
                data: options.data.clone(),
                cluster: Some(ClusterOptions {
                    max_zoom: options.cluster_max_zoom,
                    radius: options.cluster_radius,
                }),
            },
        )?;

        engine.add_layer(
            LayerSpec::new(&self.clusters_id, LayerKind::Circle, &self.source_id)
                .filter(json!(["has", "point_count"]))
                .paint("circle-color", options.color_expression())
                .paint("circle-radius", options.radius_expression())
                .paint("circle-stroke-width", 1)
                .paint("circle-stroke-color", "#fff")
                .paint("circle-opacity", 0.85),
            None,
        )?;

        engine.add_layer(
            LayerSpec::new(&self.count_id, LayerKind::Symbol, &self.source_id)
                .filter(json!(["has", "point_count"]))
                .layout("text-field", "{point_count_abbreviated}")
                .layout("text-size", 12)
                .paint("text-color", "#fff"),
            None,
        )?;

        engine.add_layer(
            LayerSpec::new(&self.points_id, LayerKind::Circle, &self.source_id)
                .filter(json!(["!", ["has", "point_count"]]))
                .paint("circle-color", options.point_color.as_str())
                .paint("circle-radius", 5)
                .paint("circle-stroke-width", 2)
                .paint("circle-stroke-color", "#fff"),
            None,
        )?;

        self.register_handlers(cx);
        Ok(())
    }

    fn update(
        &mut self,
        cx: &BundleContext,
        previous: &ClusterLayerOptions,
        next: &ClusterLayerOptions,
    ) {
        let engine = cx.engine.as_ref();

        if previous.data != next.data {
            match &next.data {
                GeoJsonData::Inline(_) => {
                    set_data_if_present(engine, &self.source_id, next.data.clone());
                }
                GeoJsonData::Url(_) => {
                    tracing::trace!("cluster data URL changes are not applied after setup");
                }
            }
        }

        let thresholds_changed = previous.cluster_thresholds != next.cluster_thresholds;
        if thresholds_changed || previous.cluster_colors != next.cluster_colors {
            set_paint_if_present(engine, &self.clusters_id, "circle-color", next.color_expression());
        }
        if thresholds_changed {
            set_paint_if_present(engine, &self.clusters_id, "circle-radius", next.radius_expression());
        }
        if previous.point_color != next.point_color {
            set_paint_if_present(engine, &self.points_id, "circle-color", json!(next.point_color));
        }

        if previous.cluster_max_zoom != next.cluster_max_zoom
            || previous.cluster_radius != next.cluster_radius
        {
            tracing::trace!("cluster source options are fixed after setup");
        }
    }

    fn teardown(&mut self, cx: &BundleContext) {
        let engine = cx.engine.as_ref();
        self.listeners.off_all(engine);
        remove_layer_quietly(engine, &self.points_id);
        remove_layer_quietly(engine, &self.count_id);
        remove_layer_quietly(engine, &self.clusters_id);
        remove_source_quietly(engine, &self.source_id);
    }
}

/// A clustered point layer on the map
pub struct ClusterLayer {
    binding: Binding<ClusterBundle>,
    callbacks: Rc<RefCell<ClusterCallbacks>>,
    source_id: String,
    layer_ids: [String; 3],
}

impl ClusterLayer {
    pub fn new(context: &MapContext, options: ClusterLayerOptions) -> Self {
        let namespace = context.namespace(None);
        let callbacks = Rc::new(RefCell::new(ClusterCallbacks::default()));
        let bundle = ClusterBundle {
            source_id: namespace.id("cluster-source"),
            clusters_id: namespace.id("clusters"),
            count_id: namespace.id("cluster-count"),
            points_id: namespace.id("unclustered-point"),
            listeners: Listeners::new(),
            callbacks: Rc::clone(&callbacks),
        };
        let source_id = bundle.source_id.clone();
        let layer_ids = [
            bundle.clusters_id.clone(),
            bundle.count_id.clone(),
            bundle.points_id.clone(),
        ];

        Self {
            binding: Binding::new(context, bundle, options),
            callbacks,
            source_id,
            layer_ids,
        }
    }

    /// Create a cluster layer under the nearest map of `scope`
    pub fn in_scope(
        registry: &ContextRegistry,
        scope: ScopeId,
        options: ClusterLayerOptions,
    ) -> mapsync_core::Result<Self> {
        Ok(Self::new(&registry.use_map(scope)?, options))
    }

    pub fn on_point_click(&self, callback: impl Fn(&Feature, LngLat) + 'static) {
        self.callbacks.borrow_mut().on_point_click = Some(Rc::new(callback));
    }

    pub fn on_cluster_click(&self, callback: impl Fn(u64, LngLat, u64) + 'static) {
        self.callbacks.borrow_mut().on_cluster_click = Some(Rc::new(callback));
    }

    pub fn attach(&self) {
        self.binding.attach();
    }

    pub fn update(&self, options: ClusterLayerOptions) {
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

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Cluster circle, count label and unclustered point layer ids, in creation order
    pub fn layer_ids(&self) -> [&str; 3] {
        [
            self.layer_ids[0].as_str(),
            self.layer_ids[1].as_str(),
            self.layer_ids[2].as_str(),
        ]
    }
}
