//! Map engine contract
//!
//! The engine is an imperative, stateful rendering surface that owns named
//! sources, named layers and per-layer event listeners. mapsync never renders
//! anything itself; it only drives an implementation of [`MapEngine`].
//!
//! Engine methods take `&self`: the engine is a shared handle observed by many
//! bindings at once, and interior mutability is the implementor's concern.
//! Calls that the real engine rejects (duplicate ids, missing ids) return an
//! [`EngineError`] instead of panicking.

use crate::custom::CustomLayer;
use crate::error::EngineError;
use crate::geo::{LngLat, LngLatBounds, ScreenPoint};
use futures::future::LocalBoxFuture;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// SOURCES
// =============================================================================

/// GeoJSON payload for a source: either a URL the engine fetches itself or an
/// inline document
#[derive(Clone, Debug, PartialEq)]
pub enum GeoJsonData {
    Url(String),
    Inline(Value),
}

impl GeoJsonData {
    /// A single `LineString` feature with no properties
    pub fn line_string(coordinates: &[LngLat]) -> Self {
        let coordinates: Vec<[f64; 2]> = coordinates.iter().map(|c| c.to_array()).collect();
        GeoJsonData::Inline(serde_json::json!({
            "type": "Feature",
            "properties": {},
            "geometry": { "type": "LineString", "coordinates": coordinates },
        }))
    }
}

/// Clustering options of a GeoJSON source
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterOptions {
    pub max_zoom: u32,
    pub radius: u32,
}

/// Descriptor passed to [`MapEngine::add_source`]
#[derive(Clone, Debug, PartialEq)]
pub enum SourceSpec {
    GeoJson {
        data: GeoJsonData,
        cluster: Option<ClusterOptions>,
    },
    Image {
        url: String,
        coordinates: [LngLat; 4],
    },
}

// =============================================================================
// LAYERS
// =============================================================================

/// Rendering type of a layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Line,
    Circle,
    Symbol,
    Raster,
    Fill,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Line => "line",
            LayerKind::Circle => "circle",
            LayerKind::Symbol => "symbol",
            LayerKind::Raster => "raster",
            LayerKind::Fill => "fill",
        }
    }
}

/// Descriptor passed to [`MapEngine::add_layer`]
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub kind: LayerKind,
    pub source: String,
    pub filter: Option<Value>,
    pub layout: Map<String, Value>,
    pub paint: Map<String, Value>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, kind: LayerKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            filter: None,
            layout: Map::new(),
            paint: Map::new(),
        }
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn layout(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.layout.insert(property.to_string(), value.into());
        self
    }

    pub fn paint(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.paint.insert(property.to_string(), value.into());
        self
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Per-layer interaction events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerEventKind {
    Click,
    MouseEnter,
    MouseLeave,
}

impl LayerEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerEventKind::Click => "click",
            LayerEventKind::MouseEnter => "mouseenter",
            LayerEventKind::MouseLeave => "mouseleave",
        }
    }
}

/// Geometry of a rendered feature, reduced to what bindings read
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(LngLat),
    LineString(Vec<LngLat>),
    Other,
}

/// A feature as reported by the engine for hit testing
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Feature {
    pub id: Option<Value>,
    pub properties: Map<String, Value>,
    pub geometry: Option<Geometry>,
}

impl Feature {
    /// Coordinate of a point feature
    pub fn point(&self) -> Option<LngLat> {
        match self.geometry {
            Some(Geometry::Point(point)) => Some(point),
            _ => None,
        }
    }

    pub fn property_u64(&self, key: &str) -> Option<u64> {
        self.properties.get(key).and_then(Value::as_u64)
    }
}

/// An interaction event delivered to a layer listener
#[derive(Clone, Debug, Default)]
pub struct LayerEvent {
    /// Cursor position on the canvas
    pub point: ScreenPoint,
    /// Cursor position on the map
    pub lng_lat: LngLat,
    /// Features under the cursor, topmost first
    pub features: Vec<Feature>,
}

/// Listener callback registered with [`MapEngine::on`]
pub type LayerEventHandler = Rc<dyn Fn(&LayerEvent)>;

/// Engine-issued identifier of a registered listener, used to deregister it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Canvas cursor style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cursor {
    #[default]
    Default,
    Pointer,
}

// =============================================================================
// CAMERA
// =============================================================================

/// Target of an animated camera move
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraTarget {
    pub center: LngLat,
    pub zoom: Option<f64>,
}

/// Options for [`MapEngine::fit_bounds`]
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FitBoundsOptions {
    pub padding: f64,
    pub max_zoom: Option<f64>,
    pub duration_ms: Option<u64>,
}

impl Default for FitBoundsOptions {
    fn default() -> Self {
        Self {
            padding: 50.0,
            max_zoom: None,
            duration_ms: None,
        }
    }
}

// =============================================================================
// GPU OVERLAY COMPOSITOR
// =============================================================================

/// A layer handed to the GPU overlay compositor
///
/// The compositor owns the meaning of `kind` and `props`; bindings only diff them.
#[derive(Clone, Debug, PartialEq)]
pub struct GpuLayer {
    pub id: String,
    pub kind: String,
    pub props: Value,
}

impl GpuLayer {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, props: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            props,
        }
    }
}

/// Construction options of a compositor
#[derive(Clone, Debug, PartialEq)]
pub struct CompositorOptions {
    pub layers: Vec<GpuLayer>,
    pub interleaved: bool,
    pub use_device_pixels: bool,
}

/// A GPU overlay compositor attached to the engine as a control
pub trait Compositor {
    /// Replace the compositor's layer list
    fn set_layers(&self, layers: &[GpuLayer]) -> Result<(), EngineError>;
}

/// Creates compositors; construction may fail on some GPU contexts
pub trait CompositorFactory {
    fn create(&self, options: CompositorOptions) -> Result<Rc<dyn Compositor>, EngineError>;
}

/// Engine-issued identifier of an attached control
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ControlId(pub u64);

// =============================================================================
// ENGINE
// =============================================================================

/// The imperative map engine driven by every binding
pub trait MapEngine {
    // --- sources ---
    fn add_source(&self, id: &str, source: SourceSpec) -> Result<(), EngineError>;
    fn remove_source(&self, id: &str) -> Result<(), EngineError>;
    fn has_source(&self, id: &str) -> bool;

    /// Replace the data of a GeoJSON source in place
    fn set_geojson_data(&self, source_id: &str, data: GeoJsonData) -> Result<(), EngineError>;

    /// Replace the image and/or corners of an image source in place
    fn update_image(
        &self,
        source_id: &str,
        url: &str,
        coordinates: [LngLat; 4],
    ) -> Result<(), EngineError>;

    /// Zoom level at which a cluster of a clustered GeoJSON source expands
    fn cluster_expansion_zoom(
        &self,
        source_id: &str,
        cluster_id: u64,
    ) -> LocalBoxFuture<'static, Result<f64, EngineError>>;

    // --- layers ---
    fn add_layer(&self, layer: LayerSpec, before_id: Option<&str>) -> Result<(), EngineError>;
    fn remove_layer(&self, id: &str) -> Result<(), EngineError>;
    fn has_layer(&self, id: &str) -> bool;
    fn set_paint_property(
        &self,
        layer_id: &str,
        property: &str,
        value: Value,
    ) -> Result<(), EngineError>;

    /// Add a layer rendered by custom code (see [`CustomLayer`])
    fn add_custom_layer(
        &self,
        layer: Rc<RefCell<dyn CustomLayer>>,
        before_id: Option<&str>,
    ) -> Result<(), EngineError>;

    // --- events ---
    fn on(&self, event: LayerEventKind, layer_id: &str, handler: LayerEventHandler) -> ListenerId;
    fn off(&self, event: LayerEventKind, layer_id: &str, listener: ListenerId);
    fn query_rendered_features(&self, point: ScreenPoint, layers: &[&str]) -> Vec<Feature>;
    fn set_cursor(&self, cursor: Cursor);

    // --- camera ---
    fn ease_to(&self, target: CameraTarget);
    fn fit_bounds(&self, bounds: LngLatBounds, options: FitBoundsOptions);
    fn trigger_repaint(&self);

    // --- controls ---
    fn add_control(&self, control: Rc<dyn Compositor>) -> Result<ControlId, EngineError>;
    fn remove_control(&self, id: ControlId) -> Result<(), EngineError>;
}

impl fmt::Debug for dyn MapEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MapEngine")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_line_string_payload() {
        let data = GeoJsonData::line_string(&[LngLat::new(1.0, 2.0), LngLat::new(3.0, 4.0)]);
        let GeoJsonData::Inline(value) = data else {
            panic!("expected inline data");
        };
        assert_eq!(value["geometry"]["type"], "LineString");
        assert_eq!(value["geometry"]["coordinates"], json!([[1.0, 2.0], [3.0, 4.0]]));
    }

    #[test]
    fn test_layer_spec_builder() {
        let spec = LayerSpec::new("route-layer-1", LayerKind::Line, "route-source-1")
            .layout("line-cap", "round")
            .paint("line-width", 3.0);
        assert_eq!(spec.layout["line-cap"], "round");
        assert_eq!(spec.paint["line-width"], 3.0);
        assert!(spec.filter.is_none());
    }

    #[test]
    fn test_feature_accessors() {
        let mut feature = Feature {
            geometry: Some(Geometry::Point(LngLat::new(5.0, 6.0))),
            ..Default::default()
        };
        feature.properties.insert("cluster_id".into(), json!(42));
        assert_eq!(feature.point(), Some(LngLat::new(5.0, 6.0)));
        assert_eq!(feature.property_u64("cluster_id"), Some(42));
        assert_eq!(feature.property_u64("point_count"), None);
    }
}
