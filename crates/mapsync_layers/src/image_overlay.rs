//! Image overlay
//!
//! Drapes an image over a quadrilateral on the map. Changing the URL or the
//! corners updates the image source in place.

use mapsync_core::binding::{Binding, BindingState, BundleContext, ResourceBundle};
use mapsync_core::context::{ContextRegistry, MapContext, ScopeId};
use mapsync_core::engine::{LayerKind, LayerSpec, SourceSpec};
use mapsync_core::error::EngineError;
use mapsync_core::geo::LngLat;
use mapsync_core::resources::{remove_layer_quietly, remove_source_quietly, set_paint_if_present};
use serde_json::json;

/// Declarative description of an image overlay
#[derive(Clone, Debug, PartialEq)]
pub struct ImageOverlayOptions {
    /// Explicit instance token; generated when `None`
    pub id: Option<String>,
    pub url: String,
    /// Top-left, top-right, bottom-right, bottom-left
    pub coordinates: [LngLat; 4],
    pub opacity: f64,
}

impl ImageOverlayOptions {
    pub fn new(url: impl Into<String>, coordinates: [LngLat; 4]) -> Self {
        Self {
            id: None,
            url: url.into(),
            coordinates,
            opacity: 1.0,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }
}

/// Engine resources of one image overlay
pub struct ImageOverlayBundle {
    source_id: String,
    layer_id: String,
}

impl ResourceBundle for ImageOverlayBundle {
    type Config = ImageOverlayOptions;
    const KIND: &'static str = "image-overlay";

    fn probe_source(&self) -> Option<&str> {
        Some(&self.source_id)
    }

    fn setup(
        &mut self,
        cx: &BundleContext,
        options: &ImageOverlayOptions,
    ) -> Result<(), EngineError> {
        cx.engine.add_source(
            &self.source_id,
            SourceSpec::Image {
                url: options.url.clone(),
                coordinates: options.coordinates,
            },
        )?;
        cx.engine.add_layer(
            LayerSpec::new(&self.layer_id, LayerKind::Raster, &self.source_id)
                .paint("raster-opacity", options.opacity),
            None,
        )?;
        Ok(())
    }

    fn update(
        &mut self,
        cx: &BundleContext,
        previous: &ImageOverlayOptions,
        next: &ImageOverlayOptions,
    ) {
        let engine = cx.engine.as_ref();
        if (previous.url != next.url || previous.coordinates != next.coordinates)
            && engine.has_source(&self.source_id)
        {
            if let Err(err) = engine.update_image(&self.source_id, &next.url, next.coordinates) {
                tracing::debug!(source_id = %self.source_id, %err, "image update ignored");
            }
        }
        if previous.opacity != next.opacity {
            set_paint_if_present(engine, &self.layer_id, "raster-opacity", json!(next.opacity));
        }
    }

    fn teardown(&mut self, cx: &BundleContext) {
        remove_layer_quietly(cx.engine.as_ref(), &self.layer_id);
        remove_source_quietly(cx.engine.as_ref(), &self.source_id);
    }
}

/// An image draped over the map
pub struct ImageOverlay {
    binding: Binding<ImageOverlayBundle>,
    source_id: String,
    layer_id: String,
}

impl ImageOverlay {
    pub fn new(context: &MapContext, options: ImageOverlayOptions) -> Self {
        let namespace = context.namespace(options.id.as_deref());
        let source_id = namespace.id("image-source");
        let layer_id = namespace.id("image-layer");
        let bundle = ImageOverlayBundle {
            source_id: source_id.clone(),
            layer_id: layer_id.clone(),
        };
        Self {
            binding: Binding::new(context, bundle, options),
            source_id,
            layer_id,
        }
    }

    /// Create an overlay under the nearest map of `scope`
    pub fn in_scope(
        registry: &ContextRegistry,
        scope: ScopeId,
        options: ImageOverlayOptions,
    ) -> mapsync_core::Result<Self> {
        Ok(Self::new(&registry.use_map(scope)?, options))
    }

    pub fn attach(&self) {
        self.binding.attach();
    }

    pub fn update(&self, options: ImageOverlayOptions) {
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

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }
}
