//! Engine resource helpers
//!
//! The engine rejects removing or mutating ids it does not know. During update
//! and teardown that absence is harmless (someone else already cleaned up, or
//! the style was swapped), so these helpers probe first and swallow whatever the
//! engine still reports.

use crate::engine::{GeoJsonData, LayerEventHandler, LayerEventKind, ListenerId, MapEngine};
use crate::error::EngineError;
use serde_json::Value;
use smallvec::SmallVec;

fn ignore(operation: &'static str, id: &str, err: EngineError) {
    if err.is_missing_resource() {
        tracing::trace!(operation, id, %err, "ignoring missing resource");
    } else {
        tracing::debug!(operation, id, %err, "ignoring engine error");
    }
}

/// Remove a layer if the engine still has it
pub fn remove_layer_quietly(engine: &dyn MapEngine, id: &str) {
    if !engine.has_layer(id) {
        return;
    }
    if let Err(err) = engine.remove_layer(id) {
        ignore("remove_layer", id, err);
    }
}

/// Remove a source if the engine still has it
pub fn remove_source_quietly(engine: &dyn MapEngine, id: &str) {
    if !engine.has_source(id) {
        return;
    }
    if let Err(err) = engine.remove_source(id) {
        ignore("remove_source", id, err);
    }
}

/// Set a paint property if the layer is still present
///
/// Returns whether the engine accepted the call.
pub fn set_paint_if_present(
    engine: &dyn MapEngine,
    layer_id: &str,
    property: &str,
    value: Value,
) -> bool {
    if !engine.has_layer(layer_id) {
        tracing::trace!(layer_id, property, "paint update skipped, layer gone");
        return false;
    }
    match engine.set_paint_property(layer_id, property, value) {
        Ok(()) => true,
        Err(err) => {
            ignore("set_paint_property", layer_id, err);
            false
        }
    }
}

/// Replace a GeoJSON source's data if the source is still present
pub fn set_data_if_present(engine: &dyn MapEngine, source_id: &str, data: GeoJsonData) -> bool {
    if !engine.has_source(source_id) {
        tracing::trace!(source_id, "data update skipped, source gone");
        return false;
    }
    match engine.set_geojson_data(source_id, data) {
        Ok(()) => true,
        Err(err) => {
            ignore("set_geojson_data", source_id, err);
            false
        }
    }
}

// =============================================================================
// LISTENERS
// =============================================================================

/// The interaction listeners a binding registered, so they can all be removed
#[derive(Debug, Default)]
pub struct Listeners {
    entries: SmallVec<[(LayerEventKind, String, ListenerId); 6]>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &mut self,
        engine: &dyn MapEngine,
        event: LayerEventKind,
        layer_id: &str,
        handler: LayerEventHandler,
    ) {
        let id = engine.on(event, layer_id, handler);
        self.entries.push((event, layer_id.to_string(), id));
    }

    /// Deregister every listener
    pub fn off_all(&mut self, engine: &dyn MapEngine) {
        for (event, layer_id, id) in self.entries.drain(..) {
            engine.off(event, &layer_id, id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
