//! Cluster layer against the recording engine

use mapsync_core::engine::{
    CameraTarget, Cursor, Feature, GeoJsonData, Geometry, LayerEvent, LayerEventKind, SourceSpec,
};
use mapsync_core::error::EngineError;
use mapsync_core::geo::LngLat;
use mapsync_layers::{ClusterLayer, ClusterLayerOptions};
use mapsync_test_suite::{EngineCall, TestMap};
use serde_json::{json, Map, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn points() -> GeoJsonData {
    GeoJsonData::Inline(json!({
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [0.0, 0.0] } },
            { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [0.1, 0.1] } },
        ],
    }))
}

fn properties(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn cluster_feature(cluster_id: u64, point_count: u64, at: LngLat) -> Feature {
    Feature {
        id: Some(json!(cluster_id)),
        properties: properties(json!({
            "cluster": true,
            "cluster_id": cluster_id,
            "point_count": point_count,
        })),
        geometry: Some(Geometry::Point(at)),
    }
}

fn active_layer(map: &TestMap, options: ClusterLayerOptions) -> ClusterLayer {
    map.ready();
    let layer = ClusterLayer::new(&map.context, options);
    layer.attach();
    assert!(layer.is_setup());
    layer
}

#[test]
fn test_setup_creates_source_then_three_layers_then_handlers() {
    let map = TestMap::new();
    let layer = active_layer(&map, ClusterLayerOptions::new(points()));
    let calls = map.engine.calls();

    let EngineCall::AddSource { source, .. } = &calls[0] else {
        panic!("expected source first, got {:?}", calls[0]);
    };
    let SourceSpec::GeoJson { cluster, .. } = source else {
        panic!("expected a GeoJSON source");
    };
    let cluster = cluster.expect("clustering enabled");
    assert_eq!((cluster.max_zoom, cluster.radius), (14, 50));

    let added: Vec<&str> = calls[1..4]
        .iter()
        .map(|call| match call {
            EngineCall::AddLayer { layer, .. } => layer.id.as_str(),
            other => panic!("expected a layer, got {other:?}"),
        })
        .collect();
    assert_eq!(added, layer.layer_ids().to_vec());
    assert_eq!(map.engine.layer_ids(), layer.layer_ids().to_vec());

    assert!(calls[4..].iter().all(|c| matches!(c, EngineCall::On { .. })));
    assert_eq!(map.engine.listener_count(), 6);
}

#[test]
fn test_teardown_order() {
    let map = TestMap::new();
    let layer = active_layer(&map, ClusterLayerOptions::new(points()));
    let [clusters, count, unclustered] = layer.layer_ids().map(str::to_string);
    let source = layer.source_id().to_string();
    map.engine.take_calls();

    layer.detach();
    let calls = map.engine.calls();
    assert_eq!(calls.len(), 10);
    assert!(calls[..6].iter().all(|c| matches!(c, EngineCall::Off { .. })));
    assert_eq!(
        &calls[6..],
        &[
            EngineCall::RemoveLayer(unclustered),
            EngineCall::RemoveLayer(count),
            EngineCall::RemoveLayer(clusters),
            EngineCall::RemoveSource(source),
        ]
    );
    assert_eq!(map.engine.listener_count(), 0);
}

#[test]
fn test_cluster_click_zooms_to_expansion_level() {
    let map = TestMap::new();
    let layer = active_layer(&map, ClusterLayerOptions::new(points()));
    let center = LngLat::new(12.5, 41.9);
    map.engine
        .set_rendered_features(vec![cluster_feature(7, 120, center)]);
    map.engine.set_expansion_zoom(Ok(9.0));
    map.engine.take_calls();

    map.engine
        .emit(LayerEventKind::Click, layer.layer_ids()[0], &LayerEvent::default());
    // The zoom query resolves on a local task, not inside the handler
    assert!(map.engine.calls().is_empty());

    map.scheduler.run_tasks();
    assert_eq!(
        map.engine.calls(),
        vec![EngineCall::EaseTo(CameraTarget {
            center,
            zoom: Some(9.0),
        })]
    );
}

#[test]
fn test_failed_expansion_query_leaves_camera() {
    let map = TestMap::new();
    let layer = active_layer(&map, ClusterLayerOptions::new(points()));
    map.engine
        .set_rendered_features(vec![cluster_feature(3, 10, LngLat::new(0.0, 0.0))]);
    map.engine
        .set_expansion_zoom(Err(EngineError::Other("cluster gone".into())));
    map.engine.take_calls();

    map.engine
        .emit(LayerEventKind::Click, layer.layer_ids()[0], &LayerEvent::default());
    map.scheduler.run_tasks();
    assert!(map.engine.calls().is_empty());
}

#[test]
fn test_cluster_click_callback_replaces_zoom() {
    let map = TestMap::new();
    let layer = active_layer(&map, ClusterLayerOptions::new(points()));
    let received = Rc::new(Cell::new(None));
    let sink = received.clone();
    layer.on_cluster_click(move |id, at, count| sink.set(Some((id, at, count))));

    let center = LngLat::new(-3.7, 40.4);
    map.engine
        .set_rendered_features(vec![cluster_feature(11, 250, center)]);
    map.engine.take_calls();
    map.engine
        .emit(LayerEventKind::Click, layer.layer_ids()[0], &LayerEvent::default());
    map.scheduler.run_tasks();

    assert_eq!(received.get(), Some((11, center, 250)));
    assert!(map.engine.calls().is_empty());
}

#[test]
fn test_point_click_corrects_antimeridian() {
    let map = TestMap::new();
    let layer = active_layer(&map, ClusterLayerOptions::new(points()));
    let clicked = Rc::new(RefCell::new(None));
    let sink = clicked.clone();
    layer.on_point_click(move |feature, at| {
        *sink.borrow_mut() = Some((feature.properties.get("name").cloned(), at));
    });

    let feature = Feature {
        id: None,
        properties: properties(json!({ "name": "Suva" })),
        geometry: Some(Geometry::Point(LngLat::new(-179.0, -18.1))),
    };
    map.engine.emit(
        LayerEventKind::Click,
        layer.layer_ids()[2],
        &LayerEvent {
            lng_lat: LngLat::new(179.0, -18.0),
            features: vec![feature],
            ..Default::default()
        },
    );

    assert_eq!(
        *clicked.borrow(),
        Some((Some(json!("Suva")), LngLat::new(181.0, -18.1)))
    );
}

#[test]
fn test_point_cursor_only_when_clickable() {
    let map = TestMap::new();
    let layer = active_layer(&map, ClusterLayerOptions::new(points()));
    let points_layer = layer.layer_ids()[2];

    map.engine
        .emit(LayerEventKind::MouseEnter, points_layer, &LayerEvent::default());
    assert_eq!(map.engine.cursor(), Cursor::Default);

    layer.on_point_click(|_, _| {});
    map.engine
        .emit(LayerEventKind::MouseEnter, points_layer, &LayerEvent::default());
    assert_eq!(map.engine.cursor(), Cursor::Pointer);
    map.engine
        .emit(LayerEventKind::MouseLeave, points_layer, &LayerEvent::default());
    assert_eq!(map.engine.cursor(), Cursor::Default);

    map.engine
        .emit(LayerEventKind::MouseEnter, layer.layer_ids()[0], &LayerEvent::default());
    assert_eq!(map.engine.cursor(), Cursor::Pointer);
}

#[test]
fn test_update_recolors_without_rebuilding() {
    let map = TestMap::new();
    let options = ClusterLayerOptions::new(points());
    let layer = active_layer(&map, options.clone());
    map.engine.take_calls();

    layer.update(ClusterLayerOptions {
        cluster_colors: ["#000".into(), "#111".into(), "#222".into()],
        point_color: "#333".into(),
        ..options.clone()
    });
    let calls = map.engine.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(EngineCall::is_paint));
    assert_eq!(
        map.engine.paint_value(layer.layer_ids()[2], "circle-color"),
        Some(json!("#333"))
    );

    // Threshold changes touch both color and radius steps
    map.engine.take_calls();
    layer.update(ClusterLayerOptions {
        cluster_thresholds: [10, 50],
        ..options.clone()
    });
    assert_eq!(
        map.engine.paint_value(layer.layer_ids()[0], "circle-radius"),
        Some(json!(["step", ["get", "point_count"], 20, 10, 30, 50, 40]))
    );
    assert!(map.engine.calls().iter().all(EngineCall::is_paint));
}

#[test]
fn test_inline_data_replaced_in_place() {
    let map = TestMap::new();
    let options = ClusterLayerOptions::new(points());
    let layer = active_layer(&map, options.clone());
    map.engine.take_calls();

    let empty = GeoJsonData::Inline(json!({ "type": "FeatureCollection", "features": [] }));
    layer.update(ClusterLayerOptions {
        data: empty.clone(),
        ..options.clone()
    });
    assert_eq!(
        map.engine.calls(),
        vec![EngineCall::SetData {
            source_id: layer.source_id().to_string(),
            data: empty,
        }]
    );

    // Source options are fixed once the source exists
    map.engine.take_calls();
    layer.update(ClusterLayerOptions {
        cluster_radius: 80,
        ..options
    });
    assert!(!map
        .engine
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCall::AddSource { .. } | EngineCall::RemoveSource(_))));
}
