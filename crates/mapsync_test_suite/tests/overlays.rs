//! Image and GPU overlays

use mapsync_core::binding::BindingState;
use mapsync_core::config::{RetryPolicy, SyncConfig};
use mapsync_core::engine::{GpuLayer, LayerKind, SourceSpec};
use mapsync_core::geo::LngLat;
use mapsync_layers::{GpuOverlay, GpuOverlayOptions, ImageOverlay, ImageOverlayOptions};
use mapsync_test_suite::{EngineCall, FakeCompositorFactory, TestMap};
use serde_json::json;
use std::rc::Rc;
use std::time::Duration;

// =============================================================================
// IMAGE OVERLAY
// =============================================================================

fn corners() -> [LngLat; 4] {
    [
        LngLat::new(-80.425, 46.437),
        LngLat::new(-71.516, 46.437),
        LngLat::new(-71.516, 37.936),
        LngLat::new(-80.425, 37.936),
    ]
}

#[test]
fn test_image_overlay_setup() {
    let map = TestMap::new();
    map.ready();
    let overlay = ImageOverlay::new(
        &map.context,
        ImageOverlayOptions::new("radar.gif", corners()).opacity(0.6),
    );
    overlay.attach();

    assert_eq!(
        map.engine.source(overlay.source_id()),
        Some(SourceSpec::Image {
            url: "radar.gif".into(),
            coordinates: corners(),
        })
    );
    let calls = map.engine.calls();
    let EngineCall::AddLayer { layer, .. } = &calls[1] else {
        panic!("expected raster layer, got {:?}", calls[1]);
    };
    assert_eq!(layer.kind, LayerKind::Raster);
    assert_eq!(layer.paint["raster-opacity"], 0.6);
}

#[test]
fn test_image_overlay_updates_in_place() {
    let map = TestMap::new();
    map.ready();
    let options = ImageOverlayOptions::new("radar-0.gif", corners()).id("radar");
    let overlay = ImageOverlay::new(&map.context, options.clone());
    overlay.attach();
    assert_eq!(overlay.source_id(), "image-source-radar");
    map.engine.take_calls();

    let mut shifted = corners();
    shifted[0].lng -= 1.0;
    overlay.update(ImageOverlayOptions {
        url: "radar-1.gif".into(),
        coordinates: shifted,
        ..options.clone()
    });
    overlay.update(ImageOverlayOptions {
        url: "radar-1.gif".into(),
        coordinates: shifted,
        opacity: 0.3,
        ..options
    });

    assert_eq!(
        map.engine.calls(),
        vec![
            EngineCall::UpdateImage {
                source_id: "image-source-radar".into(),
                url: "radar-1.gif".into(),
                coordinates: shifted,
            },
            EngineCall::SetPaint {
                layer_id: "image-layer-radar".into(),
                property: "raster-opacity".into(),
                value: json!(0.3),
            },
        ]
    );

    overlay.detach();
    assert_eq!(map.engine.source_count(), 0);
    assert!(map.engine.layer_ids().is_empty());
}

// =============================================================================
// GPU OVERLAY
// =============================================================================

fn arcs(width: f64) -> Vec<GpuLayer> {
    vec![GpuLayer::new("flights", "ArcLayer", json!({ "width": width }))]
}

#[test]
fn test_gpu_overlay_two_phase_setup() {
    let map = TestMap::new();
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::new());
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::new(arcs(1.0)));
    overlay.attach();

    // Phase one: created empty and attached
    assert!(overlay.is_setup());
    assert!(!overlay.is_live());
    let compositor = factory.last().expect("compositor created");
    assert!(compositor.options.layers.is_empty());
    assert!(compositor.options.interleaved);
    assert!(compositor.options.use_device_pixels);
    assert_eq!(map.engine.control_count(), 1);
    assert!(compositor.pushes().is_empty());

    // Phase two on the next frame
    assert_eq!(map.scheduler.run_frame(), 1);
    assert!(overlay.is_live());
    assert_eq!(compositor.pushes(), vec![arcs(1.0)]);

    overlay.update(GpuOverlayOptions::new(arcs(2.0)));
    assert_eq!(compositor.last_layers(), Some(arcs(2.0)));
}

#[test]
fn test_gpu_updates_before_first_frame_are_held() {
    let map = TestMap::new();
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::new());
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::new(arcs(1.0)));
    overlay.attach();

    overlay.update(GpuOverlayOptions::new(arcs(2.0)));
    overlay.update(GpuOverlayOptions::new(arcs(3.0)));
    let compositor = factory.last().expect("compositor created");
    assert!(compositor.pushes().is_empty());

    map.scheduler.run_frame();
    assert_eq!(compositor.pushes(), vec![arcs(3.0)]);
}

#[test]
fn test_gpu_setup_retried_once() {
    let map = TestMap::new();
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::failing(1));
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::new(arcs(1.0)));
    overlay.attach();

    assert!(!overlay.is_setup());
    assert_eq!(overlay.state(), BindingState::Pending);
    assert_eq!(map.engine.control_count(), 0);

    map.scheduler.advance(Duration::from_millis(499));
    assert_eq!(factory.attempts(), 1);
    map.scheduler.advance(Duration::from_millis(1));
    assert_eq!(factory.attempts(), 2);
    assert!(overlay.is_setup());

    map.scheduler.run_frame();
    assert!(overlay.is_live());
}

#[test]
fn test_gpu_gives_up_after_retry() {
    let map = TestMap::new();
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::failing(2));
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::default());
    overlay.attach();
    map.scheduler.advance(Duration::from_secs(5));

    assert_eq!(factory.attempts(), 2);
    assert!(!overlay.is_setup());
    assert_eq!(overlay.state(), BindingState::Degraded);
    assert_eq!(map.engine.control_count(), 0);
    assert_eq!(map.scheduler.pending_timers(), 0);
    assert_eq!(map.scheduler.pending_frames(), 0);
}

#[test]
fn test_gpu_retry_follows_configuration() {
    let map = TestMap::with_config(SyncConfig {
        retry: RetryPolicy::none(),
        ..Default::default()
    });
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::failing(1));
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::default());
    overlay.attach();

    assert_eq!(overlay.state(), BindingState::Degraded);
    assert_eq!(map.scheduler.pending_timers(), 0);
    assert_eq!(factory.attempts(), 1);
}

#[test]
fn test_gpu_detach_before_first_frame() {
    let map = TestMap::new();
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::new());
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::new(arcs(1.0)));
    overlay.attach();
    overlay.detach();

    assert_eq!(map.scheduler.pending_frames(), 0);
    assert_eq!(map.engine.control_count(), 0);
    assert!(overlay.compositor().is_none());
    assert!(map.engine.calls().contains(&EngineCall::RemoveControl));

    let calls = map.engine.call_count();
    overlay.detach();
    assert_eq!(map.engine.call_count(), calls);
}

#[test]
fn test_gpu_detach_during_retry_wait() {
    let map = TestMap::new();
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::failing(1));
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::default());
    overlay.attach();
    overlay.detach();

    map.scheduler.advance(Duration::from_secs(1));
    assert_eq!(factory.attempts(), 1);
    assert_eq!(overlay.state(), BindingState::TornDown);
}

#[test]
fn test_gpu_refused_first_push_recovers_on_update() {
    let map = TestMap::new();
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::rejecting_layers(1));
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::new(arcs(1.0)));
    overlay.attach();

    map.scheduler.run_frames(10);
    let compositor = factory.last().expect("compositor created");
    assert_eq!(compositor.rejected(), 1);
    assert!(compositor.pushes().is_empty());
    assert!(overlay.is_live());

    let two = vec![
        GpuLayer::new("flights", "ArcLayer", json!({ "width": 2.0 })),
        GpuLayer::new("airports", "ScatterplotLayer", json!({ "radius": 4 })),
    ];
    overlay.update(GpuOverlayOptions::new(two.clone()));
    assert_eq!(compositor.pushes(), vec![two]);
}

#[test]
fn test_gpu_refused_list_is_resent_even_if_unchanged() {
    let map = TestMap::new();
    map.ready();
    let factory = Rc::new(FakeCompositorFactory::rejecting_layers(1));
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::new(arcs(1.0)));
    overlay.attach();
    map.scheduler.run_frame();

    overlay.update(GpuOverlayOptions::new(arcs(1.0)));
    let compositor = factory.last().expect("compositor created");
    assert_eq!(compositor.pushes(), vec![arcs(1.0)]);

    // Accepted now; an identical update is a no-op again
    overlay.update(GpuOverlayOptions::new(arcs(1.0)));
    assert_eq!(compositor.pushes().len(), 1);
}
