//! mapsync demo
//!
//! Drives a route, a cluster layer and a GPU overlay against the recording
//! engine and prints the resulting engine call log.
//!
//! Usage:
//!   mapsync-demo                   # Default configuration
//!   mapsync-demo --config sync.toml
//!
//! Set `RUST_LOG=mapsync_core=debug` to see the binding lifecycle.

use anyhow::{Context, Result};
use mapsync_core::config::SyncConfig;
use mapsync_core::engine::GeoJsonData;
use mapsync_core::geo::LngLat;
use mapsync_layers::{
    ClusterLayer, ClusterLayerOptions, GpuOverlay, GpuOverlayOptions, RouteLayer, RouteOptions,
};
use mapsync_test_suite::{FakeCompositorFactory, TestMap};
use serde_json::json;
use std::rc::Rc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.iter().position(|a| a == "--config").and_then(|i| args.get(i + 1)) {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {path}"))?;
            SyncConfig::from_toml_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => SyncConfig::default(),
    };
    tracing::info!(?config, "configuration loaded");

    let map = TestMap::with_config(config);

    let route = RouteLayer::new(
        &map.context,
        RouteOptions::new([
            LngLat::new(-122.42, 37.77),
            LngLat::new(-122.41, 37.78),
            LngLat::new(-122.40, 37.79),
            LngLat::new(-122.39, 37.80),
        ])
        .animated(Some(Duration::from_millis(200)))
        .fit_bounds(None),
    );
    route.attach();

    let clusters = ClusterLayer::new(
        &map.context,
        ClusterLayerOptions::new(GeoJsonData::Inline(json!({
            "type": "FeatureCollection",
            "features": [],
        }))),
    );
    clusters.attach();

    let factory = Rc::new(FakeCompositorFactory::failing(1));
    let overlay = GpuOverlay::new(&map.context, factory.clone(), GpuOverlayOptions::default());
    overlay.attach();

    // Nothing touches the engine until both milestones are in
    map.set_engine();
    map.context.gate.mark_engine_ready();
    tracing::info!(calls = map.engine.call_count(), "engine loaded, style pending");
    map.context.gate.mark_style_ready();

    let frames = map.scheduler.run_frames(64);
    map.scheduler.advance(map.context.config.retry.delay());
    map.scheduler.run_frames(4);
    tracing::info!(
        frames,
        route = ?route.state(),
        clusters = ?clusters.state(),
        overlay = ?overlay.state(),
        overlay_live = overlay.is_live(),
        "scene settled"
    );

    route.update(route.options().color("#ff5722").width(5.0));

    drop(overlay);
    drop(clusters);
    drop(route);

    println!("Engine calls:");
    for (index, call) in map.engine.calls().iter().enumerate() {
        println!("  {index:>3}  {call:?}");
    }
    println!(
        "\n{} sources, {} layers, {} listeners left",
        map.engine.source_count(),
        map.engine.layer_ids().len(),
        map.engine.listener_count()
    );
    Ok(())
}
