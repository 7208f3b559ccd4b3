//! mapsync layers
//!
//! Declarative layer bindings. Each layer type wraps a
//! [`Binding`](mapsync_core::Binding) around a kind-specific resource bundle:
//!
//! | layer | engine resources |
//! |-------|------------------|
//! | [`RouteLayer`] | GeoJSON line source, line layer, click/hover listeners |
//! | [`ClusterLayer`] | clustered GeoJSON source, circle + label + point layers |
//! | [`ImageOverlay`] | image source, raster layer |
//! | [`GpuOverlay`] | compositor control |
//!
//! All of them follow the same lifecycle: construct with a
//! [`MapContext`](mapsync_core::MapContext), `attach()`, `update()` as often as the
//! description changes, `detach()` (or drop) when done.

pub mod cluster;
pub mod gpu_overlay;
pub mod image_overlay;
pub mod route;

pub use cluster::{ClusterCallbacks, ClusterLayer, ClusterLayerOptions};
pub use gpu_overlay::{GpuOverlay, GpuOverlayOptions};
pub use image_overlay::{ImageOverlay, ImageOverlayOptions};
pub use route::{RouteCallbacks, RouteLayer, RouteOptions};
