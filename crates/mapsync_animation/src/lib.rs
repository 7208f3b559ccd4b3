//! mapsync animation
//!
//! Frame-driven animations that mutate engine state incrementally.
//!
//! - [`Easing`]: progress curves
//! - [`RouteReveal`]: grows a line from its first vertex to its last over a
//!   fixed duration, one animation frame at a time

pub mod easing;
pub mod reveal;

pub use easing::Easing;
pub use reveal::{revealed_point_count, RevealSink, RouteReveal};
