//! mapsync 3D
//!
//! Custom layers rendered with their own GPU code inside the map.
//!
//! - [`StarfieldLayer`]: point stars and an optional panorama drawn at infinity
//!   behind a globe
//! - [`math`]: the small amount of matrix math the backdrop needs
//!
//! # Example
//!
//! ```ignore
//! use mapsync_3d::{attach_starfield, StarfieldLayer, StarfieldOptions};
//!
//! let starfield = StarfieldLayer::new(StarfieldOptions {
//!     star_count: 5000,
//!     galaxy_texture_url: Some("/milkyway.jpg".into()),
//!     ..Default::default()
//! });
//! let _waiter = attach_starfield(&context, starfield, Some("satellite"));
//! ```

pub mod math;
pub mod starfield;

pub use math::Mat4;
pub use starfield::{attach_starfield, generate_stars, StarfieldLayer, StarfieldOptions};
