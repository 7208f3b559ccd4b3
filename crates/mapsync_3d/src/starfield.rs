//! Starfield backdrop
//!
//! A custom layer that draws point stars (and optionally an equirectangular
//! galaxy panorama) on the unit sphere around the camera. Translation is removed
//! from the model-view matrix every frame, so the backdrop stays at infinity
//! while the globe rotates in front of it.

use crate::math::Mat4;
use mapsync_core::context::MapContext;
use mapsync_core::custom::{
    CustomLayer, FrameMatrices, GraphicsContext, PointSprites, RenderingMode, SceneRenderer,
};
use mapsync_core::engine::MapEngine;
use mapsync_core::readiness::ReadyWaiter;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::f32::consts::TAU;
use std::fmt;
use std::rc::Rc;

/// Starfield configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarfieldOptions {
    pub id: String,
    pub star_count: usize,
    /// Base point size in pixels
    pub star_size: f32,
    /// `0xRRGGBB`
    pub star_color: u32,
    /// Equirectangular panorama drawn behind the stars
    pub galaxy_texture_url: Option<String>,
    pub galaxy_brightness: f32,
    /// Seed for star placement; the same seed gives the same sky
    pub seed: u64,
}

impl Default for StarfieldOptions {
    fn default() -> Self {
        Self {
            id: "starfield".to_string(),
            star_count: 4000,
            star_size: 2.0,
            star_color: 0xffffff,
            galaxy_texture_url: None,
            galaxy_brightness: 0.35,
            seed: 0x5eed,
        }
    }
}

// ========== Star generation ==========

/// Hash of (index, stream, seed), avalanche-mixed
fn hash(index: u32, stream: u32, seed: u64) -> u32 {
    let mut h = (seed as u32) ^ ((seed >> 32) as u32);
    h = h.wrapping_mul(374761393);
    h = h.wrapping_add(index.wrapping_mul(668265263));
    h = h.wrapping_add(stream.wrapping_mul(2654435761));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    h
}

/// Uniform sample in `[0, 1)`
fn unit(index: u32, stream: u32, seed: u64) -> f32 {
    (hash(index, stream, seed) >> 8) as f32 / (1u32 << 24) as f32
}

/// `0xRRGGBB` to linear RGB in `[0, 1]`
pub fn hex_to_rgb(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

/// Number of stars actually generated; the hash is indexed by `u32`
fn star_budget(requested: usize) -> u32 {
    u32::try_from(requested).unwrap_or(u32::MAX)
}

/// Place `star_count` stars uniformly on the unit sphere
pub fn generate_stars(options: &StarfieldOptions) -> PointSprites {
    let count = star_budget(options.star_count);
    let capacity = count as usize;
    let mut sprites = PointSprites {
        positions: Vec::with_capacity(capacity),
        sizes: Vec::with_capacity(capacity),
        opacities: Vec::with_capacity(capacity),
        color: hex_to_rgb(options.star_color),
    };

    for i in 0..count {
        let theta = unit(i, 0, options.seed) * TAU;
        let phi = (2.0 * unit(i, 1, options.seed) - 1.0).acos();
        sprites.positions.push([
            phi.sin() * theta.cos(),
            phi.sin() * theta.sin(),
            phi.cos(),
        ]);
        sprites
            .sizes
            .push(options.star_size * (0.4 + unit(i, 2, options.seed)));
        sprites
            .opacities
            .push(0.15 + unit(i, 3, options.seed) * 0.85);
    }
    sprites
}

/// Camera matrix for a backdrop at infinity
///
/// Recovers the model-view matrix as `P⁻¹ · MVP`, drops its translation and
/// re-applies the projection. `None` if the projection is singular.
pub fn backdrop_camera(frame: &FrameMatrices) -> Option<Mat4> {
    let projection = Mat4::from_cols_array(&frame.projection);
    let mvp = Mat4::from_cols_array(&frame.model_view_projection);
    let model_view = (projection.inverse()? * mvp).without_translation();
    Some(projection * model_view)
}

// ========== Layer ==========

/// Starfield custom layer
pub struct StarfieldLayer {
    options: StarfieldOptions,
    renderer: Option<Box<dyn SceneRenderer>>,
}

impl StarfieldLayer {
    pub fn new(options: StarfieldOptions) -> Self {
        Self {
            options,
            renderer: None,
        }
    }

    pub fn options(&self) -> &StarfieldOptions {
        &self.options
    }

    /// Whether the layer holds GPU resources
    pub fn is_active(&self) -> bool {
        self.renderer.is_some()
    }
}

impl Default for StarfieldLayer {
    fn default() -> Self {
        Self::new(StarfieldOptions::default())
    }
}

impl fmt::Debug for StarfieldLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StarfieldLayer")
            .field("options", &self.options)
            .field("active", &self.is_active())
            .finish()
    }
}

impl CustomLayer for StarfieldLayer {
    fn id(&self) -> &str {
        &self.options.id
    }

    fn rendering_mode(&self) -> RenderingMode {
        RenderingMode::ThreeD
    }

    fn on_add(&mut self, engine: &Rc<dyn MapEngine>, graphics: &mut dyn GraphicsContext) {
        let mut renderer = match graphics.create_scene_renderer() {
            Ok(renderer) => renderer,
            Err(err) => {
                tracing::warn!(id = %self.options.id, %err, "starfield: no scene renderer");
                return;
            }
        };

        if let Some(url) = &self.options.galaxy_texture_url {
            match renderer.load_panorama(url, self.options.galaxy_brightness) {
                Ok(()) => engine.trigger_repaint(),
                Err(err) => tracing::warn!(%url, %err, "starfield: panorama unavailable"),
            }
        }

        let stars = generate_stars(&self.options);
        if let Err(err) = renderer.upload_points(&stars) {
            tracing::warn!(%err, "starfield: star upload failed");
        }

        tracing::debug!(id = %self.options.id, stars = stars.len(), "starfield added");
        self.renderer = Some(renderer);
    }

    fn render(&mut self, graphics: &mut dyn GraphicsContext, frame: &FrameMatrices) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let Some(camera) = backdrop_camera(frame) else {
            tracing::trace!("starfield: singular projection, frame skipped");
            return;
        };
        graphics.reset_state();
        renderer.draw(&camera.to_cols_array());
    }

    fn on_remove(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.dispose();
            tracing::debug!(id = %self.options.id, "starfield removed");
        }
    }
}

/// Add `layer` to the map once it is ready, below `before_id` if given
pub fn attach_starfield(
    context: &MapContext,
    layer: StarfieldLayer,
    before_id: Option<&str>,
) -> ReadyWaiter {
    let before_id = before_id.map(str::to_string);
    let layer: Rc<RefCell<dyn CustomLayer>> = Rc::new(RefCell::new(layer));
    context.gate.when_ready(move |engine| {
        if let Err(err) = engine.add_custom_layer(layer, before_id.as_deref()) {
            tracing::warn!(%err, "starfield: custom layer rejected");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_budget_saturates() {
        assert_eq!(star_budget(4000), 4000);
        assert_eq!(star_budget(u32::MAX as usize), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(star_budget(u32::MAX as usize + 7), u32::MAX);
    }

    #[test]
    fn test_stars_on_unit_sphere() {
        let stars = generate_stars(&StarfieldOptions {
            star_count: 500,
            ..Default::default()
        });
        assert_eq!(stars.len(), 500);
        for [x, y, z] in &stars.positions {
            let length = (x * x + y * y + z * z).sqrt();
            assert!((length - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_size_and_opacity_ranges() {
        let options = StarfieldOptions {
            star_count: 1000,
            star_size: 3.0,
            ..Default::default()
        };
        let stars = generate_stars(&options);
        assert!(stars.sizes.iter().all(|s| (1.19..4.21).contains(s)));
        assert!(stars.opacities.iter().all(|o| (0.15..=1.0).contains(o)));
    }

    #[test]
    fn test_seed_is_deterministic() {
        let options = StarfieldOptions {
            star_count: 50,
            ..Default::default()
        };
        assert_eq!(generate_stars(&options), generate_stars(&options));
        let reseeded = StarfieldOptions { seed: 7, ..options.clone() };
        assert_ne!(generate_stars(&options).positions, generate_stars(&reseeded).positions);
    }

    #[test]
    fn test_hex_color() {
        assert_eq!(hex_to_rgb(0xffffff), [1.0, 1.0, 1.0]);
        assert_eq!(hex_to_rgb(0xff0000), [1.0, 0.0, 0.0]);
        assert_eq!(hex_to_rgb(0x000000), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_backdrop_camera_drops_translation() {
        let projection = Mat4::perspective_rh(0.8, 1.0, 0.1, 1000.0);
        let model_view = Mat4::from_translation(10.0, -4.0, -250.0);
        let frame = FrameMatrices {
            projection: projection.to_cols_array(),
            model_view_projection: (projection * model_view).to_cols_array(),
        };
        let camera = backdrop_camera(&frame).unwrap();
        assert!(camera.approx_eq(&projection, 1e-3));
    }
}
