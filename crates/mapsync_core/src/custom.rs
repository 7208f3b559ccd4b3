//! Custom layer contract
//!
//! Layers rendered by custom GPU code (such as the starfield backdrop) plug into
//! the engine through three callbacks: `on_add` when the layer joins the map,
//! `render` once per frame, and `on_remove` when it leaves. The graphics context
//! handed to these callbacks is the engine's GPU surface; its internals are out of
//! scope here.

use crate::engine::MapEngine;
use crate::error::EngineError;
use std::rc::Rc;

/// How a custom layer participates in depth testing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderingMode {
    TwoD,
    #[default]
    ThreeD,
}

/// Per-frame matrices supplied by the engine, column-major
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMatrices {
    pub projection: [f32; 16],
    pub model_view_projection: [f32; 16],
}

/// Point sprites uploaded by a backdrop layer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointSprites {
    pub positions: Vec<[f32; 3]>,
    pub sizes: Vec<f32>,
    pub opacities: Vec<f32>,
    /// Linear RGB in `[0, 1]`
    pub color: [f32; 3],
}

impl PointSprites {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Scene renderer created by a custom layer on the engine's GPU context
pub trait SceneRenderer {
    /// Upload point sprites drawn at infinity
    fn upload_points(&mut self, points: &PointSprites) -> Result<(), EngineError>;

    /// Start loading an equirectangular panorama drawn behind the points
    fn load_panorama(&mut self, url: &str, brightness: f32) -> Result<(), EngineError>;

    /// Draw the scene with the given column-major view-projection matrix
    fn draw(&mut self, view_projection: &[f32; 16]);

    /// Release every GPU resource held by the renderer
    fn dispose(&mut self);
}

/// The engine's graphics context as seen by custom layers
pub trait GraphicsContext {
    fn create_scene_renderer(&mut self) -> Result<Box<dyn SceneRenderer>, EngineError>;

    /// Reset cached GPU state so custom drawing does not leak into the engine's
    fn reset_state(&mut self);
}

/// A layer rendered by custom code
pub trait CustomLayer {
    fn id(&self) -> &str;

    fn rendering_mode(&self) -> RenderingMode {
        RenderingMode::ThreeD
    }

    fn on_add(&mut self, engine: &Rc<dyn MapEngine>, graphics: &mut dyn GraphicsContext);

    fn render(&mut self, graphics: &mut dyn GraphicsContext, frame: &FrameMatrices);

    fn on_remove(&mut self);
}
