//! Contract between the world core and the rendering collaborator.
//!
//! The core never issues graphics calls itself. Tiles resolve their model
//! references through a [`ModelLibrary`] and hand each renderable to a
//! [`RenderBackend`] during [`Drawable::draw`].

use std::sync::Arc;

use crate::geometry::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Mesh + material bundle owned by the model-loading collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelData {
    pub name: String,
    pub mesh: MeshId,
    pub material: MaterialId,
}

pub trait ModelLibrary {
    fn model_data(&self, name: &str) -> Option<Arc<ModelData>>;
}

/// Per-frame inputs the renderer passes down the traversal.
#[derive(Debug, Clone, Copy)]
pub struct DrawParams {
    pub view_projection: [f32; 16],
    pub light_position: Position,
    pub light_color: [f32; 3],
    pub camera_position: Position,
}

impl Default for DrawParams {
    fn default() -> Self {
        let mut identity = [0.0; 16];
        for i in 0..4 {
            identity[i * 5] = 1.0;
        }
        Self {
            view_projection: identity,
            light_position: Position::ORIGIN,
            light_color: [1.0, 1.0, 1.0],
            camera_position: Position::ORIGIN,
        }
    }
}

pub trait RenderBackend {
    fn draw_model(
        &mut self,
        model: &ModelData,
        world_position: Position,
        y_rotation_degrees: f32,
        params: &DrawParams,
    );
}

pub trait Drawable {
    /// Resolves model references into renderables. Called before the first
    /// draw and again whenever content changed.
    fn initialise(&mut self, models: &dyn ModelLibrary);

    fn draw(
        &mut self,
        params: &DrawParams,
        models: &dyn ModelLibrary,
        backend: &mut dyn RenderBackend,
    );
}
