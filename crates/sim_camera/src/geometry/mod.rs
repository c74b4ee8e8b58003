//! Geometry Builder: turns model sources into per-model vertex and index
//! lists. No GPU calls happen here.

pub mod mesh;
pub mod procedural;

use crate::error::{Result, SimError};
use scene_map::{ModelDef, ModelSource, SceneDescription};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Interleaved vertex as uploaded to the shared vertex buffer.
/// Must match `VertexInput` in `shaders/scene.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], tex_coord: [f32; 2], color: [f32; 3]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Bit pattern of all eight components; equality and hashing both use it
    /// so that `Eq` stays consistent with `Hash`. `-0.0` maps to `0.0`.
    fn key(&self) -> [u32; 8] {
        let [px, py, pz] = self.position;
        let [r, g, b] = self.color;
        let [u, v] = self.tex_coord;
        [px, py, pz, r, g, b, u, v].map(|f| if f == 0.0 { 0 } else { f.to_bits() })
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// CPU-side geometry for one named model, ready for the scene buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltModel {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub texture: Option<PathBuf>,
}

/// Builds one model from its source.
pub fn build_model(def: &ModelDef) -> Result<BuiltModel> {
    let surface = def.source.surface();
    let (vertices, indices) = match &def.source {
        ModelSource::FileMesh { path, .. } => {
            tracing::debug!(model = %def.name, path = %path.display(), "Loading mesh");
            let obj = scene_map::load_obj(path).map_err(|e| SimError::GeometryLoad {
                model: def.name.clone(),
                message: format!("{:#}", e),
            })?;
            for warning in &obj.warnings {
                tracing::warn!(model = %def.name, warning = %warning, "OBJ warning");
            }
            mesh::build_mesh(&obj, surface.color())
        }
        ModelSource::ProceduralBox {
            dimension,
            tile_size,
            ..
        } => {
            tracing::debug!(model = %def.name, ?dimension, "Generating box");
            let tile = surface.texture_path().map(|_| *tile_size);
            procedural::build_box(*dimension, surface.color(), tile)
        }
    };

    Ok(BuiltModel {
        name: def.name.clone(),
        vertices,
        indices,
        texture: surface.texture_path().map(PathBuf::from),
    })
}

/// Builds every model in map order. Any failure aborts the whole scene.
pub fn build_models(scene: &SceneDescription) -> Result<Vec<BuiltModel>> {
    let models = scene
        .models
        .iter()
        .map(build_model)
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        models = models.len(),
        vertices = models.iter().map(|m| m.vertices.len()).sum::<usize>(),
        indices = models.iter().map(|m| m.indices.len()).sum::<usize>(),
        "Built scene geometry"
    );
    Ok(models)
}
