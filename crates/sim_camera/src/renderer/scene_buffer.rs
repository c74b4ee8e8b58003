//! Scene Buffer: every model's vertices and indices concatenated into one
//! vertex buffer and one index buffer, plus per-model draw metadata.

use super::context::GfxContext;
use super::pipeline::ScenePipeline;
use crate::error::{Result, SimError};
use crate::geometry::BuiltModel;
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use wgpu::util::DeviceExt;

/// Where one model landed inside the shared buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshLayout {
    pub name: String,
    /// First vertex of the model; indices are relative to it.
    pub base_vertex: u32,
    pub vertex_count: u32,
    pub index_offset_bytes: u64,
    pub index_count: u32,
}

impl MeshLayout {
    pub fn first_index(&self) -> u32 {
        (self.index_offset_bytes / std::mem::size_of::<u32>() as u64) as u32
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferPlan {
    pub vertex_count: u32,
    pub index_count: u32,
    pub meshes: Vec<MeshLayout>,
}

/// Assigns each model a contiguous range in the shared buffers, in input
/// order. Ranges are disjoint and their sizes add up to the totals.
pub fn plan_layout(models: &[BuiltModel]) -> BufferPlan {
    let mut plan = BufferPlan::default();
    for model in models {
        plan.meshes.push(MeshLayout {
            name: model.name.clone(),
            base_vertex: plan.vertex_count,
            vertex_count: model.vertices.len() as u32,
            index_offset_bytes: plan.index_count as u64 * std::mem::size_of::<u32>() as u64,
            index_count: model.indices.len() as u32,
        });
        plan.vertex_count += model.vertices.len() as u32;
        plan.index_count += model.indices.len() as u32;
    }
    plan
}

/// Draw metadata for one model, keyed by name in [`SceneBuffer`].
pub struct CompiledMesh {
    pub index_offset_bytes: u64,
    pub index_count: u32,
    pub base_vertex: i32,
    /// Uploaded texture, when the model has one.
    pub texture: Option<wgpu::Texture>,
    /// Texture, sampler and material flags bound at group 1.
    pub material: wgpu::BindGroup,
    _material_ubo: wgpu::Buffer,
}

impl CompiledMesh {
    /// Index range to pass to `draw_indexed`.
    pub fn index_range(&self) -> Range<u32> {
        let first = (self.index_offset_bytes / std::mem::size_of::<u32>() as u64) as u32;
        first..first + self.index_count
    }
}

pub struct SceneBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub vertex_count: u32,
    pub index_count: u32,
    meshes: HashMap<String, CompiledMesh>,
    // Bound for untextured models.
    _fallback_texture: wgpu::Texture,
}

impl SceneBuffer {
    pub fn upload(gfx: &GfxContext, pipeline: &ScenePipeline, models: &[BuiltModel]) -> Result<Self> {
        let plan = plan_layout(models);

        let mut vertices = Vec::with_capacity(plan.vertex_count as usize);
        let mut indices = Vec::with_capacity(plan.index_count as usize);
        for model in models {
            vertices.extend_from_slice(&model.vertices);
            indices.extend_from_slice(&model.indices);
        }

        // Zero-sized buffers are not allowed; keep one element of slack.
        if vertices.is_empty() {
            vertices.push(Default::default());
        }
        if indices.is_empty() {
            indices.push(0);
        }

        let (vertex_buffer, index_buffer) = gfx.scoped("Failed to allocate scene buffers", || {
            let vb = gfx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let ib = gfx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Index Buffer"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            (vb, ib)
        })?;

        let fallback_texture = upload_rgba(gfx, "Fallback White Texture", 1, 1, &[255; 4])?;
        let fallback_view = fallback_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut meshes = HashMap::with_capacity(models.len());
        for (model, layout) in models.iter().zip(&plan.meshes) {
            let texture = match &model.texture {
                Some(path) => Some(load_texture(gfx, &model.name, path)?),
                None => None,
            };
            let view = texture
                .as_ref()
                .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()));
            let (material, material_ubo) = pipeline.material_bind_group(
                &gfx.device,
                &format!("{} Material", model.name),
                view.as_ref().unwrap_or(&fallback_view),
                texture.is_some(),
            );

            let compiled = CompiledMesh {
                index_offset_bytes: layout.index_offset_bytes,
                index_count: layout.index_count,
                base_vertex: layout.base_vertex as i32,
                texture,
                material,
                _material_ubo: material_ubo,
            };
            if meshes.insert(model.name.clone(), compiled).is_some() {
                return Err(SimError::GeometryLoad {
                    model: model.name.clone(),
                    message: "duplicate model name".to_string(),
                });
            }
        }

        tracing::info!(
            models = meshes.len(),
            vertices = plan.vertex_count,
            indices = plan.index_count,
            "Scene buffer uploaded"
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: plan.vertex_count,
            index_count: plan.index_count,
            meshes,
            _fallback_texture: fallback_texture,
        })
    }

    pub fn get(&self, name: &str) -> Option<&CompiledMesh> {
        self.meshes.get(name)
    }
}

fn load_texture(gfx: &GfxContext, model: &str, path: &Path) -> Result<wgpu::Texture> {
    let image = image::open(path)
        .map_err(|source| SimError::Texture {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    let (width, height) = image.dimensions();
    tracing::debug!(model, path = %path.display(), width, height, "Loaded texture");
    upload_rgba(gfx, &format!("{} Texture", model), width, height, image.as_raw())
}

fn upload_rgba(gfx: &GfxContext, label: &str, width: u32, height: u32, rgba: &[u8]) -> Result<wgpu::Texture> {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    gfx.scoped(&format!("Failed to create texture '{}'", label), || {
        let texture = gfx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        gfx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        texture
    })
}
