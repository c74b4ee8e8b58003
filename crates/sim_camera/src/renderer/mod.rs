//! Offscreen renderer. Owns the GPU context, the shared scene buffer, the
//! instance buffer and one target per output format (plus the optional
//! preview).

pub mod context;
pub mod pipeline;
pub mod readback;
pub mod scene_buffer;
pub mod targets;
pub mod types;

use self::{
    context::GfxContext,
    pipeline::ScenePipeline,
    scene_buffer::SceneBuffer,
    targets::{create_target, OffscreenTarget, TargetKind, CLEAR_COLOR},
    types::InstanceRaw,
};
use crate::error::{Result, SimError};
use crate::geometry::BuiltModel;
use crate::scene::SceneInstance;
use glam::Mat4;

pub use self::targets::OutputFormat;

/// View-projection matrices for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewProjections {
    /// Used by both output formats; may be row-flipped.
    pub output: Mat4,
    pub preview: Mat4,
}

impl ViewProjections {
    fn for_kind(&self, kind: TargetKind) -> Mat4 {
        match kind {
            TargetKind::Output(_) => self.output,
            TargetKind::Preview => self.preview,
        }
    }
}

pub struct Renderer {
    pub gfx: GfxContext,
    pub pipeline: ScenePipeline,
    pub scene: SceneBuffer,
    width: u32,
    height: u32,
    instances: wgpu::Buffer,
    instance_capacity: usize,
    targets: Vec<OffscreenTarget>,
    // Model name per instance slot, in draw order.
    draws: Vec<String>,
}

impl Renderer {
    /// Uploads `models` and allocates every target. Any incomplete resource
    /// is reported as [`SimError::GpuResource`].
    pub fn new(
        gfx: GfxContext,
        models: &[BuiltModel],
        width: u32,
        height: u32,
        draw_capacity: usize,
        with_preview: bool,
    ) -> Result<Self> {
        let pipeline = gfx.scoped("Failed to build scene pipeline", || {
            ScenePipeline::new(&gfx.device)
        })?;
        let scene = SceneBuffer::upload(&gfx, &pipeline, models)?;

        let instance_capacity = draw_capacity.max(1);
        let instances = gfx.scoped("Failed to allocate instance buffer", || {
            gfx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Scene Instance Buffer"),
                size: (instance_capacity * std::mem::size_of::<InstanceRaw>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;

        let mut kinds: Vec<TargetKind> = OutputFormat::ALL.into_iter().map(TargetKind::Output).collect();
        if with_preview {
            kinds.push(TargetKind::Preview);
        }
        let targets = kinds
            .into_iter()
            .map(|kind| create_target(&gfx, &pipeline, kind, width, height))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(width, height, targets = targets.len(), "Offscreen targets ready");

        Ok(Self {
            gfx,
            pipeline,
            scene,
            width,
            height,
            instances,
            instance_capacity,
            targets,
            draws: Vec::new(),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_preview(&self) -> bool {
        self.targets.iter().any(|t| t.kind == TargetKind::Preview)
    }

    /// Stages one tick: instance matrices and per-target uniforms. With
    /// `view_proj == None` nothing is drawn and targets are only cleared.
    pub fn prepare(&mut self, draw_list: &[SceneInstance], view_proj: Option<ViewProjections>) {
        self.draws.clear();
        let Some(view_proj) = view_proj else {
            return;
        };

        if draw_list.len() > self.instance_capacity {
            tracing::warn!(
                requested = draw_list.len(),
                capacity = self.instance_capacity,
                "Draw list exceeds instance capacity; truncating"
            );
        }

        let mut raw = Vec::with_capacity(draw_list.len().min(self.instance_capacity));
        for instance in draw_list.iter().take(self.instance_capacity) {
            if self.scene.get(&instance.model).is_none() {
                tracing::warn!(model = %instance.model, "Instance refers to unknown model");
                continue;
            }
            raw.push(InstanceRaw::from(instance.model_matrix()));
            self.draws.push(instance.model.clone());
        }
        if !raw.is_empty() {
            self.gfx
                .queue
                .write_buffer(&self.instances, 0, bytemuck::cast_slice(&raw));
        }

        for target in &self.targets {
            target.write_view_proj(&self.gfx.queue, view_proj.for_kind(target.kind));
        }
    }

    /// Number of instances drawn by the staged tick.
    pub fn staged_draws(&self) -> usize {
        self.draws.len()
    }

    /// Clears the target for `kind`, draws the staged instances and reads the
    /// result back as tightly packed BGRA rows.
    pub fn render(&mut self, kind: TargetKind) -> Result<&[u8]> {
        let target = self
            .targets
            .iter_mut()
            .find(|t| t.kind == kind)
            .ok_or_else(|| SimError::gpu(format!("No offscreen target for '{}'", kind.label())))?;

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if !self.draws.is_empty() {
                pass.set_pipeline(&self.pipeline.pipeline);
                pass.set_bind_group(0, &target.bind_group, &[]);
                pass.set_vertex_buffer(0, self.scene.vertex_buffer.slice(..));
                pass.set_vertex_buffer(1, self.instances.slice(..));
                pass.set_index_buffer(self.scene.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

                for (slot, model) in self.draws.iter().enumerate() {
                    let Some(mesh) = self.scene.get(model) else {
                        continue;
                    };
                    let slot = slot as u32;
                    pass.set_bind_group(1, &mesh.material, &[]);
                    pass.draw_indexed(mesh.index_range(), mesh.base_vertex, slot..slot + 1);
                }
            }
        }

        target.readback.encode_copy(&mut encoder, &target.color_tex);
        self.gfx.queue.submit(std::iter::once(encoder.finish()));

        target.readback.read(&self.gfx.device)
    }
}
