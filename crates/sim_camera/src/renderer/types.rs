//! GPU-side data layouts. Each must match its counterpart in
//! `shaders/scene.wgsl`.

use glam::Mat4;

/// Per-target uniform (bind group 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassUniform {
    pub view_proj: [[f32; 4]; 4],
    pub color_transform: [[f32; 4]; 4],
}

impl PassUniform {
    pub fn new(view_proj: Mat4, color_transform: Mat4) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            color_transform: color_transform.to_cols_array_2d(),
        }
    }
}

/// Per-model uniform (bind group 1), std140-padded to 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub textured: u32,
    pub _pad: [u32; 3],
}

/// Per-instance vertex data: the model matrix, one column per attribute.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

impl From<Mat4> for InstanceRaw {
    fn from(m: Mat4) -> Self {
        Self {
            model: m.to_cols_array_2d(),
        }
    }
}
