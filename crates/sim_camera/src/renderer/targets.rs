//! Offscreen colour and depth targets, one per output format plus the
//! optional preview.

use super::pipeline::ScenePipeline;
use super::readback::Readback;
use super::types::PassUniform;
use crate::error::Result;
use glam::Mat4;
use wgpu::util::DeviceExt;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const BYTES_PER_PIXEL: u32 = 4;

pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.2,
    g: 0.2,
    b: 0.2,
    a: 0.0,
};

/// Linear RGB to a YUV-like encoding, column-major. Applied to `(r, g, b, 1)`
/// it yields `(Y, Cr, Cb, 1)` in the red, green and blue channels.
pub const RGB_TO_YUV: Mat4 = Mat4::from_cols_array(&[
    0.257, 0.439, -0.148, 0.0, //
    0.504, -0.368, -0.291, 0.0, //
    0.098, -0.071, 0.439, 0.0, //
    0.0625, 0.5, 0.5, 1.0,
]);

/// Pixel encoding of a published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Straight BGRA of the rendered scene.
    Linear,
    /// BGRA whose channels carry [`RGB_TO_YUV`] of the scene colour.
    ColorConverted,
}

impl OutputFormat {
    /// Render order within one capture tick.
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Linear, OutputFormat::ColorConverted];

    pub fn color_transform(self) -> Mat4 {
        match self {
            OutputFormat::Linear => Mat4::IDENTITY,
            OutputFormat::ColorConverted => RGB_TO_YUV,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OutputFormat::Linear => "argb",
            OutputFormat::ColorConverted => "i420",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Output(OutputFormat),
    /// Debug view; never flipped, never converted.
    Preview,
}

impl TargetKind {
    pub fn color_transform(self) -> Mat4 {
        match self {
            TargetKind::Output(format) => format.color_transform(),
            TargetKind::Preview => Mat4::IDENTITY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetKind::Output(format) => format.label(),
            TargetKind::Preview => "preview",
        }
    }
}

pub struct OffscreenTarget {
    pub kind: TargetKind,
    pub color_tex: wgpu::Texture,
    pub color: wgpu::TextureView,
    _depth_tex: wgpu::Texture,
    pub depth: wgpu::TextureView,
    ubo: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub readback: Readback,
}

impl OffscreenTarget {
    pub fn new(
        device: &wgpu::Device,
        pipeline: &ScenePipeline,
        kind: TargetKind,
        width: u32,
        height: u32,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let create_tex = |label: &str, format, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let name = kind.label();
        let color_tex = create_tex(
            &format!("{} Color Target", name),
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let depth_tex = create_tex(
            &format!("{} Depth Target", name),
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );

        let uniform = PassUniform::new(Mat4::IDENTITY, kind.color_transform());
        let ubo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Pass UBO", name)),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = pipeline.pass_bind_group(device, &ubo);
        let readback = Readback::new(
            device,
            &format!("{} Readback Staging", name),
            width,
            height,
            BYTES_PER_PIXEL,
        );

        Self {
            kind,
            color: color_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            depth: depth_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            color_tex,
            _depth_tex: depth_tex,
            ubo,
            bind_group,
            readback,
        }
    }

    pub fn write_view_proj(&self, queue: &wgpu::Queue, view_proj: Mat4) {
        let uniform = PassUniform::new(view_proj, self.kind.color_transform());
        queue.write_buffer(&self.ubo, 0, bytemuck::bytes_of(&uniform));
    }
}

/// Creates a target inside an error scope so an incomplete target surfaces
/// as a startup error.
pub fn create_target(
    gfx: &super::context::GfxContext,
    pipeline: &ScenePipeline,
    kind: TargetKind,
    width: u32,
    height: u32,
) -> Result<OffscreenTarget> {
    gfx.scoped(&format!("Offscreen target '{}' is not complete", kind.label()), || {
        OffscreenTarget::new(&gfx.device, pipeline, kind, width, height)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn convert(rgb: [f32; 3]) -> Vec4 {
        RGB_TO_YUV * Vec4::new(rgb[0], rgb[1], rgb[2], 1.0)
    }

    #[test]
    fn conversion_of_black_and_white() {
        let black = convert([0.0, 0.0, 0.0]);
        assert!((black.x - 0.0625).abs() < 1e-6);
        assert!((black.y - 0.5).abs() < 1e-6);
        assert!((black.z - 0.5).abs() < 1e-6);
        assert_eq!(black.w, 1.0);

        // Chroma rows sum to zero, so white stays neutral.
        let white = convert([1.0, 1.0, 1.0]);
        assert!((white.x - (0.257 + 0.504 + 0.098 + 0.0625)).abs() < 1e-6);
        assert!((white.y - 0.5).abs() < 1e-6);
        assert!((white.z - 0.5).abs() < 1e-6);
    }

    #[test]
    fn conversion_of_pure_red() {
        let red = convert([1.0, 0.0, 0.0]);
        assert!((red.x - 0.3195).abs() < 1e-6);
        assert!((red.y - 0.939).abs() < 1e-6);
        assert!((red.z - 0.352).abs() < 1e-6);
    }

    #[test]
    fn preview_is_never_converted() {
        assert_eq!(TargetKind::Preview.color_transform(), Mat4::IDENTITY);
        assert_eq!(
            TargetKind::Output(OutputFormat::ColorConverted).color_transform(),
            RGB_TO_YUV
        );
        assert_eq!(OutputFormat::ALL[0], OutputFormat::Linear);
    }
}
