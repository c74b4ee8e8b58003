//! Texture-to-CPU readback with reusable staging memory.

use crate::error::{Result, SimError};

/// Rounds `value` up to the copy row alignment (256 bytes).
pub fn align_bpr(value: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    value.div_ceil(align) * align
}

/// Copies `rows` rows of `tight_bpr` bytes out of a buffer whose rows are
/// `padded_bpr` bytes apart.
pub fn depad_rows(padded: &[u8], padded_bpr: usize, tight_bpr: usize, rows: usize, out: &mut [u8]) {
    for row in 0..rows {
        let src = row * padded_bpr;
        let dst = row * tight_bpr;
        out[dst..dst + tight_bpr].copy_from_slice(&padded[src..src + tight_bpr]);
    }
}

/// Staging buffer plus tight CPU pixel storage for one colour target.
pub struct Readback {
    staging: wgpu::Buffer,
    width: u32,
    height: u32,
    tight_bpr: u32,
    padded_bpr: u32,
    pixels: Vec<u8>,
}

impl Readback {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        let tight_bpr = bytes_per_pixel * width;
        let padded_bpr = align_bpr(tight_bpr);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded_bpr as wgpu::BufferAddress * height as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            staging,
            width,
            height,
            tight_bpr,
            padded_bpr,
            pixels: vec![0; tight_bpr as usize * height as usize],
        }
    }

    /// Records the texture-to-staging copy.
    pub fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) {
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bpr),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Waits for submitted work, maps the staging buffer and returns the
    /// depadded pixels. Call after the copy has been submitted.
    pub fn read(&mut self, device: &wgpu::Device) -> Result<&[u8]> {
        let slice = self.staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let status = device.poll(wgpu::Maintain::Wait);
        tracing::trace!(queue_empty = status.is_queue_empty(), "Readback poll finished");

        pollster::block_on(receiver)
            .map_err(|_| SimError::gpu("map_async callback channel dropped"))?
            .map_err(|e| SimError::gpu(format!("Failed to map readback buffer: {}", e)))?;

        {
            let data = slice.get_mapped_range();
            depad_rows(
                &data,
                self.padded_bpr as usize,
                self.tight_bpr as usize,
                self.height as usize,
                &mut self.pixels,
            );
        }
        self.staging.unmap();

        Ok(&self.pixels)
    }
}
