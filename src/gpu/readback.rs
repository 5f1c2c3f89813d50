//! GPU texture readback over wgpu
//!
//! Copies the annotation render target into a MAP_READ staging buffer and
//! reads it back through `map_async`. `bytes_per_row` must be 256-byte
//! aligned for the copy, so rows are padded in the staging buffer and the
//! padding is stripped before the pixels go over the completion channel.

use std::sync::Arc;

use crossbeam_channel::Sender;
use log::trace;
use wgpu::{
    Buffer, BufferDescriptor, BufferUsages, Extent3d, ImageCopyBuffer, ImageCopyTexture,
    ImageDataLayout, MapMode, Origin3d, Texture, TextureAspect, COPY_BYTES_PER_ROW_ALIGNMENT,
};

use crate::capture::readback::{ReadbackBackend, TransferResult};

const BYTES_PER_PIXEL: u32 = 4; // RGBA8

/// Readback backend over a live wgpu device and an RGBA8 render target.
pub struct WgpuReadback {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    texture: Arc<Texture>,
    width: u32,
    height: u32,
}

impl WgpuReadback {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        texture: Arc<Texture>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            device,
            queue,
            texture,
            width,
            height,
        }
    }

    fn create_staging_buffer(&self, padded_bytes_per_row: u32) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some("annotation readback staging"),
            size: padded_bytes_per_row as u64 * self.height as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

impl ReadbackBackend for WgpuReadback {
    fn submit(&mut self, done: Sender<TransferResult>) {
        let tight_bytes_per_row = BYTES_PER_PIXEL * self.width;
        let padded_bytes_per_row = align_to(tight_bytes_per_row, COPY_BYTES_PER_ROW_ALIGNMENT);

        let buffer = Arc::new(self.create_staging_buffer(padded_bytes_per_row));
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("annotation readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            ImageCopyBuffer {
                buffer: &buffer,
                layout: ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));
        trace!(
            "submitted readback copy: {}x{}, {} padded bytes per row",
            self.width,
            self.height,
            padded_bytes_per_row
        );

        let height = self.height;
        let mapped = buffer.clone();
        buffer.slice(..).map_async(MapMode::Read, move |result| {
            match result {
                Ok(()) => {
                    let data = mapped.slice(..).get_mapped_range();
                    let tight = tight_bytes_per_row as usize;
                    let padded = padded_bytes_per_row as usize;
                    let mut pixels = Vec::with_capacity(tight * height as usize);
                    for row in 0..height as usize {
                        let start = row * padded;
                        pixels.extend_from_slice(&data[start..start + tight]);
                    }
                    drop(data);
                    mapped.unmap();
                    let _ = done.send(Ok(pixels));
                }
                Err(e) => {
                    let _ = done.send(Err(format!("buffer map failed: {:?}", e)));
                }
            }
        });
    }

    fn poll(&mut self) {
        self.device.poll(wgpu::Maintain::Poll);
    }

    fn wait_idle(&mut self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

#[cfg(test)]
mod tests {
    use super::align_to;
    use wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    #[test]
    fn row_padding_rounds_up_to_copy_alignment() {
        assert_eq!(align_to(256, COPY_BYTES_PER_ROW_ALIGNMENT), 256);
        assert_eq!(align_to(257, COPY_BYTES_PER_ROW_ALIGNMENT), 512);
        // 100px RGBA rows are 400 bytes, padded to 512.
        assert_eq!(align_to(4 * 100, COPY_BYTES_PER_ROW_ALIGNMENT), 512);
    }
}
