use crossbeam_channel::bounded;

use crate::export::ExportError;
use crate::sketch::FramePlan;

use super::pipeline::{DrawTarget, PipelineLayouts, SketchPipeline};

/// Offscreen render target whose pixels are copied back for the frame exporter.
pub(crate) struct CaptureTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    pipeline: SketchPipeline,
    draw: DrawTarget,
    size: (u32, u32),
    padded_bytes_per_row: u32,
}

const BYTES_PER_PIXEL: u32 = 4;

impl CaptureTarget {
    pub fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Self {
        let (width, height) = (size.0.max(1), size.1.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("capture target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_bytes_per_row = padded_bytes_per_row(width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("capture readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        tracing::debug!(width, height, ?format, padded_bytes_per_row, "created capture target");

        Self {
            texture,
            view,
            readback,
            pipeline: SketchPipeline::new(device, layouts, format, 1, "capture pipeline"),
            draw: DrawTarget::new(device, layouts, "capture uniforms"),
            size: (width, height),
            padded_bytes_per_row,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Draws the frame into the capture texture and queues the copy into the
    /// readback buffer.
    pub fn encode(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        plan: &FramePlan,
        background: wgpu::Color,
    ) {
        self.draw.upload(queue, plan);
        self.draw
            .encode(encoder, &self.pipeline, &self.view, None, background);

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.size.1),
                },
            },
            wgpu::Extent3d {
                width: self.size.0,
                height: self.size.1,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Maps the readback buffer after submission and returns tightly packed
    /// RGBA8 rows. Blocks until the GPU has finished the copy.
    pub fn read_pixels(&self, device: &wgpu::Device) -> Result<Vec<u8>, ExportError> {
        let slice = self.readback.slice(..);
        let (sender, receiver) = bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| ExportError::Readback(format!("device poll failed: {err}")))?;

        receiver
            .recv()
            .map_err(|_| ExportError::Readback("map callback was dropped".into()))?
            .map_err(|err| ExportError::Readback(err.to_string()))?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, self.size.0, self.size.1, self.padded_bytes_per_row)
        };
        self.readback.unmap();
        Ok(pixels)
    }
}

/// Row pitch rounded up to wgpu's copy alignment.
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn unpad_rows(padded: &[u8], width: u32, height: u32, padded_bytes_per_row: u32) -> Vec<u8> {
    let row_bytes = (width * BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in padded
        .chunks(padded_bytes_per_row as usize)
        .take(height as usize)
    {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    pixels
}
