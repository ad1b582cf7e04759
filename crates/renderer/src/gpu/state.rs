use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::compile::ShaderProgram;
use crate::export::ExportError;
use crate::sketch::FramePlan;
use crate::types::RendererConfig;

use super::capture::CaptureTarget;
use super::context::GpuContext;
use super::pipeline::{DrawTarget, PipelineLayouts, SketchPipeline};

/// Errors raised while producing a single frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Tightly packed RGBA8 pixels read back from the capture target.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

struct MultisampleTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl MultisampleTarget {
    fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: PhysicalSize<u32>,
        sample_count: u32,
    ) -> Self {
        let extent = wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("msaa color target"),
            size: extent,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Owns every GPU resource of the running sketch.
pub(crate) struct GpuState {
    context: GpuContext,
    pipeline: SketchPipeline,
    draw: DrawTarget,
    multisample_target: Option<MultisampleTarget>,
    capture: Option<CaptureTarget>,
    background: wgpu::Color,
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        program: &ShaderProgram,
        config: &RendererConfig,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(
            target,
            initial_size,
            config.antialiasing,
            config.color_space,
            config.vsync,
        )?;
        let layouts = PipelineLayouts::new(&context.device, program)
            .context("failed to compile sketch shaders")?;
        let pipeline = SketchPipeline::new(
            &context.device,
            &layouts,
            context.surface_format,
            context.sample_count,
            "sketch pipeline",
        );
        let draw = DrawTarget::new(&context.device, &layouts, "surface uniforms");

        let capture = if config.export.capture {
            let (width, height) = config.export_size();
            let max = context.max_texture_dimension;
            if width > max || height > max {
                anyhow::bail!(
                    "capture size {width}x{height} exceeds the GPU max texture dimension {max}"
                );
            }
            Some(CaptureTarget::new(
                &context.device,
                &layouts,
                context.color_space.capture_format(),
                (width, height),
            ))
        } else {
            None
        };

        let multisample_target = (context.sample_count > 1).then(|| {
            MultisampleTarget::new(
                &context.device,
                context.surface_format,
                context.size,
                context.sample_count,
            )
        });

        let [r, g, b] = config.background;
        Ok(Self {
            context,
            pipeline,
            draw,
            multisample_target,
            capture,
            background: wgpu::Color { r, g, b, a: 1.0 },
        })
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub(crate) fn capture_size(&self) -> Option<(u32, u32)> {
        self.capture.as_ref().map(CaptureTarget::size)
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.context.resize(new_size);
        self.multisample_target = (self.context.sample_count > 1).then(|| {
            MultisampleTarget::new(
                &self.context.device,
                self.context.surface_format,
                self.context.size,
                self.context.sample_count,
            )
        });
    }

    pub(crate) fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    /// Acquires the next swapchain image. Done before the exporter is asked
    /// for a ticket so that surface hiccups never skip a captured frame.
    pub(crate) fn acquire(&self) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        self.context.surface.get_current_texture()
    }

    /// Renders one frame into `frame` and, when `capture` is given, the same
    /// sketch into the capture texture first.
    pub(crate) fn render_frame(
        &self,
        frame: wgpu::SurfaceTexture,
        plan: &FramePlan,
        capture: Option<&FramePlan>,
    ) -> Result<Option<CapturedFrame>, ExportError> {
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });

        let capture_target = match (self.capture.as_ref(), capture) {
            (Some(target), Some(capture_plan)) => {
                target.encode(
                    &self.context.queue,
                    &mut encoder,
                    capture_plan,
                    self.background,
                );
                Some(target)
            }
            (None, Some(_)) => {
                tracing::warn!("capture requested without a capture target; skipping");
                None
            }
            _ => None,
        };

        self.draw.upload(&self.context.queue, plan);
        let (attachment_view, resolve_target) = match self.multisample_target.as_ref() {
            Some(msaa) => (&msaa.view, Some(&view)),
            None => (&view, None),
        };
        self.draw.encode(
            &mut encoder,
            &self.pipeline,
            attachment_view,
            resolve_target,
            self.background,
        );

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        let Some(target) = capture_target else {
            return Ok(None);
        };
        let pixels = target.read_pixels(&self.context.device)?;
        let (width, height) = target.size();
        Ok(Some(CapturedFrame {
            width,
            height,
            pixels,
        }))
    }
}
