use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::compile::ShaderProgram;
use crate::events::{dispatch, translate, EventResponse, PointerTracker};
use crate::export::{ExportProgress, FrameExporter};
use crate::gpu::{FrameError, GpuState};
use crate::runtime::{fps_title, time_source_for, FpsCounter, FrameScheduler};
use crate::sketch::{plan_frame, ShaderSketch};
use crate::types::RendererConfig;

/// Aggregates everything the preview window needs between frames.
///
/// `gpu` is declared before `window` so the surface is dropped first.
pub(crate) struct WindowState {
    gpu: GpuState,
    window: Arc<Window>,
    sketch: ShaderSketch,
    exporter: FrameExporter,
    pointer: PointerTracker,
    fps: FpsCounter,
    escape_quits: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderFrameStatus {
    Presented,
    Captured { index: u64, progress: ExportProgress },
}

impl WindowState {
    pub(crate) fn new(
        window: Arc<Window>,
        config: &RendererConfig,
        program: &ShaderProgram,
    ) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuState::new(window.as_ref(), size, program, config)?;

        let export_size = gpu
            .capture_size()
            .unwrap_or_else(|| config.export_size());
        let mut exporter = FrameExporter::from_settings(&config.export, export_size)
            .context("invalid frame exporter configuration")?;
        exporter
            .start_export()
            .context("failed to start frame export")?;

        let capture_rate = exporter
            .capture_enabled()
            .then(|| exporter.frame_rate());
        let sketch = ShaderSketch::new(time_source_for(config.frozen_time, capture_rate));

        Ok(Self {
            gpu,
            window,
            sketch,
            exporter,
            pointer: PointerTracker::default(),
            fps: FpsCounter::new(Instant::now()),
            escape_quits: config.escape_quits,
        })
    }

    pub(crate) fn window(&self) -> &Window {
        self.window.as_ref()
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.gpu.resize(new_size);
    }

    /// Runs one frame: sample the clock, draw the sketch, hand captured pixels
    /// to the exporter and refresh the FPS title.
    pub(crate) fn render_frame(&mut self) -> Result<RenderFrameStatus, FrameError> {
        let frame = self.gpu.acquire()?;

        let ticket = self.exporter.begin();
        let time = self.sketch.advance();
        let size = self.gpu.size();
        let plan = plan_frame(time, (size.width, size.height));
        let capture_plan = ticket
            .and(self.gpu.capture_size())
            .map(|capture_size| plan_frame(time, capture_size));

        let captured = self
            .gpu
            .render_frame(frame, &plan, capture_plan.as_ref())?;

        let status = match (ticket, captured) {
            (Some(ticket), Some(frame)) => {
                let progress =
                    self.exporter
                        .end(ticket, frame.width, frame.height, &frame.pixels)?;
                RenderFrameStatus::Captured {
                    index: ticket.index(),
                    progress,
                }
            }
            _ => RenderFrameStatus::Presented,
        };

        let fps = self.fps.tick(Instant::now());
        self.window.set_title(&fps_title(fps));
        Ok(status)
    }
}

/// Opens the preview window and drives the sketch until it is closed.
pub(crate) fn run(config: RendererConfig, program: ShaderProgram) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(fps_title(0.0))
        .with_inner_size(window_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, &config, &program)
        .context("failed to initialise window renderer")?;
    let mut scheduler = FrameScheduler::new(config.target_fps);
    info!(
        width = config.surface_size.0,
        height = config.surface_size.1,
        target_fps = ?config.target_fps,
        vsync = config.vsync,
        capture = config.export.capture,
        "sketch running"
    );
    state.window().request_redraw();

    let mut failure: Option<anyhow::Error> = None;
    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            if let WindowEvent::RedrawRequested = event {
                match state.render_frame() {
                    Ok(RenderFrameStatus::Presented) => {
                        scheduler.mark_rendered(Instant::now());
                    }
                    Ok(RenderFrameStatus::Captured { index, progress }) => {
                        scheduler.mark_rendered(Instant::now());
                        tracing::trace!(index, "captured frame");
                        if progress == ExportProgress::Finished && state.exporter.should_exit() {
                            info!("frame export finished; exiting");
                            elwt.exit();
                        }
                    }
                    Err(FrameError::Surface(err)) => match err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            state.gpu.reconfigure();
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            error!("surface out of memory; exiting");
                            failure = Some(anyhow!("surface out of memory"));
                            elwt.exit();
                        }
                        wgpu::SurfaceError::Timeout => {
                            warn!("surface timeout; retrying next frame");
                        }
                        other => {
                            warn!("surface error: {other:?}; retrying next frame");
                        }
                    },
                    Err(FrameError::Export(err)) => {
                        error!(error = %err, "frame export failed");
                        failure = Some(anyhow::Error::new(err).context("frame export failed"));
                        elwt.exit();
                    }
                }
                return;
            }

            let Some(app_event) = translate(&event, &mut state.pointer) else {
                return;
            };
            match dispatch(&app_event, state.escape_quits) {
                EventResponse::Continue => {}
                EventResponse::Resize { width, height } => {
                    state.resize(PhysicalSize::new(width, height));
                    scheduler.reset();
                }
                EventResponse::Exit => elwt.exit(),
            }
        }
        Event::AboutToWait => {
            let now = Instant::now();
            if scheduler.ready_for_frame(now) {
                tracing::trace!("scheduler: issuing redraw now");
                state.window().request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else if let Some(deadline) = scheduler.next_deadline() {
                let ms = deadline.saturating_duration_since(now).as_millis();
                tracing::trace!(deadline_ms = ms, "scheduler: waiting until next frame");
                elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
            } else {
                elwt.set_control_flow(ControlFlow::Wait);
            }
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
