//! Renderer crate for fragview, a minimal fragment-shader sketch viewer.
//!
//! The crate wraps a vertex/fragment GLSL pair written against the classic
//! sketch conventions (loose `u_time` / `u_resolution` uniforms, GLSL 120/150),
//! compiles it with `wgpu` and draws it over the whole window every frame. The
//! overall flow is:
//!
//! ```text
//!   CLI / fragview
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ ShaderProgram::load ──▶ WindowState ──▶ winit event loop
//!                                                   │
//!                     AppEvent ◀── translate ◀──────┤
//!                        │                          └─▶ render_frame()
//!                        ▼                                 │
//!                     dispatch ─▶ Resize / Exit            ├─▶ GPU UBO + rectangle
//!                                                          └─▶ FrameExporter (capture mode)
//! ```
//!
//! `WindowState` owns all GPU resources and the frame exporter, while
//! `Renderer` is the thin entry point used by the binary.

mod compile;
mod events;
mod export;
mod gpu;
mod runtime;
mod sketch;
mod types;
mod window;

use anyhow::Result;

pub use compile::ShaderProgram;
pub use events::{dispatch, translate, AppEvent, EventResponse, PointerTracker};
pub use export::{
    sequence_file_name, CaptureTicket, ExportError, ExportProgress, ExportState, FrameExporter,
};
pub use gpu::{CapturedFrame, FrameError, FrameUniforms};
pub use runtime::{
    fps_title, time_source_for, BoxedTimeSource, FixedTimeSource, FpsCounter, FrameScheduler,
    FrameStepTimeSource, SystemTimeSource, TimeSample, TimeSource,
};
pub use sketch::{
    ortho_projection, plan_frame, rectangle_vertices, FramePlan, FrameTime, ShaderSketch, Vertex,
};
pub use types::{Antialiasing, ColorSpaceMode, ExportSettings, RendererConfig, ShaderPair};

/// Entry point that loads the sketch shaders and runs the preview window.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Loads and wraps the shader pair, then blocks on the event loop until the
    /// window closes or the export sequence completes with auto-exit.
    pub fn run(self) -> Result<()> {
        let program = ShaderProgram::load(&self.config.shader)?;
        if let Some(dir) = &self.config.dump_wrapped {
            program.dump(dir)?;
        }
        tracing::info!(
            vertex = %self.config.shader.vertex.display(),
            fragment = %self.config.shader.fragment.display(),
            "loaded sketch shaders"
        );
        window::run(self.config, program)
    }
}
