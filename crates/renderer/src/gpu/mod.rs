//! GPU side of the sketch renderer.
//!
//! - `context` owns the wgpu instance, device and surface and reconfigures the
//!   swapchain when the window resizes.
//! - `pipeline` turns the wrapped GLSL into render pipelines and owns the
//!   per-target uniform and vertex buffers.
//! - `uniforms` mirrors the injected uniform block.
//! - `capture` renders into an offscreen texture and reads the pixels back for
//!   the frame exporter.
//! - `state` glues everything together behind `GpuState`, used by `window`.

mod capture;
mod context;
mod pipeline;
mod state;
mod uniforms;

pub(crate) use state::GpuState;
pub use state::{CapturedFrame, FrameError};
pub use uniforms::FrameUniforms;
