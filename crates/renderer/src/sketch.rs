//! Per-frame contract between the render loop and the sketch shader.
//!
//! Each frame the driver samples the clock, builds a [`FramePlan`] for the
//! drawable size and hands it to the GPU layer, which uploads the uniforms and
//! draws the rectangle inside one render pass:
//!
//! ```text
//!   TimeSource ─▶ ShaderSketch::advance ─▶ plan_frame(size) ─▶ GpuState::render
//!                  (clamped, monotonic)     u_time, u_resolution, rectangle
//! ```

use bytemuck::{Pod, Zeroable};

use crate::gpu::FrameUniforms;
use crate::runtime::{BoxedTimeSource, TimeSample};

/// Single vertex of the full-window rectangle, in pixel space, carrying the
/// mesh attributes sketches may declare: white `color`, a `normal` facing the
/// viewer and a `texcoord` running from 0 at the top-left to 1 at the
/// bottom-right corner.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
}

/// Time values handed to one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    pub seconds: f32,
    pub delta: f32,
    pub frame: u64,
}

/// Everything the GPU layer needs to draw one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    pub size: (u32, u32),
    pub uniforms: FrameUniforms,
    pub rectangle: [Vertex; 6],
}

/// Owns the sketch clock and guarantees `u_time` never runs backwards.
pub struct ShaderSketch {
    clock: BoxedTimeSource,
    last: Option<TimeSample>,
}

impl ShaderSketch {
    pub fn new(clock: BoxedTimeSource) -> Self {
        Self { clock, last: None }
    }

    /// Samples the clock for the next frame.
    pub fn advance(&mut self) -> FrameTime {
        let mut sample = self.clock.sample();
        let delta = match self.last {
            Some(previous) => {
                if sample.seconds < previous.seconds {
                    tracing::trace!(
                        sampled = sample.seconds,
                        previous = previous.seconds,
                        "clock stepped backwards; holding u_time"
                    );
                    sample.seconds = previous.seconds;
                }
                sample.seconds - previous.seconds
            }
            None => 0.0,
        };
        self.last = Some(sample);
        FrameTime {
            seconds: sample.seconds.max(0.0),
            delta,
            frame: sample.frame_index,
        }
    }

    pub fn reset(&mut self) {
        self.clock.reset();
        self.last = None;
    }
}

/// Builds the uniforms and geometry for one frame at the given drawable size.
pub fn plan_frame(time: FrameTime, size: (u32, u32)) -> FramePlan {
    let width = size.0.max(1) as f32;
    let height = size.1.max(1) as f32;
    FramePlan {
        size,
        uniforms: FrameUniforms {
            model_view_projection: ortho_projection(width, height),
            resolution: [width, height],
            time: time.seconds,
            time_delta: time.delta,
            frame: time.frame.min(i32::MAX as u64) as i32,
            _padding: [0; 3],
        },
        rectangle: rectangle_vertices(0.0, 0.0, width, height),
    }
}

/// Orthographic projection from pixel space (top-left origin) to clip space,
/// column-major as GLSL expects.
pub fn ortho_projection(width: f32, height: f32) -> [[f32; 4]; 4] {
    [
        [2.0 / width, 0.0, 0.0, 0.0],
        [0.0, -2.0 / height, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0, 1.0],
    ]
}

/// Two triangles covering the axis-aligned rectangle `(x, y)`-`(x + w, y + h)`.
pub fn rectangle_vertices(x: f32, y: f32, width: f32, height: f32) -> [Vertex; 6] {
    let corner = |u: f32, v: f32| Vertex {
        position: [x + u * width, y + v * height, 0.0, 1.0],
        color: [1.0; 4],
        normal: [0.0, 0.0, 1.0],
        texcoord: [u, v],
    };
    [
        corner(0.0, 0.0),
        corner(1.0, 0.0),
        corner(1.0, 1.0),
        corner(0.0, 0.0),
        corner(1.0, 1.0),
        corner(0.0, 1.0),
    ]
}
