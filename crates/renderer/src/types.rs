use std::path::PathBuf;

/// Location of the vertex/fragment source pair that makes up the sketch shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPair {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderPair {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/shader.vert"),
            fragment: PathBuf::from("shaders/shader.frag"),
        }
    }
}

/// Anti-aliasing policy for the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Antialiasing {
    /// Pick the highest sample count supported by the surface format.
    Auto,
    /// Disable MSAA and render directly into the swapchain.
    Off,
    /// Request a specific MSAA sample count (clamped to what the device supports).
    Samples(u32),
}

impl Default for Antialiasing {
    fn default() -> Self {
        Self::Off
    }
}

/// Output color handling for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceMode {
    /// Match the host toolkit: shader outputs are written to the swapchain untouched.
    #[default]
    Auto,
    /// Treat shader outputs as gamma-encoded; use non-sRGB surfaces.
    Gamma,
    /// Treat shader outputs as linear and use sRGB swapchains/textures for conversion.
    Linear,
}

/// Frame exporter configuration as handed to the renderer.
///
/// `capture` is the explicit switch for the per-frame capture path. When it is
/// off the exporter is still set up and armed, but nothing touches the disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub capture: bool,
    pub output_dir: PathBuf,
    /// Inclusive frame-index bounds of the captured sequence.
    pub frame_start: u64,
    pub frame_end: u64,
    /// Nominal playback rate of the sequence.
    ///
    /// With `capture` on, `u_time` is `frame_index / frame_rate` for the whole
    /// session, so frame N of the sequence always sees the same time. This
    /// covers frames before `frame_start` and, without `auto_exit`, frames after
    /// the sequence finished: the window preview then runs at the export rate
    /// rather than in elapsed seconds.
    pub frame_rate: f32,
    pub overwrite_sequence: bool,
    pub auto_exit: bool,
    /// Capture resolution; `None` uses the window size.
    pub size: Option<(u32, u32)>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            capture: false,
            output_dir: PathBuf::from("out"),
            frame_start: 0,
            frame_end: 1000,
            frame_rate: 30.0,
            overwrite_sequence: true,
            auto_exit: true,
            size: None,
        }
    }
}

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors the resolved CLI flags and config file and tells
/// the renderer which shader pair to compile, how the window should behave and
/// how the frame exporter is wired.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Vertex/fragment shader sources.
    pub shader: ShaderPair,
    /// Frame-rate cap for the render loop; `None` renders on every redraw.
    pub target_fps: Option<f32>,
    /// Request vertical sync (FIFO presentation).
    pub vsync: bool,
    /// Clear colour applied before the rectangle is drawn.
    pub background: [f64; 3],
    /// Anti-aliasing mode requested by the caller.
    pub antialiasing: Antialiasing,
    /// Desired color handling for swapchain and capture textures.
    pub color_space: ColorSpaceMode,
    /// Close the window when Escape is pressed.
    pub escape_quits: bool,
    /// Frame exporter wiring.
    pub export: ExportSettings,
    /// Freeze `u_time` at a fixed timestamp instead of following the clock.
    pub frozen_time: Option<f32>,
    /// Directory that receives the wrapped GLSL sources for debugging.
    pub dump_wrapped: Option<PathBuf>,
}

impl Default for RendererConfig {
    /// Stock sketch setup: 1024x768 at 60 FPS with vsync and a black background.
    fn default() -> Self {
        Self {
            surface_size: (1024, 768),
            shader: ShaderPair::default(),
            target_fps: Some(60.0),
            vsync: true,
            background: [0.0, 0.0, 0.0],
            antialiasing: Antialiasing::default(),
            color_space: ColorSpaceMode::default(),
            escape_quits: true,
            export: ExportSettings::default(),
            frozen_time: None,
            dump_wrapped: None,
        }
    }
}

impl RendererConfig {
    /// Resolution frames are captured at when the exporter is active.
    pub fn export_size(&self) -> (u32, u32) {
        self.export.size.unwrap_or(self.surface_size)
    }
}
