use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::{Antialiasing, ColorSpaceMode};

#[derive(Parser, Debug)]
#[command(
    name = "fragview",
    author,
    version,
    about = "Minimal GLSL sketch viewer with an optional PNG sequence exporter",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Configuration file (defaults to `fragview.toml` in the working directory when present).
    #[arg(long, value_name = "FILE", env = "FRAGVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Vertex shader source.
    #[arg(long, value_name = "PATH")]
    pub vertex: Option<PathBuf>,

    /// Fragment shader source.
    #[arg(long, value_name = "PATH")]
    pub fragment: Option<PathBuf>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Target frame rate for the render loop (0=uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Disable vertical sync.
    #[arg(long)]
    pub no_vsync: bool,

    /// Anti-aliasing policy: `auto`, `off`, or an explicit MSAA sample count (e.g. `4`).
    #[arg(long, value_name = "MODE", value_parser = parse_antialias)]
    pub antialias: Option<Antialiasing>,

    /// Output color space handling: `auto`, `gamma`, or `linear`.
    #[arg(long, value_name = "MODE", value_parser = parse_color_space)]
    pub color_space: Option<ColorSpaceMode>,

    /// Enable the frame exporter's capture path and write a PNG sequence.
    #[arg(long)]
    pub capture: bool,

    /// Output directory for the PNG sequence.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Inclusive frame range to capture (e.g. `0..300`).
    #[arg(long, value_name = "START..END", value_parser = parse_frame_range)]
    pub frames: Option<(u64, u64)>,

    /// Freeze `u_time` at the given number of seconds.
    #[arg(long, value_name = "SECONDS")]
    pub time: Option<f32>,

    /// Write the wrapped GLSL sources to this directory before compiling.
    #[arg(long, value_name = "DIR")]
    pub dump_wrapped: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the fully resolved settings as TOML and exit.
    Config,
    /// Wrap and validate both shader stages without opening a window.
    Check,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_antialias(value: &str) -> Result<Antialiasing, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("anti-alias mode must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "max" | "default" => Ok(Antialiasing::Auto),
        "off" | "none" | "disable" | "disabled" | "0" => Ok(Antialiasing::Off),
        _ => {
            let samples: u32 = normalized.parse().map_err(|_| {
                format!("invalid anti-alias sample count '{trimmed}'; use auto/off or 2/4/8/16")
            })?;

            if samples == 1 {
                return Ok(Antialiasing::Off);
            }

            if !matches!(samples, 2 | 4 | 8 | 16) {
                return Err(format!(
                    "unsupported sample count {samples}; supported values are 2, 4, 8, or 16"
                ));
            }

            Ok(Antialiasing::Samples(samples))
        }
    }
}

pub fn parse_color_space(value: &str) -> Result<ColorSpaceMode, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("color space must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" => Ok(ColorSpaceMode::Auto),
        "gamma" | "srgb-off" => Ok(ColorSpaceMode::Gamma),
        "linear" | "srgb" => Ok(ColorSpaceMode::Linear),
        other => Err(format!(
            "unknown color space '{other}'; expected auto, gamma, or linear"
        )),
    }
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

/// Accepts `START..END`, `START..=END` or `START-END`; both bounds are inclusive.
pub fn parse_frame_range(value: &str) -> Result<(u64, u64), String> {
    let trimmed = value.trim();
    let (start, end) = trimmed
        .split_once("..=")
        .or_else(|| trimmed.split_once(".."))
        .or_else(|| trimmed.split_once('-'))
        .ok_or_else(|| "expected START..END".to_string())?;
    let start = start
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid start frame '{}'", start.trim()))?;
    let end = end
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid end frame '{}'", end.trim()))?;
    if end < start {
        return Err(format!("end frame {end} is before start frame {start}"));
    }
    Ok((start, end))
}
