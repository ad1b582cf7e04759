//! Merges built-in defaults, the config file and CLI flags into the renderer
//! configuration. CLI flags win over the file, which wins over the defaults.

use std::path::Path;

use anyhow::{bail, Context, Result};
use renderer::{Antialiasing, ColorSpaceMode, ExportSettings, RendererConfig, ShaderPair};
use sketchconfig::{AntialiasSetting, ColorSpaceSetting, SketchConfig};

use crate::cli::RunArgs;

pub const DEFAULT_CONFIG_FILE: &str = "fragview.toml";

/// Fully merged settings plus the CLI-only options the file cannot express.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub sketch: SketchConfig,
    pub frozen_time: Option<f32>,
    pub dump_wrapped: Option<std::path::PathBuf>,
}

pub fn resolve(args: &RunArgs) -> Result<ResolvedSettings> {
    let mut sketch = load_config(args)?;
    apply_overrides(&mut sketch, args);
    sketch
        .validate()
        .context("invalid settings after applying command-line overrides")?;

    if let Some(time) = args.time {
        if !time.is_finite() || time < 0.0 {
            bail!("--time must be a non-negative number of seconds, got {time}");
        }
    }

    Ok(ResolvedSettings {
        sketch,
        frozen_time: args.time,
        dump_wrapped: args.dump_wrapped.clone(),
    })
}

fn load_config(args: &RunArgs) -> Result<SketchConfig> {
    if let Some(path) = &args.config {
        return SketchConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }

    let default = Path::new(DEFAULT_CONFIG_FILE);
    if default.is_file() {
        tracing::debug!(path = %default.display(), "using config from working directory");
        SketchConfig::load(default)
            .with_context(|| format!("failed to load config {}", default.display()))
    } else {
        Ok(SketchConfig::default())
    }
}

fn apply_overrides(sketch: &mut SketchConfig, args: &RunArgs) {
    if let Some(vertex) = &args.vertex {
        sketch.shader.vertex = vertex.clone();
    }
    if let Some(fragment) = &args.fragment {
        sketch.shader.fragment = fragment.clone();
    }
    if let Some((width, height)) = args.size {
        sketch.window.width = width;
        sketch.window.height = height;
    }
    if let Some(fps) = args.fps {
        sketch.window.frame_rate = fps;
    }
    if args.no_vsync {
        sketch.window.vsync = false;
    }
    if let Some(antialias) = args.antialias {
        sketch.window.antialias = Some(match antialias {
            Antialiasing::Auto => AntialiasSetting::Auto,
            Antialiasing::Off => AntialiasSetting::Off,
            Antialiasing::Samples(samples) => {
                AntialiasSetting::from_samples(samples).unwrap_or(AntialiasSetting::Auto)
            }
        });
    }
    if let Some(color_space) = args.color_space {
        sketch.window.color_space = match color_space {
            ColorSpaceMode::Auto => ColorSpaceSetting::Auto,
            ColorSpaceMode::Gamma => ColorSpaceSetting::Gamma,
            ColorSpaceMode::Linear => ColorSpaceSetting::Linear,
        };
    }
    if args.capture {
        sketch.export.capture = true;
    }
    if let Some(out) = &args.out {
        sketch.export.output_dir = out.clone();
    }
    if let Some((start, end)) = args.frames {
        sketch.export.frame_start = start;
        sketch.export.frame_end = end;
    }
}

impl ResolvedSettings {
    pub fn renderer_config(&self) -> RendererConfig {
        let window = &self.sketch.window;
        let export = &self.sketch.export;

        let antialiasing = window
            .antialias
            .map(antialiasing_from_setting)
            .unwrap_or_default();
        let color_space = match window.color_space {
            ColorSpaceSetting::Auto => ColorSpaceMode::Auto,
            ColorSpaceSetting::Gamma => ColorSpaceMode::Gamma,
            ColorSpaceSetting::Linear => ColorSpaceMode::Linear,
        };
        let export_size = (export.width.is_some() || export.height.is_some())
            .then(|| self.sketch.export_size());

        RendererConfig {
            surface_size: (window.width, window.height),
            shader: ShaderPair {
                vertex: self.sketch.shader.vertex.clone(),
                fragment: self.sketch.shader.fragment.clone(),
            },
            target_fps: (window.frame_rate > 0.0).then_some(window.frame_rate),
            vsync: window.vsync,
            background: window.background.map(|channel| f64::from(channel) / 255.0),
            antialiasing,
            color_space,
            escape_quits: window.escape_quits,
            export: ExportSettings {
                capture: export.capture,
                output_dir: export.output_dir.clone(),
                frame_start: export.frame_start,
                frame_end: export.frame_end,
                frame_rate: export.frame_rate,
                overwrite_sequence: export.overwrite_sequence,
                auto_exit: export.auto_exit,
                size: export_size,
            },
            frozen_time: self.frozen_time,
            dump_wrapped: self.dump_wrapped.clone(),
        }
    }

    /// TOML view of the merged settings, with CLI-only options as comments.
    pub fn describe(&self) -> Result<String> {
        let mut rendered = self
            .sketch
            .to_toml_string()
            .context("failed to render resolved settings")?;
        if let Some(time) = self.frozen_time {
            rendered.push_str(&format!("\n# u_time frozen at {time} s (--time)\n"));
        }
        if let Some(dir) = &self.dump_wrapped {
            rendered.push_str(&format!(
                "\n# wrapped shaders dumped to {} (--dump-wrapped)\n",
                dir.display()
            ));
        }
        Ok(rendered)
    }
}

fn antialiasing_from_setting(setting: AntialiasSetting) -> Antialiasing {
    match setting {
        AntialiasSetting::Auto => Antialiasing::Auto,
        AntialiasSetting::Off => Antialiasing::Off,
        other => Antialiasing::Samples(other.samples()),
    }
}
