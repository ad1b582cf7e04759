use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level layout of a `fragview.toml` file.
///
/// Every section is optional; an empty file yields the stock sketch setup
/// (60 FPS with vsync, `shaders/shader.{vert,frag}`, exporter armed for frames
/// 0-1000 into `out/` with capture disabled).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SketchConfig {
    pub window: WindowSection,
    pub shader: ShaderSection,
    pub export: ExportSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
    pub width: u32,
    pub height: u32,
    /// Target frame rate; `0` renders on every vblank without a cap.
    pub frame_rate: f32,
    pub vsync: bool,
    /// Clear colour as 8-bit RGB.
    pub background: [u8; 3],
    #[serde(
        deserialize_with = "deserialize_antialias_opt",
        serialize_with = "serialize_antialias_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub antialias: Option<AntialiasSetting>,
    pub color_space: ColorSpaceSetting,
    pub escape_quits: bool,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            frame_rate: 60.0,
            vsync: true,
            background: [0, 0, 0],
            antialias: None,
            color_space: ColorSpaceSetting::Auto,
            escape_quits: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShaderSection {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderSection {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/shader.vert"),
            fragment: PathBuf::from("shaders/shader.frag"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSection {
    /// Enables the per-frame capture path. Off by default: the exporter is
    /// configured and armed but never writes.
    pub capture: bool,
    pub output_dir: PathBuf,
    pub frame_start: u64,
    pub frame_end: u64,
    pub frame_rate: f32,
    pub overwrite_sequence: bool,
    pub auto_exit: bool,
    /// Capture size; falls back to the window size when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            capture: false,
            output_dir: PathBuf::from("out"),
            frame_start: 0,
            frame_end: 1000,
            frame_rate: 30.0,
            overwrite_sequence: true,
            auto_exit: true,
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntialiasSetting {
    Auto,
    Off,
    Samples2,
    Samples4,
    Samples8,
    Samples16,
}

impl AntialiasSetting {
    pub fn from_samples(samples: u32) -> Option<Self> {
        match samples {
            0 | 1 => Some(Self::Off),
            2 => Some(Self::Samples2),
            4 => Some(Self::Samples4),
            8 => Some(Self::Samples8),
            16 => Some(Self::Samples16),
            _ => None,
        }
    }

    /// MSAA sample count; `Auto` reports 0 as it is resolved against the device.
    pub fn samples(self) -> u32 {
        match self {
            Self::Auto => 0,
            Self::Off => 1,
            Self::Samples2 => 2,
            Self::Samples4 => 4,
            Self::Samples8 => 8,
            Self::Samples16 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpaceSetting {
    #[default]
    Auto,
    Gamma,
    Linear,
}

fn deserialize_antialias_opt<'de, D>(deserializer: D) -> Result<Option<AntialiasSetting>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(i64),
    }

    let helper: Option<Helper> = Option::deserialize(deserializer)?;
    let result = match helper {
        None => None,
        Some(Helper::Str(raw)) => Some(parse_antialias(&raw).map_err(de::Error::custom)?),
        Some(Helper::Num(value)) => {
            if value < 0 {
                return Err(de::Error::custom("antialias value must be non-negative"));
            }
            let raw = value.to_string();
            Some(parse_antialias(&raw).map_err(de::Error::custom)?)
        }
    };
    Ok(result)
}

fn serialize_antialias_opt<S>(value: &Option<AntialiasSetting>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        None => serializer.serialize_none(),
        Some(AntialiasSetting::Auto) => serializer.serialize_str("auto"),
        Some(AntialiasSetting::Off) => serializer.serialize_str("off"),
        Some(setting) => serializer.serialize_u32(setting.samples()),
    }
}

fn parse_antialias(raw: &str) -> Result<AntialiasSetting, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "max" | "default" => Ok(AntialiasSetting::Auto),
        "off" | "none" | "disable" | "disabled" | "0" | "1" => Ok(AntialiasSetting::Off),
        "2" => Ok(AntialiasSetting::Samples2),
        "4" => Ok(AntialiasSetting::Samples4),
        "8" => Ok(AntialiasSetting::Samples8),
        "16" => Ok(AntialiasSetting::Samples16),
        other => Err(format!("invalid antialias setting '{other}'")),
    }
}

impl SketchConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SketchConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Renders the configuration back into `fragview.toml` syntax.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Capture size for the exporter, defaulting to the window size per axis.
    pub fn export_size(&self) -> (u32, u32) {
        (
            self.export.width.unwrap_or(self.window.width),
            self.export.height.unwrap_or(self.window.height),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(
                "window.width and window.height must be greater than zero".into(),
            ));
        }

        if !self.window.frame_rate.is_finite() || self.window.frame_rate < 0.0 {
            return Err(ConfigError::Invalid(
                "window.frame_rate must be >= 0 (0 = uncapped)".into(),
            ));
        }

        for (field, path) in [
            ("shader.vertex", &self.shader.vertex),
            ("shader.fragment", &self.shader.fragment),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} may not be empty")));
            }
        }

        let export = &self.export;
        if export.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "export.output_dir may not be empty".into(),
            ));
        }

        if export.frame_end < export.frame_start {
            return Err(ConfigError::Invalid(format!(
                "export.frame_end ({}) must not be before export.frame_start ({})",
                export.frame_end, export.frame_start
            )));
        }

        if !export.frame_rate.is_finite() || export.frame_rate <= 0.0 {
            return Err(ConfigError::Invalid(
                "export.frame_rate must be greater than zero".into(),
            ));
        }

        if export.width == Some(0) || export.height == Some(0) {
            return Err(ConfigError::Invalid(
                "export.width and export.height must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for ColorSpaceSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpaceSetting::Auto => f.write_str("auto"),
            ColorSpaceSetting::Gamma => f.write_str("gamma"),
            ColorSpaceSetting::Linear => f.write_str("linear"),
        }
    }
}
