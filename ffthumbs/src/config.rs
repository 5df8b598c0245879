//! Generator and output configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validator::{ValidationError, ValidationErrorKind};

/// Destination pattern used when an output does not set one.
pub const DEFAULT_FILENAME: &str = "%04d.jpg";

/// Worker pool size used when the configured concurrency is zero.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Map a configured concurrency to the effective pool size.
pub fn effective_concurrency(concurrency: usize) -> usize {
    if concurrency == 0 {
        DEFAULT_CONCURRENCY
    } else {
        concurrency
    }
}

/// A config value written either as a name or as its numeric code.
#[derive(Deserialize)]
#[serde(untagged)]
enum NameOrCode {
    Code(i64),
    Name(String),
}

impl NameOrCode {
    fn into_string(self) -> String {
        match self {
            NameOrCode::Code(code) => code.to_string(),
            NameOrCode::Name(name) => name,
        }
    }
}

/// How frames are fitted into a fixed `width x height` box.
///
/// Only meaningful when both dimensions are fixed positive values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "NameOrCode")]
pub enum ScaleBehavior {
    /// Plain scale, the aspect ratio is not preserved.
    #[default]
    None,
    /// Shrink to fit and pad with black bars (letterbox or pillarbox).
    FillKeepAspect,
    /// Grow to fill and crop the overflow.
    CropToFit,
}

impl ScaleBehavior {
    pub fn code(self) -> u8 {
        match self {
            ScaleBehavior::None => 0,
            ScaleBehavior::FillKeepAspect => 1,
            ScaleBehavior::CropToFit => 2,
        }
    }
}

impl fmt::Display for ScaleBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleBehavior::None => write!(f, "none"),
            ScaleBehavior::FillKeepAspect => write!(f, "fill_keep_aspect"),
            ScaleBehavior::CropToFit => write!(f, "crop_to_fit"),
        }
    }
}

impl FromStr for ScaleBehavior {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(ScaleBehavior::None),
            "1" | "fill" | "fill_keep_aspect" => Ok(ScaleBehavior::FillKeepAspect),
            "2" | "crop" | "crop_to_fit" => Ok(ScaleBehavior::CropToFit),
            other => Err(ValidationError::new(
                ValidationErrorKind::ScaleBehavior,
                format!("unknown scale behavior: {other}"),
            )),
        }
    }
}

impl TryFrom<NameOrCode> for ScaleBehavior {
    type Error = ValidationError;

    fn try_from(raw: NameOrCode) -> Result<Self, Self::Error> {
        raw.into_string().parse()
    }
}

/// Kind of artifact an output produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "NameOrCode")]
pub enum OutputType {
    /// One image per sampled frame.
    #[default]
    Thumbs,
    /// Sampled frames tiled into `columns x rows` sheets.
    Sprites,
}

impl OutputType {
    /// Prefix used for the output's node names in the filter graph.
    pub fn node_prefix(self) -> &'static str {
        match self {
            OutputType::Thumbs => "thumbs",
            OutputType::Sprites => "sprites",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_prefix())
    }
}

impl FromStr for OutputType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "thumbs" | "thumb" | "thumbnails" => Ok(OutputType::Thumbs),
            "1" | "sprites" | "sprite" => Ok(OutputType::Sprites),
            other => Err(ValidationError::new(
                ValidationErrorKind::OutputType,
                format!("unknown output type: {other}"),
            )),
        }
    }
}

impl TryFrom<NameOrCode> for OutputType {
    type Error = ValidationError;

    fn try_from(raw: NameOrCode) -> Result<Self, Self::Error> {
        raw.into_string().parse()
    }
}

/// Output resolution.
///
/// A dimension of `-1` is derived from the other one, keeping the aspect
/// ratio. Equality is structural, outputs with equal scale configs (and equal
/// intervals) share their selection and scaling work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub behavior: ScaleBehavior,
}

impl ScaleConfig {
    pub fn new(width: i32, height: i32, behavior: ScaleBehavior) -> Self {
        Self {
            width,
            height,
            behavior,
        }
    }

    pub fn is_fixed_resolution(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self::new(320, 180, ScaleBehavior::None)
    }
}

/// Sprite grid size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpriteDimensions {
    pub columns: u32,
    pub rows: u32,
}

impl SpriteDimensions {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }
}

impl Default for SpriteDimensions {
    fn default() -> Self {
        Self::new(8, 8)
    }
}

fn default_snapshot_interval() -> Duration {
    Duration::from_secs(7)
}

/// One output stream of the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Position in the generator's output list, assigned at construction.
    #[serde(skip)]
    pub(crate) index: usize,

    /// Destination pattern (`%04d.jpg` style), can be overridden per request.
    #[serde(default)]
    pub dst_path: String,

    #[serde(default)]
    pub scale: ScaleConfig,

    /// Minimum time between two sampled frames.
    #[serde(
        rename = "snapshot_interval_ms",
        with = "duration_millis",
        default = "default_snapshot_interval"
    )]
    pub snapshot_interval: Duration,

    #[serde(default, rename = "type")]
    pub output_type: OutputType,

    /// Grid size, only used by sprite outputs.
    #[serde(default)]
    pub sprites: SpriteDimensions,

    /// `-q:v` value, 0 keeps the encoder default, otherwise 1-31 (lower is better).
    #[serde(default)]
    pub quality: u32,
}

impl OutputConfig {
    pub fn thumbs(snapshot_interval: Duration, scale: ScaleConfig) -> Self {
        Self {
            snapshot_interval,
            scale,
            ..Self::default()
        }
    }

    pub fn sprites(
        snapshot_interval: Duration,
        scale: ScaleConfig,
        dimensions: SpriteDimensions,
    ) -> Self {
        Self {
            snapshot_interval,
            scale,
            output_type: OutputType::Sprites,
            sprites: dimensions,
            ..Self::default()
        }
    }

    pub fn with_dst(mut self, dst_path: impl Into<String>) -> Self {
        self.dst_path = dst_path.into();
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            index: 0,
            dst_path: String::new(),
            scale: ScaleConfig::default(),
            snapshot_interval: default_snapshot_interval(),
            output_type: OutputType::Thumbs,
            sprites: SpriteDimensions::default(),
            quality: 0,
        }
    }
}

/// Configuration for [`crate::Generator`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Path to the ffmpeg binary, looked up in `PATH` when unset.
    pub ffmpeg_path: Option<PathBuf>,
    /// Maximum number of concurrent ffmpeg processes, 0 means [`DEFAULT_CONCURRENCY`].
    pub concurrency: usize,
    /// Headers passed to ffmpeg for network inputs.
    pub headers: BTreeMap<String, String>,
    pub outputs: Vec<OutputConfig>,
    /// Skip `-progress` reporting.
    pub disable_progress_logs: bool,
    /// Overwrite existing destination files (`-y`).
    pub overwrite: bool,
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
