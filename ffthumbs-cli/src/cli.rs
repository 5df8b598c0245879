use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use ffthumbs::{OutputType, ScaleBehavior, TimeUnit};

#[derive(Parser, Debug)]
#[command(name = "ffthumbs", version, about = "Thumbnail and sprite sheet generation with ffmpeg")]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file (`[thumbs]` and `[screens]` tables)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the ffmpeg binary, searched in PATH when unset
    #[arg(long, global = true, env = "FFMPEG_PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(long = "header", global = true)]
    pub headers: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample frames at a fixed interval into thumbnails or sprite sheets
    Thumbs(ThumbsArgs),
    /// Take single screenshots at chosen or evenly spaced time points
    Screens(ScreensArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ThumbsArgs {
    /// Media file or URL (repeatable, several inputs run concurrently)
    #[arg(short = 'i', long = "input", required = true)]
    pub inputs: Vec<String>,

    /// Snapshot interval, e.g. `7s`, `6500ms`, `1m`
    #[arg(long, value_parser = parse_interval, default_value = "7s")]
    pub interval: Duration,

    /// Output width, -1 derives it from the height
    #[arg(long, default_value_t = 320, allow_negative_numbers = true)]
    pub width: i32,

    /// Output height, -1 derives it from the width
    #[arg(long, default_value_t = 180, allow_negative_numbers = true)]
    pub height: i32,

    /// Scale behavior: none, fill, crop (or 0, 1, 2)
    #[arg(long, default_value = "none")]
    pub behavior: ScaleBehavior,

    /// Output type: thumbs, sprites (or 0, 1)
    #[arg(long = "type", default_value = "thumbs")]
    pub output_type: OutputType,

    /// Sprite sheet rows
    #[arg(long, default_value_t = 8)]
    pub rows: u32,

    /// Sprite sheet columns
    #[arg(long, default_value_t = 8)]
    pub cols: u32,

    /// JPEG quality, 1 (best) to 31, 0 keeps the encoder default
    #[arg(long, default_value_t = 0)]
    pub quality: u32,

    /// Destination pattern
    #[arg(long, default_value = "thumbs/%04d.jpg")]
    pub dst: String,

    /// Maximum concurrent ffmpeg processes
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Do not request progress reports from ffmpeg
    #[arg(long)]
    pub no_progress: bool,

    /// Overwrite existing files
    #[arg(short = 'y', long)]
    pub overwrite: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ScreensArgs {
    /// Media file or URL
    #[arg(short = 'i', long = "input")]
    pub input: String,

    /// Number of evenly spaced screenshots
    #[arg(short = 'n', long, default_value_t = 20, conflicts_with = "at")]
    pub count: usize,

    /// Time points in seconds or percent, e.g. `--at 10,50%`
    #[arg(long, value_delimiter = ',')]
    pub at: Vec<TimeUnit>,

    /// Screenshot width, keeps the source size when neither dimension is set
    #[arg(long, allow_negative_numbers = true)]
    pub width: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    pub height: Option<i32>,

    /// Scale behavior: none, fill, crop (or 0, 1, 2)
    #[arg(long, default_value = "none")]
    pub behavior: ScaleBehavior,

    /// Destination pattern
    #[arg(long, default_value = "screens/%04d.jpg")]
    pub dst: String,

    /// Path to the ffprobe binary, searched in PATH when unset
    #[arg(long, env = "FFPROBE_PATH")]
    pub ffprobe: Option<PathBuf>,
}

/// Parse an interval such as `7s`, `6500ms`, `1.5m` or `2h`.
/// A bare number is taken as milliseconds.
pub fn parse_interval(s: &str) -> Result<Duration, String> {
    fn scaled(s: &str, suffix: &str, millis: f64) -> Option<f64> {
        s.strip_suffix(suffix)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v * millis)
    }

    let s = s.trim();
    let millis = s
        .parse::<f64>()
        .ok()
        .or_else(|| scaled(s, "ms", 1.0))
        .or_else(|| scaled(s, "s", 1_000.0))
        .or_else(|| scaled(s, "m", 60_000.0))
        .or_else(|| scaled(s, "h", 3_600_000.0))
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .ok_or_else(|| format!("invalid interval: {s}"))?;

    Ok(Duration::from_micros((millis * 1_000.0).round() as u64))
}

/// Parse a `Name: value` header.
pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("invalid header format: {raw}"))
}
