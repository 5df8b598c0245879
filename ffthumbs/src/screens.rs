//! Single-frame screenshots at chosen time points.
//!
//! Unlike [`crate::Generator`] this runs one ffmpeg process per screenshot,
//! seeking to the time point and letting the `thumbnail` filter pick the most
//! representative frame of the following batch.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use process_utils::{RunSpec, run};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

use crate::config::ScaleConfig;
use crate::filter_graph::{headers_arg, scale_directive};
use crate::locator;
use crate::{Error, Result};

/// Destination pattern used when a request does not set one.
pub const DEFAULT_SCREENSHOT_FILENAME: &str = "image_%d.jpg";

/// Frames the `thumbnail` filter inspects per screenshot.
pub const THUMBNAIL_BATCH_SIZE: u32 = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreensConfig {
    /// Looked up in `PATH` when unset.
    pub ffmpeg_path: Option<PathBuf>,
    /// Looked up in `PATH` when unset.
    pub ffprobe_path: Option<PathBuf>,
    pub headers: BTreeMap<String, String>,
}

/// Where to take a screenshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeUnit {
    /// Absolute position in seconds.
    Point(f64),
    /// Percentage of the media duration.
    Percent(f64),
}

impl TimeUnit {
    /// Position in seconds for media lasting `duration` seconds.
    pub fn resolve(self, duration: f64) -> f64 {
        match self {
            TimeUnit::Point(secs) => secs,
            TimeUnit::Percent(pct) => duration / 100.0 * pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time point: {0}")]
pub struct InvalidTimeUnit(pub String);

impl FromStr for TimeUnit {
    type Err = InvalidTimeUnit;

    /// `"50%"` is a percentage, `"12.5"` a position in seconds.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (raw, percent) = match s.strip_suffix('%') {
            Some(raw) => (raw, true),
            None => (s, false),
        };

        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| InvalidTimeUnit(s.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(InvalidTimeUnit(s.to_string()));
        }

        Ok(if percent {
            TimeUnit::Percent(value)
        } else {
            TimeUnit::Point(value)
        })
    }
}

/// A batch of screenshots from one media file.
#[derive(Debug, Clone, Default)]
pub struct ScreenshotsRequest {
    pub media_url: String,
    pub scale: Option<ScaleConfig>,
    /// Number of evenly spaced screenshots, ignored when `time_units` is set.
    pub count: usize,
    pub time_units: Vec<TimeUnit>,
    /// printf-style pattern, e.g. `shots/%03d.jpg`.
    pub output_dst: String,
    pub cancellation: Option<CancellationToken>,
}

impl ScreenshotsRequest {
    pub fn new(media_url: impl Into<String>) -> Self {
        Self {
            media_url: media_url.into(),
            ..Self::default()
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_time_units(mut self, units: Vec<TimeUnit>) -> Self {
        self.time_units = units;
        self
    }

    pub fn with_scale(mut self, scale: ScaleConfig) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_dst(mut self, dst: impl Into<String>) -> Self {
        self.output_dst = dst.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// `(file number, seconds)` pairs for a request.
///
/// Explicit time units are numbered from 0, evenly spaced points from 1 and
/// placed at `i / (count + 1)` of the duration, never on the very first or
/// last frame.
pub fn time_points(request: &ScreenshotsRequest, duration: f64) -> Vec<(usize, f64)> {
    if !request.time_units.is_empty() {
        return request
            .time_units
            .iter()
            .enumerate()
            .map(|(i, unit)| (i, unit.resolve(duration)))
            .collect();
    }

    let count = request.count;
    (1..=count)
        .map(|i| (i, i as f64 / (count as f64 + 1.0) * duration))
        .collect()
}

/// Substitute `number` into the first integer directive of `pattern`.
///
/// Supports `%d`, `%Nd` and `%0Nd`; `%%` is a literal percent sign.
pub fn format_frame_pattern(pattern: &str, number: usize) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut substituted = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        if substituted {
            out.push(c);
            continue;
        }

        let mut spec = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                spec.push(d);
                chars.next();
            } else {
                break;
            }
        }

        if chars.peek() == Some(&'d') {
            chars.next();
            let zero_pad = spec.starts_with('0');
            let width: usize = spec.parse().unwrap_or(0);
            if zero_pad {
                let _ = write!(out, "{number:0width$}");
            } else {
                let _ = write!(out, "{number:width$}");
            }
            substituted = true;
        } else {
            out.push('%');
            out.push_str(&spec);
        }
    }

    out
}

/// Screenshot generator.
#[derive(Debug, Clone)]
pub struct ScreenGenerator {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    base_args: Vec<String>,
}

impl ScreenGenerator {
    pub fn new(config: ScreensConfig) -> Result<Self> {
        let ffmpeg_path = locator::verified_ffmpeg_path(config.ffmpeg_path.as_deref())?;
        let ffprobe_path = locator::ffprobe_path(config.ffprobe_path.as_deref())?;
        Ok(Self::with_paths(ffmpeg_path, ffprobe_path, &config.headers))
    }

    fn with_paths(
        ffmpeg_path: PathBuf,
        ffprobe_path: PathBuf,
        headers: &BTreeMap<String, String>,
    ) -> Self {
        let mut base_args = vec!["-loglevel".to_string(), "error".to_string()];
        if !headers.is_empty() {
            base_args.push("-headers".to_string());
            base_args.push(headers_arg(headers));
        }

        Self {
            ffmpeg_path,
            ffprobe_path,
            base_args,
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe_path
    }

    /// Media duration in seconds, as reported by ffprobe.
    pub async fn probe_duration(&self, request: &ScreenshotsRequest) -> Result<f64> {
        let spec = RunSpec::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                request.media_url.as_str(),
            ])
            .cancellation(request.cancellation.clone())
            .capture_stdout(true);

        let output = run(spec).await?;
        if !output.success() {
            return Err(Error::ProcessFailed {
                program: process_utils::program_name(&self.ffprobe_path),
                code: output.status.code(),
                stderr: output.stderr,
            });
        }

        let raw = output.stdout.trim();
        raw.parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| Error::Probe(format!("cannot parse duration: {raw:?}")))
    }

    /// The `-vf` chain applied to every screenshot.
    pub fn filters(request: &ScreenshotsRequest) -> String {
        let mut filters = format!("thumbnail={THUMBNAIL_BATCH_SIZE}");
        if let Some(scale) = &request.scale {
            filters.push(',');
            filters.push_str(&scale_directive(scale));
        }
        filters
    }

    /// ffmpeg arguments for one screenshot.
    pub fn shot_args(&self, request: &ScreenshotsRequest, time: f64, dst: &str) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            "-ss".to_string(),
            format!("{time:.6}"),
            "-i".to_string(),
            request.media_url.clone(),
            "-vf".to_string(),
            Self::filters(request),
            "-vframes".to_string(),
            "1".to_string(),
            dst.to_string(),
        ]);
        args
    }

    /// Take every requested screenshot in order and return the written paths.
    ///
    /// Stops at the first failing shot.
    pub async fn generate(&self, request: &ScreenshotsRequest) -> Result<Vec<String>> {
        let span = info_span!("screens", media = %request.media_url);

        async {
            let duration = self.probe_duration(request).await?;
            debug!(duration, "Probed media duration");

            let pattern = if request.output_dst.is_empty() {
                DEFAULT_SCREENSHOT_FILENAME
            } else {
                request.output_dst.as_str()
            };

            let mut written = Vec::new();
            for (number, time) in time_points(request, duration) {
                let dst = format_frame_pattern(pattern, number);
                debug!(time, dst = %dst, "Generating thumb");

                let spec = RunSpec::new(&self.ffmpeg_path)
                    .args(self.shot_args(request, time, &dst))
                    .cancellation(request.cancellation.clone());

                let output = run(spec).await?;
                if !output.success() {
                    return Err(Error::ProcessFailed {
                        program: process_utils::program_name(&self.ffmpeg_path),
                        code: output.status.code(),
                        stderr: output.stderr,
                    });
                }

                written.push(dst);
            }

            Ok(written)
        }
        .instrument(span)
        .await
    }
}
