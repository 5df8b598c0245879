//! Configuration file loading and flag merging.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use ffthumbs::{GeneratorConfig, OutputConfig, ScaleConfig, ScreensConfig, SpriteDimensions};
use serde::Deserialize;
use tracing::debug;

use crate::cli::{Args, ScreensArgs, ThumbsArgs, parse_header};

/// Contents of the `--config` TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub thumbs: GeneratorConfig,
    pub screens: ScreensConfig,
}

impl FileConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: FileConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }
}

fn merge_headers(target: &mut BTreeMap<String, String>, raw: &[String]) -> Result<()> {
    for header in raw {
        let (name, value) = parse_header(header).map_err(anyhow::Error::msg)?;
        target.insert(name, value);
    }
    Ok(())
}

/// Build the generator config: file values first, flags on top.
///
/// Outputs from the file take precedence; without them a single output is
/// built from the command line flags.
pub fn generator_config(
    file: GeneratorConfig,
    args: &Args,
    thumbs: &ThumbsArgs,
) -> Result<GeneratorConfig> {
    let mut config = file;

    if let Some(ffmpeg) = &args.ffmpeg {
        config.ffmpeg_path = Some(ffmpeg.clone());
    }
    if let Some(concurrency) = thumbs.concurrency {
        config.concurrency = concurrency;
    }
    merge_headers(&mut config.headers, &args.headers)?;
    config.disable_progress_logs |= thumbs.no_progress;
    config.overwrite |= thumbs.overwrite;

    if config.outputs.is_empty() {
        let scale = ScaleConfig::new(thumbs.width, thumbs.height, thumbs.behavior);
        let mut output = OutputConfig::thumbs(thumbs.interval, scale)
            .with_dst(thumbs.dst.clone())
            .with_quality(thumbs.quality);
        output.output_type = thumbs.output_type;
        output.sprites = SpriteDimensions::new(thumbs.cols, thumbs.rows);
        config.outputs.push(output);
    }

    Ok(config)
}

pub fn screens_config(file: ScreensConfig, args: &Args, screens: &ScreensArgs) -> Result<ScreensConfig> {
    let mut config = file;

    if let Some(ffmpeg) = &args.ffmpeg {
        config.ffmpeg_path = Some(ffmpeg.clone());
    }
    if let Some(ffprobe) = &screens.ffprobe {
        config.ffprobe_path = Some(ffprobe.clone());
    }
    merge_headers(&mut config.headers, &args.headers)?;

    Ok(config)
}
