use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use ffthumbs::{
    GenerateRequest, Generator, GeneratorConfig, ScaleConfig, ScreenGenerator, ScreensConfig,
    ScreenshotsRequest,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cli::{Args, ScreensArgs, ThumbsArgs};
use crate::config;

/// Create the parent directory of a destination pattern.
fn ensure_parent_dir(dst: &str) -> Result<()> {
    if let Some(parent) = Path::new(dst).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create destination directory {}", parent.display()))?;
    }
    Ok(())
}

/// Short, filesystem friendly name for an input path or URL.
fn input_label(input: &str, position: usize) -> String {
    let last = input
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let stem = Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if stem.is_empty() {
        format!("input_{position}")
    } else {
        format!("{stem}_{position}")
    }
}

/// Move `dst` into a per-input subdirectory: `thumbs/%04d.jpg` becomes
/// `thumbs/<label>/%04d.jpg`.
fn per_input_dst(dst: &str, label: &str) -> String {
    let path = Path::new(dst);
    let file_name = path.file_name().map(PathBuf::from).unwrap_or_default();
    let parent = path.parent().unwrap_or(Path::new(""));
    parent.join(label).join(file_name).to_string_lossy().into_owned()
}

pub async fn thumbs(
    args: &Args,
    thumbs: &ThumbsArgs,
    file: GeneratorConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let config = config::generator_config(file, args, thumbs)?;
    let generator = Generator::new(config).context("Cannot set up generator")?;
    let start = Instant::now();

    if let [input] = thumbs.inputs.as_slice() {
        for output in generator.outputs() {
            ensure_parent_dir(&output.dst_path)?;
        }

        let request = GenerateRequest::new(input.clone()).with_cancellation(cancel);
        generator.generate(&request).await?;
        info!(duration = ?start.elapsed(), "Done");
        return Ok(());
    }

    let (done_tx, mut done_rx) = mpsc::channel(thumbs.inputs.len());
    for (position, input) in thumbs.inputs.iter().enumerate() {
        let label = input_label(input, position + 1);
        let mut request = GenerateRequest::new(input.clone())
            .with_cancellation(cancel.clone())
            .with_done_channel(done_tx.clone());

        for output in generator.outputs() {
            let dst = per_input_dst(&output.dst_path, &label);
            ensure_parent_dir(&dst)?;
            request = request.with_output_dst(output.index(), dst);
        }

        let id = generator.generate_async(request).await?;
        info!(request_id = id, input = %input, "Request queued");
    }
    drop(done_tx);

    let mut failed = 0usize;
    while let Some(done) = done_rx.recv().await {
        match &done.result {
            Ok(()) => info!(
                request_id = done.request.id(),
                duration = ?done.duration,
                "Request {} processed", done.request.id()
            ),
            Err(e) => {
                failed += 1;
                error!(
                    request_id = done.request.id(),
                    duration = ?done.duration,
                    error = %e,
                    "Request {} failed", done.request.id()
                );
            }
        }
    }

    generator.wait().await;
    generator.close();
    info!(duration = ?start.elapsed(), "Done");

    if failed > 0 {
        bail!("{failed} of {} requests failed", thumbs.inputs.len());
    }
    Ok(())
}

pub async fn screens(
    args: &Args,
    screens: &ScreensArgs,
    file: ScreensConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let config = config::screens_config(file, args, screens)?;
    let generator = ScreenGenerator::new(config).context("Cannot set up screenshot generator")?;

    ensure_parent_dir(&screens.dst)?;

    let mut request = ScreenshotsRequest::new(screens.input.clone())
        .with_count(screens.count)
        .with_time_units(screens.at.clone())
        .with_dst(screens.dst.clone())
        .with_cancellation(cancel);

    if screens.width.is_some() || screens.height.is_some() {
        request = request.with_scale(ScaleConfig::new(
            screens.width.unwrap_or(-1),
            screens.height.unwrap_or(-1),
            screens.behavior,
        ));
    }

    let start = Instant::now();
    let written = generator.generate(&request).await?;
    for path in &written {
        println!("{path}");
    }
    info!(count = written.len(), duration = ?start.elapsed(), "Done");
    Ok(())
}
