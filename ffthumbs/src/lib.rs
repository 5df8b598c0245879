//! ffthumbs: thumbnail and sprite sheet generation with ffmpeg.
//!
//! A list of [`OutputConfig`]s is validated and compiled once into a single
//! `-filter_complex` graph, so every media file is decoded exactly once no
//! matter how many outputs are requested. Outputs sampled at the same
//! interval and scaled the same way share their `select` and `scale` stages.
//!
//! ## Core Types
//!
//! - [`Generator`] - runs the compiled graph per media file, inline or on a
//!   bounded worker pool
//! - [`GenerateRequest`] / [`GenerateResult`] - one media file and its outcome
//! - [`ScreenGenerator`] - one-off screenshots at chosen time points
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use ffthumbs::{Generator, GeneratorConfig, GenerateRequest, OutputConfig, ScaleConfig};
//!
//! let generator = Generator::new(GeneratorConfig {
//!     outputs: vec![
//!         OutputConfig::thumbs(Duration::from_secs(10), ScaleConfig::default())
//!             .with_dst("thumbs/%04d.jpg"),
//!     ],
//!     ..Default::default()
//! })?;
//!
//! generator.generate(&GenerateRequest::new("input.mp4")).await?;
//! ```

pub mod config;
pub mod error;
pub mod filter_graph;
pub mod generator;
pub mod locator;
pub mod progress;
pub mod screens;
pub mod session;
pub mod validator;
pub mod worker_pool;

pub use config::{
    DEFAULT_CONCURRENCY, DEFAULT_FILENAME, GeneratorConfig, OutputConfig, OutputType,
    ScaleBehavior, ScaleConfig, SpriteDimensions,
};
pub use error::{Error, Result};
pub use filter_graph::{FilterGraph, compile};
pub use generator::{GenerateRequest, GenerateResult, Generator};
pub use locator::{MIN_FFMPEG_VERSION, Version};
pub use progress::{ProgressEvent, ProgressUpdate};
pub use screens::{ScreenGenerator, ScreensConfig, ScreenshotsRequest, TimeUnit};
pub use validator::{ValidationError, ValidationErrorKind};
pub use worker_pool::WorkerPool;
