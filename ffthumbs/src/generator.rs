//! Thumbnail and sprite generation.
//!
//! A [`Generator`] compiles its output list once and then runs one ffmpeg
//! process per [`GenerateRequest`], either inline ([`Generator::generate`])
//! or on its worker pool ([`Generator::generate_async`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::config::{DEFAULT_FILENAME, GeneratorConfig, OutputConfig, effective_concurrency};
use crate::filter_graph::{self, FilterGraph};
use crate::locator;
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::session::ProcessSession;
use crate::worker_pool::WorkerPool;
use crate::Result;

/// One media file to process.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    id: u64,
    /// Local path or network URL of the source media.
    pub media_url: String,
    /// Destination overrides, keyed by output index.
    pub output_dst: HashMap<usize, String>,
    /// Kills the ffmpeg process when cancelled.
    pub cancellation: Option<CancellationToken>,
    /// Receives exactly one [`GenerateResult`] for async requests.
    pub done_tx: Option<mpsc::Sender<GenerateResult>>,
    /// Receives parsed progress updates.
    pub progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl GenerateRequest {
    pub fn new(media_url: impl Into<String>) -> Self {
        Self {
            id: 0,
            media_url: media_url.into(),
            output_dst: HashMap::new(),
            cancellation: None,
            done_tx: None,
            progress_tx: None,
        }
    }

    /// Identifier assigned by [`Generator::generate_async`], 0 until then.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn with_output_dst(mut self, index: usize, dst: impl Into<String>) -> Self {
        self.output_dst.insert(index, dst.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_done_channel(mut self, tx: mpsc::Sender<GenerateResult>) -> Self {
        self.done_tx = Some(tx);
        self
    }

    pub fn with_progress_channel(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }
}

/// Outcome of an async request.
#[derive(Debug)]
pub struct GenerateResult {
    pub request: GenerateRequest,
    pub result: Result<()>,
    /// Time from worker start to completion.
    pub duration: Duration,
}

struct Inner {
    ffmpeg_path: PathBuf,
    base_args: Vec<String>,
    outputs: Vec<OutputConfig>,
    graph: FilterGraph,
    disable_progress_logs: bool,
    pool: WorkerPool,
    last_request_id: AtomicU64,
    outstanding: watch::Sender<usize>,
}

/// Handle to a configured generator. Clones share the same pool.
#[derive(Clone)]
pub struct Generator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("ffmpeg_path", &self.inner.ffmpeg_path)
            .field("filter_graph", &self.inner.graph.expression())
            .field("concurrency", &self.inner.pool.capacity())
            .finish()
    }
}

/// Decrements the outstanding request counter on drop.
struct Outstanding {
    counter: watch::Sender<usize>,
}

impl Outstanding {
    fn register(counter: &watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        self.counter.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Generator {
    /// Locate ffmpeg, validate and compile the outputs and set up the pool.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let ffmpeg_path = locator::verified_ffmpeg_path(config.ffmpeg_path.as_deref())?;
        Self::with_ffmpeg_path(ffmpeg_path, config)
    }

    fn with_ffmpeg_path(ffmpeg_path: PathBuf, config: GeneratorConfig) -> Result<Self> {
        let mut outputs = config.outputs;
        for (index, output) in outputs.iter_mut().enumerate() {
            output.index = index;
            if output.dst_path.is_empty() {
                output.dst_path = DEFAULT_FILENAME.to_string();
            }
        }

        let graph = filter_graph::compile(&outputs)?;
        debug!(filter_complex = %graph.expression(), "Compiled filter graph");

        let mut base_args = vec!["-loglevel".to_string(), "error".to_string()];
        if config.overwrite {
            base_args.push("-y".to_string());
        }
        if !config.headers.is_empty() {
            base_args.push("-headers".to_string());
            base_args.push(filter_graph::headers_arg(&config.headers));
        }

        let (outstanding, _) = watch::channel(0);

        Ok(Self {
            inner: Arc::new(Inner {
                ffmpeg_path,
                base_args,
                outputs,
                graph,
                disable_progress_logs: config.disable_progress_logs,
                pool: WorkerPool::new(effective_concurrency(config.concurrency)),
                last_request_id: AtomicU64::new(0),
                outstanding,
            }),
        })
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.inner.ffmpeg_path
    }

    pub fn filter_graph(&self) -> &FilterGraph {
        &self.inner.graph
    }

    /// Outputs with their assigned indices and default destinations.
    pub fn outputs(&self) -> &[OutputConfig] {
        &self.inner.outputs
    }

    pub fn concurrency(&self) -> usize {
        self.inner.pool.capacity()
    }

    /// Resize the worker pool, 0 means the default concurrency.
    pub fn set_concurrency(&self, concurrency: usize) {
        self.inner.pool.tune(effective_concurrency(concurrency));
    }

    /// Stop accepting async requests.
    pub fn close(&self) {
        self.inner.pool.close();
    }

    /// Full ffmpeg argument list for `request`.
    pub fn command_args(&self, request: &GenerateRequest) -> Vec<String> {
        let inner = &self.inner;
        let mut args = inner.base_args.clone();

        args.extend([
            "-i".to_string(),
            request.media_url.clone(),
            "-filter_complex".to_string(),
            inner.graph.expression().to_string(),
            "-vsync".to_string(),
            "0".to_string(),
        ]);

        for (node, output) in inner.graph.nodes().iter().zip(&inner.outputs) {
            args.push("-map".to_string());
            args.push(format!("[{}]", node.output));

            if output.quality > 0 {
                args.push("-q:v".to_string());
                args.push(output.quality.to_string());
            }

            let dst = request
                .output_dst
                .get(&output.index)
                .unwrap_or(&output.dst_path);
            args.push(dst.clone());
        }

        if !inner.disable_progress_logs {
            args.push("-progress".to_string());
            args.push("pipe:1".to_string());
        }

        args
    }

    /// Process `request` on the calling task.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<()> {
        let _outstanding = Outstanding::register(&self.inner.outstanding);

        let mut session = ProcessSession::new(&self.inner.ffmpeg_path, self.command_args(request))
            .cancellation(request.cancellation.clone());
        if !self.inner.disable_progress_logs {
            session = session.progress(ProgressReporter::new(
                request.id,
                request.progress_tx.clone(),
            ));
        }

        let span = info_span!("generate", request_id = request.id, media = %request.media_url);
        session.run().instrument(span).await.map(|_| ())
    }

    /// Queue `request` on the worker pool and return its id.
    ///
    /// Waits only for admission. The result is sent to the request's done
    /// channel, which should be drained concurrently with [`Generator::wait`].
    pub async fn generate_async(&self, mut request: GenerateRequest) -> Result<u64> {
        let id = self.inner.last_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        request.id = id;

        let outstanding = Outstanding::register(&self.inner.outstanding);
        let generator = self.clone();

        self.inner
            .pool
            .submit(async move {
                let start = Instant::now();
                let result = generator.generate(&request).await;
                let duration = start.elapsed();

                if let Some(done_tx) = request.done_tx.clone() {
                    let result = GenerateResult {
                        request,
                        result,
                        duration,
                    };
                    if done_tx.send(result).await.is_err() {
                        warn!(request_id = id, "Result receiver dropped");
                    }
                }

                drop(outstanding);
            })
            .await?;

        Ok(id)
    }

    /// Resolve once every submitted request has finished.
    pub async fn wait(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Requests accepted but not yet finished.
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }
}
