//! One-shot process runner with cancellation support.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{program_name, tokio_command};

/// Errors raised while running a process.
///
/// A non-zero exit code is not an error at this level, callers inspect
/// [`ProcessOutput::status`] themselves.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String, stderr: String },
}

/// Description of a single process launch.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
    pub cancellation: Option<CancellationToken>,
    pub capture_stdout: bool,
    /// Receives stdout line by line while the process runs, instead of
    /// collecting it into [`ProcessOutput::stdout`].
    pub stdout_lines: Option<mpsc::UnboundedSender<String>>,
}

impl RunSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            cancellation: None,
            capture_stdout: false,
            stdout_lines: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn stdout_lines(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.stdout_lines = Some(sink);
        self
    }

    pub fn cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    pub fn capture_stdout(mut self, capture: bool) -> Self {
        self.capture_stdout = capture;
        self
    }
}

/// What a finished process left behind.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    /// Empty unless [`RunSpec::capture_stdout`] was set and no line sink was.
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Start the process described by `spec` and wait for it to exit.
///
/// If the cancellation token fires first the child is killed and
/// [`RunError::Cancelled`] is returned with whatever stderr was captured.
pub async fn run(spec: RunSpec) -> Result<ProcessOutput, RunError> {
    let program = program_name(&spec.program);

    let mut cmd = tokio_command(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if spec.capture_stdout || spec.stdout_lines.is_some() {
        cmd.stdout(Stdio::piped());
    } else {
        cmd.stdout(Stdio::null());
    }

    debug!(program = %program, args = ?spec.args, "Launching {}", program);

    let start = Instant::now();

    let mut child = cmd.spawn().map_err(|source| {
        error!(program = %program, error = %source, "{} start failed", program);
        RunError::Spawn {
            program: program.clone(),
            source,
        }
    })?;

    let stdout_task = match (child.stdout.take(), spec.stdout_lines) {
        (Some(stdout), Some(sink)) => Some(tokio::spawn(forward_lines(stdout, sink))),
        (Some(stdout), None) => Some(tokio::spawn(read_all(stdout))),
        _ => None,
    };
    let stderr_task = child.stderr.take().map(|s| tokio::spawn(read_all(s)));

    let cancellation_token = spec.cancellation.unwrap_or_default();

    let status = tokio::select! {
        _ = cancellation_token.cancelled() => {
            let _ = child.kill().await;
            None
        }
        status = child.wait() => Some(status),
    };

    let elapsed = start.elapsed();
    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;

    match status {
        None => {
            debug!(program = %program, "{} killed after cancellation", program);
            Err(RunError::Cancelled { program, stderr })
        }
        Some(Err(source)) => Err(RunError::Wait { program, source }),
        Some(Ok(status)) => {
            if status.success() {
                info!(program = %program, duration = ?elapsed, "{} command finished", program);
            } else {
                error!(
                    program = %program,
                    code = ?status.code(),
                    stderr = %stderr.trim_end(),
                    "{} run failed",
                    program
                );
            }

            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
                elapsed,
            })
        }
    }
}

/// Read to EOF. Decoding is lossy so odd bytes never cut the pipe short.
async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Send every line to `sink` until EOF, returns an empty string.
///
/// The pipe keeps being drained after the receiver goes away, the child
/// would otherwise die of SIGPIPE on its next write.
async fn forward_lines<R: AsyncRead + Unpin>(
    reader: R,
    sink: mpsc::UnboundedSender<String>,
) -> String {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                let _ = sink.send(line.to_string());
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "stdout read failed");
                break;
            }
        }
    }

    String::new()
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}
