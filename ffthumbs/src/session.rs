//! A single ffmpeg invocation with live progress parsing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use process_utils::{RunSpec, run};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::progress::{ProgressParser, ProgressReporter};
use crate::{Error, Result};

/// Result of a successful session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Wall-clock time from just before spawn to just after exit.
    pub elapsed: Duration,
    /// Whatever the process wrote to stderr.
    pub stderr: String,
}

/// One external process run.
///
/// stderr is always captured; stdout is only opened when a progress
/// reporter is attached, and then parsed line by line while the process runs.
#[derive(Debug)]
pub struct ProcessSession {
    program: PathBuf,
    args: Vec<String>,
    cancellation: Option<CancellationToken>,
    reporter: Option<ProgressReporter>,
}

impl ProcessSession {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cancellation: None,
            reporter: None,
        }
    }

    pub fn cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    pub fn progress(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the process to completion.
    pub async fn run(self) -> Result<SessionOutcome> {
        let program = process_utils::program_name(&self.program);

        let mut spec = RunSpec::new(self.program)
            .args(self.args)
            .env("LC_ALL", "C")
            .cancellation(self.cancellation);

        let mut progress_task = None;
        if let Some(reporter) = self.reporter {
            let (tx, rx) = mpsc::unbounded_channel();
            spec = spec.stdout_lines(tx);
            progress_task = Some(tokio::spawn(listen_for_progress(rx, reporter)));
        }

        let result = run(spec).await;

        // The runner has dropped its line sink by now, the listener ends on its own.
        if let Some(task) = progress_task {
            let _ = task.await;
        }

        let output = result.map_err(|e| {
            let err = Error::from(e);
            if err.is_cancelled() {
                warn!("{} cancelled", program);
            }
            err
        })?;

        if !output.success() {
            return Err(Error::ProcessFailed {
                program,
                code: output.status.code(),
                stderr: output.stderr,
            });
        }

        Ok(SessionOutcome {
            elapsed: output.elapsed,
            stderr: output.stderr,
        })
    }
}

async fn listen_for_progress(
    mut lines: mpsc::UnboundedReceiver<String>,
    reporter: ProgressReporter,
) {
    let mut parser = ProgressParser::new();
    while let Some(line) = lines.recv().await {
        if let Some(event) = parser.feed(&line) {
            reporter.report(event);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::progress::ProgressUpdate;

    fn sh(script: &str) -> ProcessSession {
        ProcessSession::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_session_success() {
        let outcome = sh("echo warming up >&2").run().await.unwrap();
        assert_eq!(outcome.stderr, "warming up\n");
    }

    #[tokio::test]
    async fn test_session_failure_carries_stderr() {
        let err = sh("echo 'Invalid data found' >&2; exit 1")
            .run()
            .await
            .unwrap_err();

        match err {
            Error::ProcessFailed { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr.trim(), "Invalid data found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_session_invalid_utf8_stderr() {
        let script = "printf 'bad \\377 name\\n' >&2; sleep 0.3; \
            for i in $(seq 1 50); do echo more-diagnostics >&2; done; exit 0";
        let outcome = sh(script).run().await.unwrap();

        assert!(outcome.stderr.starts_with("bad \u{FFFD} name\n"));
        assert_eq!(outcome.stderr.matches("more-diagnostics").count(), 50);
    }

    #[tokio::test]
    async fn test_session_failure_keeps_stderr_after_invalid_utf8() {
        let err = sh("printf 'input \\377.mp4\\n' >&2; sleep 0.2; echo 'No such file' >&2; exit 1")
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.stderr(), Some("input \u{FFFD}.mp4\nNo such file\n"));
        assert!(matches!(err, Error::ProcessFailed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_session_progress_after_invalid_utf8() {
        let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(16);
        sh("printf 'junk \\377\\n'; sleep 0.2; printf 'out_time=00:00:03.000000\\nprogress=end\\n'")
            .progress(ProgressReporter::new(1, Some(tx)))
            .run()
            .await
            .unwrap();

        let update = rx.recv().await.unwrap();
        assert!(update.event.is_end());
        assert_eq!(update.event.out_time_secs(), Some(3.0));
    }

    #[tokio::test]
    async fn test_session_spawn_failure() {
        let err = ProcessSession::new("/nonexistent/ffmpeg", Vec::new())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_session_progress() {
        let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(16);
        sh("printf 'out_time=00:00:01.000000\\nspeed=3x\\nprogress=continue\\nprogress=end\\n'")
            .progress(ProgressReporter::new(3, Some(tx)))
            .run()
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.request_id, 3);
        assert_eq!(first.event.progress, "continue");
        assert_eq!(first.event.out_time_secs(), Some(1.0));

        let last = rx.recv().await.unwrap();
        assert!(last.event.is_end());
        assert_eq!(last.event.speed_ratio(), Some(3.0));
    }

    #[tokio::test]
    async fn test_session_cancelled() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let err = sh("exec sleep 10")
            .cancellation(Some(token))
            .run()
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
