//! ffmpeg `-progress` output parsing and reporting.
//!
//! With `-progress pipe:1` ffmpeg prints blocks of `key=value` lines, each
//! block terminated by `progress=continue` (or `progress=end` for the last
//! one). Every line is matched independently; an event is produced whenever a
//! `progress` token shows up, carrying the latest `out_time` and `speed` seen
//! so far.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

static PROGRESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"progress=([\w.]+)").expect("valid progress pattern"));
static OUT_TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"out_time=([^ ]+)").expect("valid out_time pattern"));
static SPEED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"speed=([^ ]+)").expect("valid speed pattern"));

/// A progress update reported by ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// `continue` while running, `end` on the final block.
    pub progress: String,
    /// Current media position, e.g. `00:01:30.500000`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_time: Option<String>,
    /// Processing speed relative to realtime, e.g. `2.5x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
}

impl ProgressEvent {
    pub fn is_end(&self) -> bool {
        self.progress == "end"
    }

    /// Media position in seconds.
    pub fn out_time_secs(&self) -> Option<f64> {
        self.out_time.as_deref().and_then(parse_time)
    }

    /// Speed multiplier, `None` while ffmpeg reports `N/A`.
    pub fn speed_ratio(&self) -> Option<f64> {
        self.speed.as_deref().and_then(parse_speed)
    }
}

/// Stateful line parser for ffmpeg progress output.
#[derive(Debug, Default)]
pub struct ProgressParser {
    out_time: Option<String>,
    speed: Option<String>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line, returns an event if the line carried a
    /// `progress` token. Unrecognised lines are ignored.
    pub fn feed(&mut self, line: &str) -> Option<ProgressEvent> {
        let progress = capture(&PROGRESS_PATTERN, line);

        if let Some(out_time) = capture(&OUT_TIME_PATTERN, line) {
            self.out_time = Some(out_time);
        }

        if let Some(speed) = capture(&SPEED_PATTERN, line) {
            self.speed = Some(speed);
        }

        progress.map(|progress| ProgressEvent {
            progress,
            out_time: self.out_time.clone(),
            speed: self.speed.clone(),
        })
    }
}

fn capture(pattern: &Regex, line: &str) -> Option<String> {
    pattern
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse time string in HH:MM:SS.frac format to seconds.
///
/// ```ignore
/// assert_eq!(parse_time("00:00:10.500000"), Some(10.5));
/// assert_eq!(parse_time("N/A"), None);
/// ```
pub fn parse_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse a speed multiplier such as `1.25x`.
pub fn parse_speed(speed_str: &str) -> Option<f64> {
    let speed_str = speed_str.trim();
    let end = speed_str.find('x')?;
    speed_str[..end].trim().parse().ok()
}

/// A progress event tagged with the request it belongs to.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub request_id: u64,
    pub event: ProgressEvent,
}

/// Logs progress events and forwards them to an optional listener.
///
/// Forwarding uses `try_send`, a slow listener misses updates instead of
/// stalling the ffmpeg output pipe.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    request_id: u64,
    tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl ProgressReporter {
    pub fn new(request_id: u64, tx: Option<mpsc::Sender<ProgressUpdate>>) -> Self {
        Self { request_id, tx }
    }

    pub fn report(&self, event: ProgressEvent) {
        info!(
            request_id = self.request_id,
            progress = %event.progress,
            time = event.out_time.as_deref().unwrap_or(""),
            speed = event.speed.as_deref().unwrap_or(""),
            "Progress update"
        );

        if let Some(tx) = &self.tx {
            let _ = tx.try_send(ProgressUpdate {
                request_id: self.request_id,
                event,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = "frame=120
fps=48.00
stream_0_0_q=-0.0
bitrate=N/A
total_size=N/A
out_time_us=5005000
out_time_ms=5005000
out_time=00:00:05.005000
dup_frames=0
drop_frames=0
speed=2.01x
progress=continue";

    #[test]
    fn test_parser_emits_on_progress_line() {
        let mut parser = ProgressParser::new();
        let events: Vec<ProgressEvent> = BLOCK.lines().filter_map(|l| parser.feed(l)).collect();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.progress, "continue");
        assert_eq!(event.out_time.as_deref(), Some("00:00:05.005000"));
        assert_eq!(event.speed.as_deref(), Some("2.01x"));
        assert!(!event.is_end());
        assert_eq!(event.out_time_secs(), Some(5.005));
        assert_eq!(event.speed_ratio(), Some(2.01));
    }

    #[test]
    fn test_parser_keeps_stale_values() {
        let mut parser = ProgressParser::new();
        for line in BLOCK.lines() {
            parser.feed(line);
        }

        // A bare progress line reuses the previous time and speed.
        let event = parser.feed("progress=end").unwrap();
        assert!(event.is_end());
        assert_eq!(event.out_time.as_deref(), Some("00:00:05.005000"));
        assert_eq!(event.speed.as_deref(), Some("2.01x"));
    }

    #[test]
    fn test_parser_single_line_with_all_tokens() {
        let mut parser = ProgressParser::new();
        let event = parser
            .feed("out_time=00:01:00.000000 speed=1.5x progress=continue")
            .unwrap();
        assert_eq!(event.out_time_secs(), Some(60.0));
        assert_eq!(event.speed_ratio(), Some(1.5));
    }

    #[test]
    fn test_parser_ignores_garbage() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed("").is_none());
        assert!(parser.feed("random noise").is_none());
        assert!(parser.feed("out_time_ms=100").is_none());

        let event = parser.feed("progress=continue").unwrap();
        assert_eq!(event.out_time, None);
        assert_eq!(event.speed, None);
    }

    #[test]
    fn test_speed_not_available() {
        let mut parser = ProgressParser::new();
        parser.feed("speed=N/A");
        let event = parser.feed("progress=continue").unwrap();
        assert_eq!(event.speed.as_deref(), Some("N/A"));
        assert_eq!(event.speed_ratio(), None);
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("00:00:10.50"), Some(10.5));
        assert_eq!(parse_time("01:30:00.000000"), Some(5400.0));
        assert_eq!(parse_time("N/A"), None);
        assert_eq!(parse_time("00:00"), None);
    }

    #[tokio::test]
    async fn test_reporter_forwards_updates() {
        let (tx, mut rx) = mpsc::channel(4);
        let reporter = ProgressReporter::new(7, Some(tx));

        reporter.report(ProgressEvent {
            progress: "end".into(),
            out_time: None,
            speed: None,
        });

        let update = rx.recv().await.unwrap();
        assert_eq!(update.request_id, 7);
        assert!(update.event.is_end());
    }

    #[test]
    fn test_reporter_does_not_block_when_full() {
        let (tx, _rx) = mpsc::channel(1);
        let reporter = ProgressReporter::new(1, Some(tx));
        for _ in 0..3 {
            reporter.report(ProgressEvent {
                progress: "continue".into(),
                out_time: None,
                speed: None,
            });
        }
    }
}
