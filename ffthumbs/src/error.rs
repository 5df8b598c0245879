//! Library-wide error types.

use thiserror::Error;

use crate::validator::ValidationError;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Library-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cannot locate {name}: {reason}")]
    Locate { name: String, reason: String },

    #[error("Version error: {0}")]
    Version(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {}", exit_label(.code), .stderr.trim_end())]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String, stderr: String },

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn locate(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Locate {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn version(msg: impl Into<String>) -> Self {
        Self::Version(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Standard error text captured from the failed process, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ProcessFailed { stderr, .. } | Self::Cancelled { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

impl From<process_utils::RunError> for Error {
    fn from(err: process_utils::RunError) -> Self {
        match err {
            process_utils::RunError::Spawn { program, source } => Self::Spawn { program, source },
            process_utils::RunError::Wait { source, .. } => Self::Io(source),
            process_utils::RunError::Cancelled { program, stderr } => {
                Self::Cancelled { program, stderr }
            }
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_failed_display() {
        let err = Error::ProcessFailed {
            program: "ffmpeg".into(),
            code: Some(1),
            stderr: "No such file or directory\n".into(),
        };
        assert_eq!(
            err.to_string(),
            "ffmpeg exited with exit code 1: No such file or directory"
        );
        assert_eq!(err.stderr(), Some("No such file or directory\n"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_from_run_error() {
        let err: Error = process_utils::RunError::Cancelled {
            program: "ffprobe".into(),
            stderr: String::new(),
        }
        .into();
        assert!(err.is_cancelled());
    }
}
