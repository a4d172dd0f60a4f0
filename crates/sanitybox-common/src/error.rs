//! Unified error types for the sanitybox workspace.
//!
//! Image construction and test execution fail with separate types so a
//! caller can tell "the image was never built" apart from "the image was
//! built but the tests failed". [`SanityError`] wraps both at the
//! orchestrator boundary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure while materializing the test image.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The archive could not be opened or inspected.
    #[error("archive unreadable at {path}: {source}")]
    ArchiveUnreadable {
        /// Path of the archive.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The archive exists but is not a usable gzip tarball.
    #[error("invalid archive {path}: {message}")]
    InvalidArchive {
        /// Path of the archive.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// Package metadata cannot be embedded in a build definition.
    #[error("invalid package metadata: {message}")]
    InvalidMetadata {
        /// Description of the offending field.
        message: String,
    },

    /// The temporary build context could not be prepared.
    #[error("failed to prepare build context at {path}: {source}")]
    Workspace {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The engine process could not be started or awaited.
    #[error("failed to invoke {command}: {source}")]
    Spawn {
        /// Command line that was attempted.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The engine build process exited non-zero.
    #[error("image build failed in {command}, exit code {exit_code}, message={message}")]
    Failed {
        /// Command line of the build.
        command: String,
        /// Exit code of the build process.
        exit_code: i32,
        /// Last line the build printed.
        message: String,
        /// Every line the build printed, in order.
        output: Vec<String>,
    },

    /// The build succeeded but did not report an image identifier.
    #[error("image build in {command} reported no image id")]
    MissingImageId {
        /// Command line of the build.
        command: String,
    },

    /// The build was cancelled by the caller and killed.
    #[error("image build in {command} was cancelled")]
    Cancelled {
        /// Command line of the build.
        command: String,
    },
}

impl BuildError {
    /// Returns the build output captured before the failure, if any.
    #[must_use]
    pub fn output(&self) -> &[String] {
        match self {
            Self::Failed { output, .. } => output,
            _ => &[],
        }
    }
}

/// Failure while running the test command inside the container.
#[derive(Debug, Error)]
pub enum RunError {
    /// The engine process could not be started or awaited.
    #[error("failed to invoke {command}: {source}")]
    Spawn {
        /// Command line that was attempted.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The container ran and the test command exited non-zero.
    #[error("an exception occurred in {command}, returncode={exit_code}")]
    TestExecution {
        /// Command line of the run.
        command: String,
        /// Exit code reported by the engine.
        exit_code: i32,
        /// Lines captured before the process exited.
        output: Vec<String>,
    },

    /// The run exceeded its deadline and was killed.
    #[error("{command} timed out after {}s", .timeout.as_secs())]
    TimedOut {
        /// Command line of the run.
        command: String,
        /// Configured deadline.
        timeout: Duration,
        /// Lines captured before the deadline.
        output: Vec<String>,
    },

    /// The run was cancelled by the caller and killed.
    #[error("{command} was cancelled")]
    Cancelled {
        /// Command line of the run.
        command: String,
        /// Lines captured before cancellation.
        output: Vec<String>,
    },
}

impl RunError {
    /// Returns the container output captured before the failure.
    #[must_use]
    pub fn output(&self) -> &[String] {
        match self {
            Self::TestExecution { output, .. }
            | Self::TimedOut { output, .. }
            | Self::Cancelled { output, .. } => output,
            Self::Spawn { .. } => &[],
        }
    }

    /// Returns the exit code when the container actually exited.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::TestExecution { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Best-effort cleanup failure. Logged by the orchestrator, never escalated.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// The engine refused to remove the image for a reason other than
    /// the image already being gone.
    #[error("failed to remove image {image} via {command} (exit code {exit_code:?}): {message}")]
    Image {
        /// Image reference passed to the engine.
        image: String,
        /// Command line of the removal.
        command: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Engine diagnostics.
        message: String,
    },

    /// A temporary path could not be removed.
    #[error("failed to remove {path}: {source}")]
    Workspace {
        /// Path that could not be removed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Top-level error type returned by the orchestrator.
#[derive(Debug, Error)]
pub enum SanityError {
    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation outside the build and run steps failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The test image could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The test image was built but running it failed.
    #[error(transparent)]
    Run(#[from] RunError),

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl SanityError {
    /// Whether the failure came from the test command itself rather than
    /// from building or launching it.
    #[must_use]
    pub const fn is_test_failure(&self) -> bool {
        matches!(self, Self::Run(RunError::TestExecution { .. }))
    }

    /// Returns whatever output was captured before the failure.
    #[must_use]
    pub fn output(&self) -> &[String] {
        match self {
            Self::Build(e) => e.output(),
            Self::Run(e) => e.output(),
            _ => &[],
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SanityError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_run() -> RunError {
        RunError::TestExecution {
            command: "podman run --rm abc".into(),
            exit_code: 1,
            output: vec!["test1 ran".into(), "test2 ran".into()],
        }
    }

    #[test]
    fn test_execution_error_exposes_output_and_code() {
        let err = failed_run();
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.output(), ["test1 ran", "test2 ran"]);
        assert!(err.to_string().contains("returncode=1"));
    }

    #[test]
    fn sanity_error_distinguishes_build_from_run() {
        let run: SanityError = failed_run().into();
        assert!(run.is_test_failure());
        assert_eq!(run.output().len(), 2);

        let build: SanityError = BuildError::MissingImageId {
            command: "podman build".into(),
        }
        .into();
        assert!(!build.is_test_failure());
        assert!(build.output().is_empty());
    }

    #[test]
    fn timed_out_is_not_a_test_failure() {
        let err: SanityError = RunError::TimedOut {
            command: "docker run".into(),
            timeout: Duration::from_secs(5),
            output: vec!["partial".into()],
        }
        .into();
        assert!(!err.is_test_failure());
        assert_eq!(err.output(), ["partial"]);
        assert!(err.to_string().contains("timed out after 5s"));
    }

    #[test]
    fn build_failure_message_carries_last_line() {
        let err = BuildError::Failed {
            command: "docker build .".into(),
            exit_code: 125,
            message: "manifest unknown".into(),
            output: vec!["step 1".into(), "manifest unknown".into()],
        };
        assert!(err.to_string().ends_with("message=manifest unknown"));
        assert_eq!(err.output().len(), 2);
    }
}
