//! Running the test command inside a container.

use std::process::Command;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sanitybox_common::config::SanityConfig;
use sanitybox_common::constants::{APP_NAME, CONTAINER_LOG_TARGET};
use sanitybox_common::error::RunError;
use sanitybox_common::types::ImageHandle;
use serde::Serialize;

use crate::engine::Engine;
use crate::process::{CancelToken, StreamEnd, StreamingChild, command_line};

/// Result of a container run that exited zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Output lines in the order the container produced them.
    pub lines: Vec<String>,
    /// Exit code reported by the engine.
    pub exit_code: i32,
    /// When the container was launched.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunOutcome {
    /// Creates an outcome that started now and took no time.
    #[must_use]
    pub fn new(lines: Vec<String>, exit_code: i32) -> Self {
        Self {
            lines,
            exit_code,
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    /// Whether the test command passed.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the test command in a container started from a built image.
pub trait ContainerRunner: Send + Sync {
    /// Starts the container and blocks until it exits, capturing its
    /// combined output line by line.
    ///
    /// # Errors
    ///
    /// Returns `RunError::TestExecution` when the container exits non-zero,
    /// and other `RunError` variants when it cannot be started or is killed.
    fn run(&self, image: &ImageHandle, engine: &Engine) -> Result<RunOutcome, RunError>;
}

/// [`ContainerRunner`] that shells out to `<engine> run --rm`.
#[derive(Debug, Clone)]
pub struct EngineContainerRunner {
    test_command: Vec<String>,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl EngineContainerRunner {
    /// Creates a runner executing `test_command` with no extra flags.
    #[must_use]
    pub const fn new(test_command: Vec<String>) -> Self {
        Self {
            test_command,
            extra_args: Vec::new(),
            timeout: None,
            cancel: None,
        }
    }

    /// Creates a runner from the command, flags and timeout in `config`.
    #[must_use]
    pub fn from_config(config: &SanityConfig) -> Self {
        let runner = Self::new(config.test_command.clone()).with_extra_args(config.extra_run_args.clone());
        match config.run_timeout_secs {
            Some(secs) => runner.with_timeout(Duration::from_secs(secs)),
            None => runner,
        }
    }

    /// Flags placed between `run` and the image reference.
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Kills the container if it runs longer than `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Kills the container when `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The `<engine> run` invocation for `image` under container `name`.
    #[must_use]
    pub fn command(&self, image: &ImageHandle, engine: &Engine, name: &str) -> Command {
        let mut cmd = engine.command();
        let _ = cmd
            .args(["run", "--rm", "--name", name])
            .args(&self.extra_args)
            .arg(image.reference())
            .args(&self.test_command);
        cmd
    }
}

impl ContainerRunner for EngineContainerRunner {
    fn run(&self, image: &ImageHandle, engine: &Engine) -> Result<RunOutcome, RunError> {
        let name = container_name();
        let cmd = self.command(image, engine, &name);
        let line = command_line(&cmd);

        tracing::info!(engine = %engine.kind(), image = %image.reference(), container = %name, "starting test container");
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut child = StreamingChild::spawn(cmd, self.timeout, self.cancel.clone())
            .map_err(|e| RunError::Spawn {
                command: line.clone(),
                source: e,
            })?;

        let mut lines = Vec::new();
        for l in child.lines() {
            tracing::info!(target: CONTAINER_LOG_TARGET, "{l}");
            lines.push(l);
        }
        let exit = child.wait().map_err(|e| RunError::Spawn {
            command: line.clone(),
            source: e,
        })?;
        lines.extend(exit.unread);

        match exit.end {
            StreamEnd::Exhausted => {}
            StreamEnd::TimedOut => {
                force_remove(engine, &name);
                return Err(RunError::TimedOut {
                    command: line,
                    timeout: self.timeout.unwrap_or_default(),
                    output: lines,
                });
            }
            StreamEnd::Cancelled => {
                force_remove(engine, &name);
                return Err(RunError::Cancelled {
                    command: line,
                    output: lines,
                });
            }
        }

        let duration = clock.elapsed();
        if exit.code != 0 {
            tracing::info!(exit_code = exit.code, lines = lines.len(), "test container failed");
            return Err(RunError::TestExecution {
                command: line,
                exit_code: exit.code,
                output: lines,
            });
        }

        tracing::info!(lines = lines.len(), duration_ms = duration.as_millis(), "test container passed");
        Ok(RunOutcome {
            lines,
            exit_code: exit.code,
            started_at,
            duration,
        })
    }
}

/// Unique name so a killed run can be removed by name.
fn container_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{APP_NAME}-run-{}", &id[..8])
}

/// Removes a container that survived its killed client process.
fn force_remove(engine: &Engine, name: &str) {
    let mut cmd = engine.command();
    let _ = cmd.args(["rm", "--force", name]);
    match cmd.output() {
        Ok(out) if out.status.success() => {
            tracing::debug!(container = %name, "container removed");
        }
        Ok(out) => {
            tracing::debug!(
                container = %name,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "container removal reported an error"
            );
        }
        Err(e) => tracing::warn!(container = %name, error = %e, "could not remove container"),
    }
}
