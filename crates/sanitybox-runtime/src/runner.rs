//! The sanity test orchestrator.
//!
//! [`TestRunner::run`] walks one archive through engine detection, image
//! build, container run and cleanup. A missing or unsupported engine ends
//! the run early with a single warning and [`SanityReport::Skipped`]. Once
//! an image exists it is owned by an [`ImageGuard`], whose `Drop` removes
//! it exactly once no matter how the run ends.

use std::path::PathBuf;

use sanitybox_common::config::SanityConfig;
use sanitybox_common::constants::SUITE_NAME;
use sanitybox_common::error::Result;
use sanitybox_common::types::{EngineKind, ImageHandle, PackageMetadata};
use sanitybox_image::context::BuildContext;
use serde::Serialize;

use crate::build::{EngineImageBuilder, ImageBuilder};
use crate::container::{ContainerRunner, EngineContainerRunner, RunOutcome};
use crate::engine::{Engine, EngineChoice, EngineLocator, PathEngineLocator};
use crate::process::CancelToken;

/// Why a run was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No candidate engine resolved on `PATH`.
    NotFound,
    /// An engine resolved but is outside the supported set.
    Unsupported,
}

/// Details of a skipped run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipNotice {
    /// Engine name(s) reported in the warning.
    pub engine: String,
    /// Why the engine could not be used.
    pub reason: SkipReason,
}

/// What a completed run observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SanityReport {
    /// The test command exited zero.
    Passed(RunOutcome),
    /// No usable engine; nothing was built or run.
    Skipped(SkipNotice),
}

/// Orchestrates one sanity test of one archive.
pub struct TestRunner {
    archive: PathBuf,
    metadata: PackageMetadata,
    config: SanityConfig,
    locator: Box<dyn EngineLocator>,
    builder: Option<Box<dyn ImageBuilder>>,
    runner: Option<Box<dyn ContainerRunner>>,
    cancel: Option<CancelToken>,
}

impl TestRunner {
    /// Creates a runner for `archive` backed by the host `PATH` and real
    /// engine processes.
    #[must_use]
    pub fn new(archive: impl Into<PathBuf>, metadata: PackageMetadata, config: &SanityConfig) -> Self {
        Self {
            archive: archive.into(),
            metadata,
            config: config.clone(),
            locator: Box::new(PathEngineLocator::from_config(config)),
            builder: None,
            runner: None,
            cancel: None,
        }
    }

    /// Stops the engine-backed build and run steps when `token` is
    /// cancelled. An injected builder or runner is kept as is.
    #[must_use]
    pub fn with_cancel_token(mut self, token: &CancelToken) -> Self {
        self.cancel = Some(token.clone());
        self
    }

    /// Replaces the engine locator.
    #[must_use]
    pub fn with_locator(mut self, locator: Box<dyn EngineLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Replaces the image builder.
    #[must_use]
    pub fn with_image_builder(mut self, builder: Box<dyn ImageBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Replaces the container runner.
    #[must_use]
    pub fn with_container_runner(mut self, runner: Box<dyn ContainerRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Runs the sanity test.
    ///
    /// # Errors
    ///
    /// Returns `SanityError::Build` if the image could not be built and
    /// `SanityError::Run` if the container failed. Cleanup problems are
    /// logged and never returned.
    pub fn run(&self) -> Result<SanityReport> {
        let mut context = BuildContext::new(self.archive.clone(), self.metadata.clone());
        let span = tracing::info_span!("sanity", build_id = %context.build_id());
        let _enter = span.enter();

        let engine = match self.select_engine() {
            Ok(engine) => engine,
            Err(notice) => {
                tracing::warn!(
                    engine = %notice.engine,
                    reason = ?notice.reason,
                    "{} not found, skipping {SUITE_NAME}",
                    notice.engine
                );
                return Ok(SanityReport::Skipped(notice));
            }
        };

        tracing::info!(engine = %engine.kind(), package = %self.metadata, "running {SUITE_NAME}");
        let default_builder;
        let builder: &dyn ImageBuilder = match &self.builder {
            Some(builder) => builder.as_ref(),
            None => {
                default_builder = self.engine_builder();
                &default_builder
            }
        };
        let default_runner;
        let runner: &dyn ContainerRunner = match &self.runner {
            Some(runner) => runner.as_ref(),
            None => {
                default_runner = self.engine_runner();
                &default_runner
            }
        };

        let image = builder.build_image(&mut context, &engine)?;
        let guard = ImageGuard::new(builder, context, image, engine);

        let outcome = runner.run(guard.image(), guard.engine())?;
        drop(guard);
        Ok(SanityReport::Passed(outcome))
    }

    fn engine_builder(&self) -> EngineImageBuilder {
        let builder = EngineImageBuilder::new(self.config.clone());
        match &self.cancel {
            Some(token) => builder.with_cancel_token(token.clone()),
            None => builder,
        }
    }

    fn engine_runner(&self) -> EngineContainerRunner {
        let runner = EngineContainerRunner::from_config(&self.config);
        match &self.cancel {
            Some(token) => runner.with_cancel_token(token.clone()),
            None => runner,
        }
    }

    fn select_engine(&self) -> std::result::Result<Engine, SkipNotice> {
        let detected = match self.locator.detect() {
            EngineChoice::Found(detected) => detected,
            EngineChoice::None { tried } => {
                return Err(SkipNotice {
                    engine: quote_names(&tried),
                    reason: SkipReason::NotFound,
                });
            }
        };

        let unsupported = || SkipNotice {
            engine: quote_names(std::slice::from_ref(&detected.name)),
            reason: SkipReason::Unsupported,
        };
        if !self.config.is_supported(&detected.name) {
            return Err(unsupported());
        }
        let kind: EngineKind = detected.name.parse().map_err(|_| unsupported())?;
        Ok(Engine::new(kind, detected.program))
    }
}

/// Owns a built image and removes it when dropped.
pub struct ImageGuard<'a> {
    builder: &'a dyn ImageBuilder,
    context: BuildContext,
    image: ImageHandle,
    engine: Engine,
}

impl<'a> ImageGuard<'a> {
    /// Takes ownership of `image` and the context it was built from.
    #[must_use]
    pub fn new(
        builder: &'a dyn ImageBuilder,
        context: BuildContext,
        image: ImageHandle,
        engine: Engine,
    ) -> Self {
        Self {
            builder,
            context,
            image,
            engine,
        }
    }

    /// The guarded image.
    #[must_use]
    pub const fn image(&self) -> &ImageHandle {
        &self.image
    }

    /// Engine the image was built with.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Drop for ImageGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self
            .builder
            .cleanup(&mut self.context, &self.image, &self.engine)
        {
            tracing::warn!(image = %self.image.reference(), error = %e, "cleanup failed");
        }
    }
}

fn quote_names(names: &[String]) -> String {
    if names.is_empty() {
        return "\"\"".to_owned();
    }
    names
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
