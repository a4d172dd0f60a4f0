//! Test image construction and removal.

use std::path::Path;
use std::process::Command;

use sanitybox_common::config::SanityConfig;
use sanitybox_common::constants::{CONTEXT_DOCKERFILE_NAME, LABEL_ARCHIVE_SHA256, LABEL_BUILD_ID};
use sanitybox_common::error::{BuildError, CleanupError};
use sanitybox_common::types::{BuildId, ImageHandle, ImageId, Sha256Hash};
use sanitybox_image::context::BuildContext;
use sanitybox_image::{archive, dockerfile, hash, tag};

use crate::engine::Engine;
use crate::process::{CancelToken, StreamEnd, StreamingChild, command_line};

/// Builds the test image and removes it again.
pub trait ImageBuilder: Send + Sync {
    /// Materializes an image containing the context's archive.
    ///
    /// Blocks until the engine's build process has exited.
    ///
    /// # Errors
    ///
    /// Returns a `BuildError` if the archive is unusable, the build context
    /// cannot be prepared, or the engine build fails.
    fn build_image(
        &self,
        context: &mut BuildContext,
        engine: &Engine,
    ) -> Result<ImageHandle, BuildError>;

    /// Removes `image` and the context's temporary files.
    ///
    /// Idempotent: an image that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns a `CleanupError` for unexpected engine or filesystem failures.
    fn cleanup(
        &self,
        context: &mut BuildContext,
        image: &ImageHandle,
        engine: &Engine,
    ) -> Result<(), CleanupError>;
}

/// [`ImageBuilder`] that shells out to `<engine> build` and `<engine> image rm`.
#[derive(Debug, Clone)]
pub struct EngineImageBuilder {
    config: SanityConfig,
    cancel: Option<CancelToken>,
}

impl EngineImageBuilder {
    /// Creates a builder rendering images from `config`.
    #[must_use]
    pub const fn new(config: SanityConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Kills the build process when `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The `<engine> build` invocation for a prepared context directory.
    #[must_use]
    pub fn build_command(
        engine: &Engine,
        context_dir: &Path,
        tag: &str,
        build_id: &BuildId,
        digest: &Sha256Hash,
    ) -> Command {
        let mut cmd = engine.command();
        let _ = cmd
            .arg("build")
            .arg("--quiet")
            .args(["--tag", tag])
            .arg("--label")
            .arg(format!("{LABEL_BUILD_ID}={build_id}"))
            .arg("--label")
            .arg(format!("{LABEL_ARCHIVE_SHA256}={}", digest.as_hex()))
            .arg("--file")
            .arg(context_dir.join(CONTEXT_DOCKERFILE_NAME))
            .arg(context_dir);
        cmd
    }

    fn run_build(&self, cmd: Command) -> Result<ImageId, BuildError> {
        let line = command_line(&cmd);
        let mut child =
            StreamingChild::spawn(cmd, None, self.cancel.clone()).map_err(|e| BuildError::Spawn {
                command: line.clone(),
                source: e,
            })?;

        let mut output = Vec::new();
        for l in child.lines() {
            tracing::debug!(target: "sanitybox::build", "{l}");
            output.push(l);
        }
        let exit = child.wait().map_err(|e| BuildError::Spawn {
            command: line.clone(),
            source: e,
        })?;
        output.extend(exit.unread);

        if exit.end == StreamEnd::Cancelled {
            return Err(BuildError::Cancelled { command: line });
        }
        if exit.code != 0 {
            let message = output
                .iter()
                .rev()
                .find(|l| !l.is_empty())
                .cloned()
                .unwrap_or_default();
            return Err(BuildError::Failed {
                command: line,
                exit_code: exit.code,
                message,
                output,
            });
        }

        output
            .iter()
            .rev()
            .find_map(|l| parse_image_id(l))
            .ok_or(BuildError::MissingImageId { command: line })
    }
}

impl ImageBuilder for EngineImageBuilder {
    fn build_image(
        &self,
        context: &mut BuildContext,
        engine: &Engine,
    ) -> Result<ImageHandle, BuildError> {
        let summary = archive::validate_archive(context.archive())?;
        let digest = hash::hash_file(context.archive())?;
        let definition = dockerfile::render(&self.config, context.metadata())?;
        let tag = tag::unique_tag(context.build_id());
        let build_id = context.build_id().clone();

        let dir = context.prepare(&definition)?.to_path_buf();
        let cmd = Self::build_command(engine, &dir, &tag, &build_id, &digest);

        tracing::info!(
            engine = %engine.kind(),
            tag = %tag,
            entries = summary.entries,
            archive = %digest,
            "building image"
        );

        match self.run_build(cmd) {
            Ok(id) => {
                tracing::info!(image = %id, tag = %tag, "image built");
                Ok(ImageHandle::new(id, tag))
            }
            Err(e) => {
                if matches!(e, BuildError::MissingImageId { .. }) {
                    if let Err(cleanup) = remove_image(engine, &tag) {
                        tracing::warn!(error = %cleanup, tag = %tag, "could not remove untracked image");
                    }
                }
                if let Err(cleanup) = context.release() {
                    tracing::warn!(error = %cleanup, "could not remove build context");
                }
                Err(e)
            }
        }
    }

    fn cleanup(
        &self,
        context: &mut BuildContext,
        image: &ImageHandle,
        engine: &Engine,
    ) -> Result<(), CleanupError> {
        tracing::info!(image = %image.reference(), "removing temporary files and image");
        let workspace = context.release();
        let removed = remove_image(engine, image.reference());
        if let (Err(e), Err(_)) = (&workspace, &removed) {
            tracing::warn!(error = %e, "could not remove build context");
        }
        removed.and(workspace)
    }
}

/// Removes `reference` with `<engine> image rm --force`.
///
/// An image the engine reports as unknown counts as removed.
///
/// # Errors
///
/// Returns `CleanupError::Image` if the engine cannot be run or fails for
/// any other reason.
pub fn remove_image(engine: &Engine, reference: &str) -> Result<(), CleanupError> {
    let mut cmd = engine.command();
    let _ = cmd.args(["image", "rm", "--force", reference]);
    let line = command_line(&cmd);

    let output = cmd.output().map_err(|e| CleanupError::Image {
        image: reference.to_owned(),
        command: line.clone(),
        exit_code: None,
        message: e.to_string(),
    })?;
    if output.status.success() {
        tracing::debug!(image = %reference, "image removed");
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if engine
        .kind()
        .missing_image_markers()
        .iter()
        .any(|marker| stderr.contains(marker))
    {
        tracing::debug!(image = %reference, "image already removed");
        return Ok(());
    }

    Err(CleanupError::Image {
        image: reference.to_owned(),
        command: line,
        exit_code: output.status.code(),
        message: stderr.trim().to_owned(),
    })
}

/// Accepts `sha256:<hex>` or bare hex ids of at least 12 characters.
fn parse_image_id(line: &str) -> Option<ImageId> {
    let line = line.trim();
    let hex = line.strip_prefix("sha256:").unwrap_or(line);
    let valid = (12..=64).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| ImageId::new(line))
}

#[cfg(test)]
mod tests {
    use sanitybox_common::types::EngineKind;

    use super::*;

    #[test]
    fn parse_image_id_accepts_engine_formats() {
        let long = format!("sha256:{}", "a".repeat(64));
        assert_eq!(parse_image_id(&long), Some(ImageId::new(long.clone())));
        assert_eq!(
            parse_image_id("0123456789ab\n"),
            Some(ImageId::new("0123456789ab"))
        );
    }

    #[test]
    fn parse_image_id_rejects_log_lines() {
        assert_eq!(parse_image_id("STEP 1/5: FROM base"), None);
        assert_eq!(parse_image_id("abc"), None);
        assert_eq!(parse_image_id(""), None);
    }

    #[test]
    fn build_command_carries_tag_labels_and_context() {
        let engine = Engine::new(EngineKind::Podman, "/usr/bin/podman");
        let digest = Sha256Hash::from_hex("b".repeat(64)).expect("digest");
        let cmd = EngineImageBuilder::build_command(
            &engine,
            Path::new("/tmp/sanitybox-ctx"),
            "localhost/sanitybox/ns-name-1.0.0:deadbeef",
            &BuildId::new("ns-name-1.0.0"),
            &digest,
        );
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "build");
        assert!(args.contains(&"--quiet".to_owned()));
        assert!(args.contains(&"localhost/sanitybox/ns-name-1.0.0:deadbeef".to_owned()));
        assert!(args.contains(&"io.sanitybox.build-id=ns-name-1.0.0".to_owned()));
        assert!(args.contains(&format!("io.sanitybox.archive-sha256={}", "b".repeat(64))));
        assert!(args.contains(&"/tmp/sanitybox-ctx/Dockerfile".to_owned()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/sanitybox-ctx"));
    }
}
