//! Per-run build context.
//!
//! A [`BuildContext`] owns the archive path, the build identifier, and the
//! temporary directory handed to the engine as its build context. The
//! directory is removed by [`BuildContext::release`] or, failing that, when
//! the context is dropped. A context is never reused across runs.

use std::path::{Path, PathBuf};

use sanitybox_common::constants::{CONTEXT_ARCHIVE_NAME, CONTEXT_DOCKERFILE_NAME};
use sanitybox_common::error::{BuildError, CleanupError};
use sanitybox_common::types::{BuildId, PackageMetadata};
use tempfile::TempDir;

/// Build-time state for one test run.
#[derive(Debug)]
pub struct BuildContext {
    archive: PathBuf,
    metadata: PackageMetadata,
    build_id: BuildId,
    workdir: Option<TempDir>,
}

impl BuildContext {
    /// Creates a context for `archive`, deriving the build id from `metadata`.
    #[must_use]
    pub fn new(archive: impl Into<PathBuf>, metadata: PackageMetadata) -> Self {
        let build_id = metadata.build_id();
        Self {
            archive: archive.into(),
            metadata,
            build_id,
            workdir: None,
        }
    }

    /// Path of the archive under test.
    #[must_use]
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Metadata of the package under test.
    #[must_use]
    pub const fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// Identifier of this build.
    #[must_use]
    pub const fn build_id(&self) -> &BuildId {
        &self.build_id
    }

    /// The prepared build directory, if [`prepare`](Self::prepare) ran.
    #[must_use]
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }

    /// Creates the temporary build directory holding the build definition
    /// and a copy of the archive, returning its path.
    ///
    /// A previously prepared directory is discarded first.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Workspace` if the directory or its files cannot
    /// be written, and `BuildError::ArchiveUnreadable` if the archive cannot
    /// be copied.
    pub fn prepare(&mut self, dockerfile: &str) -> Result<&Path, BuildError> {
        if let Err(e) = self.release() {
            tracing::warn!(build_id = %self.build_id, error = %e, "stale build directory left behind");
        }

        let dir = tempfile::Builder::new()
            .prefix("sanitybox-")
            .tempdir()
            .map_err(|e| BuildError::Workspace {
                path: std::env::temp_dir(),
                source: e,
            })?;

        let dockerfile_path = dir.path().join(CONTEXT_DOCKERFILE_NAME);
        std::fs::write(&dockerfile_path, dockerfile).map_err(|e| BuildError::Workspace {
            path: dockerfile_path.clone(),
            source: e,
        })?;

        let archive_copy = dir.path().join(CONTEXT_ARCHIVE_NAME);
        let _bytes =
            std::fs::copy(&self.archive, &archive_copy).map_err(|e| BuildError::ArchiveUnreadable {
                path: self.archive.clone(),
                source: e,
            })?;

        tracing::debug!(build_id = %self.build_id, dir = %dir.path().display(), "build context prepared");
        Ok(self.workdir.insert(dir).path())
    }

    /// Removes the build directory. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CleanupError::Workspace` if the directory cannot be deleted.
    pub fn release(&mut self) -> Result<(), CleanupError> {
        let Some(dir) = self.workdir.take() else {
            return Ok(());
        };
        let path = dir.path().to_path_buf();
        dir.close()
            .map_err(|e| CleanupError::Workspace { path: path.clone(), source: e })?;
        tracing::debug!(build_id = %self.build_id, dir = %path.display(), "build context removed");
        Ok(())
    }
}
