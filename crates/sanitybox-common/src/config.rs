//! Configuration model for a sanity run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, SanityError};
use crate::types::EngineKind;

/// Root configuration for sanitybox.
///
/// Every field has a default, so a configuration file only needs to list
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanityConfig {
    /// Engine names in preference order.
    pub engines: Vec<String>,
    /// Moves `docker` to the front of the preference order.
    pub prefer_docker: bool,
    /// Engine names the orchestrator agrees to drive.
    pub supported_engines: Vec<String>,
    /// Image the build definition starts from.
    pub base_image: String,
    /// Path the archive is copied to inside the image.
    pub archive_dest: String,
    /// Command executed inside the test container.
    pub test_command: Vec<String>,
    /// Kill the test container after this many seconds.
    pub run_timeout_secs: Option<u64>,
    /// Extra flags passed to `<engine> run` before the image reference.
    pub extra_run_args: Vec<String>,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            engines: to_strings(&constants::DEFAULT_ENGINES),
            prefer_docker: false,
            supported_engines: EngineKind::ALL
                .iter()
                .map(|kind| kind.binary().to_owned())
                .collect(),
            base_image: constants::DEFAULT_BASE_IMAGE.to_owned(),
            archive_dest: constants::DEFAULT_ARCHIVE_DEST.to_owned(),
            test_command: to_strings(&constants::DEFAULT_TEST_COMMAND),
            run_timeout_secs: None,
            extra_run_args: to_strings(&constants::DEFAULT_RUN_ARGS),
        }
    }
}

impl SanityConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SanityError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `SanityError::Config` when the engine lists or the test
    /// command are unusable.
    pub fn validate(&self) -> Result<()> {
        if self.engines.iter().all(|e| e.trim().is_empty()) {
            return Err(SanityError::Config {
                message: "at least one container engine must be listed".into(),
            });
        }
        if self.test_command.is_empty() {
            return Err(SanityError::Config {
                message: "test command cannot be empty".into(),
            });
        }
        if self.base_image.trim().is_empty() {
            return Err(SanityError::Config {
                message: "base image cannot be empty".into(),
            });
        }
        if !self.archive_dest.starts_with('/') {
            return Err(SanityError::Config {
                message: format!("archive destination '{}' must be absolute", self.archive_dest),
            });
        }
        for name in &self.supported_engines {
            let _kind: EngineKind = name.parse()?;
        }
        if self.run_timeout_secs == Some(0) {
            return Err(SanityError::Config {
                message: "run timeout must be at least one second".into(),
            });
        }
        Ok(())
    }

    /// Engine names in the order they should be probed.
    #[must_use]
    pub fn engine_preference(&self) -> Vec<String> {
        let mut order: Vec<String> = self
            .engines
            .iter()
            .map(|e| e.trim().to_owned())
            .filter(|e| !e.is_empty())
            .collect();
        if self.prefer_docker {
            let docker = EngineKind::Docker.binary();
            order.retain(|e| e != docker);
            order.insert(0, docker.to_owned());
        }
        order
    }

    /// Whether the orchestrator may drive the named engine.
    #[must_use]
    pub fn is_supported(&self, engine: &str) -> bool {
        self.supported_engines.iter().any(|s| s == engine)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}
