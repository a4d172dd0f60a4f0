//! Container engine detection.
//!
//! Detection is a plain binary-existence check against `PATH`, made through
//! a [`BinaryResolver`] so that tests never depend on the host. Whether the
//! engine actually works (daemon reachable, storage configured) surfaces
//! later as a build or run failure.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use sanitybox_common::config::SanityConfig;
use sanitybox_common::types::EngineKind;

/// Resolves a binary name to an executable path.
pub trait BinaryResolver: Send + Sync {
    /// Returns the executable path for `binary`, or `None` if it cannot be found.
    fn resolve(&self, binary: &str) -> Option<PathBuf>;
}

/// Resolver backed by the host `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl BinaryResolver for PathResolver {
    fn resolve(&self, binary: &str) -> Option<PathBuf> {
        which::which(binary).ok()
    }
}

/// Resolver that searches an explicit list of directories instead of `PATH`.
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    paths: OsString,
    cwd: PathBuf,
}

impl SearchPathResolver {
    /// Creates a resolver over `dirs`, searched in order.
    ///
    /// Returns `None` if the directories cannot be joined into a search path.
    #[must_use]
    pub fn new<I, P>(dirs: I) -> Option<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let dirs: Vec<PathBuf> = dirs.into_iter().map(|d| d.as_ref().to_path_buf()).collect();
        let cwd = dirs.first().cloned().unwrap_or_else(std::env::temp_dir);
        let paths = std::env::join_paths(dirs).ok()?;
        Some(Self { paths, cwd })
    }
}

impl BinaryResolver for SearchPathResolver {
    fn resolve(&self, binary: &str) -> Option<PathBuf> {
        which::which_in(binary, Some(&self.paths), &self.cwd).ok()
    }
}

/// An engine binary found on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedEngine {
    /// Name the binary was looked up by.
    pub name: String,
    /// Resolved executable path.
    pub program: PathBuf,
}

/// Outcome of engine detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineChoice {
    /// The first candidate that resolved.
    Found(DetectedEngine),
    /// No candidate resolved.
    None {
        /// Candidates that were tried, in order.
        tried: Vec<String>,
    },
}

/// Decides which container engine binary to use.
pub trait EngineLocator: Send + Sync {
    /// Probes the host and reports the preferred available engine.
    fn detect(&self) -> EngineChoice;
}

/// Locator that tries candidate names in order through a [`BinaryResolver`].
pub struct PathEngineLocator {
    candidates: Vec<String>,
    resolver: Box<dyn BinaryResolver>,
}

impl PathEngineLocator {
    /// Creates a locator over `candidates`, tried in the given order.
    #[must_use]
    pub fn new(candidates: Vec<String>, resolver: Box<dyn BinaryResolver>) -> Self {
        Self {
            candidates,
            resolver,
        }
    }

    /// Creates a host `PATH` locator using the configured preference order.
    #[must_use]
    pub fn from_config(config: &SanityConfig) -> Self {
        Self::new(config.engine_preference(), Box::new(PathResolver))
    }

    /// Candidate names in probe order.
    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

impl EngineLocator for PathEngineLocator {
    fn detect(&self) -> EngineChoice {
        for name in &self.candidates {
            if let Some(program) = self.resolver.resolve(name) {
                tracing::debug!(engine = %name, program = %program.display(), "container engine resolved");
                return EngineChoice::Found(DetectedEngine {
                    name: name.clone(),
                    program,
                });
            }
            tracing::debug!(engine = %name, "container engine not on PATH");
        }
        EngineChoice::None {
            tried: self.candidates.clone(),
        }
    }
}

/// A supported engine, ready to be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    kind: EngineKind,
    program: PathBuf,
}

impl Engine {
    /// Creates an engine of `kind` invoked through `program`.
    #[must_use]
    pub fn new(kind: EngineKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
        }
    }

    /// Which engine this is.
    #[must_use]
    pub const fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Executable invoked for every engine command.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Starts a command line for this engine.
    #[must_use]
    pub fn command(&self) -> Command {
        Command::new(&self.program)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct MapResolver(HashMap<&'static str, &'static str>);

    impl BinaryResolver for MapResolver {
        fn resolve(&self, binary: &str) -> Option<PathBuf> {
            self.0.get(binary).map(PathBuf::from)
        }
    }

    fn locator(candidates: &[&str], found: &[(&'static str, &'static str)]) -> PathEngineLocator {
        PathEngineLocator::new(
            candidates.iter().map(|c| (*c).to_owned()).collect(),
            Box::new(MapResolver(found.iter().copied().collect())),
        )
    }

    #[test]
    fn detect_returns_first_resolvable_candidate() {
        let loc = locator(
            &["podman", "docker"],
            &[("podman", "/usr/bin/podman"), ("docker", "/usr/bin/docker")],
        );
        assert_eq!(
            loc.detect(),
            EngineChoice::Found(DetectedEngine {
                name: "podman".into(),
                program: PathBuf::from("/usr/bin/podman"),
            })
        );
    }

    #[test]
    fn detect_falls_through_to_later_candidates() {
        let loc = locator(&["podman", "docker"], &[("docker", "/usr/local/bin/docker")]);
        match loc.detect() {
            EngineChoice::Found(engine) => assert_eq!(engine.name, "docker"),
            EngineChoice::None { .. } => panic!("docker should resolve"),
        }
    }

    #[test]
    fn detect_reports_every_candidate_tried() {
        let loc = locator(&["random_container_engine"], &[]);
        assert_eq!(
            loc.detect(),
            EngineChoice::None {
                tried: vec!["random_container_engine".into()],
            }
        );
    }

    #[test]
    fn from_config_honours_prefer_docker() {
        let config = SanityConfig {
            prefer_docker: true,
            ..SanityConfig::default()
        };
        let loc = PathEngineLocator::from_config(&config);
        assert_eq!(loc.candidates(), ["docker", "podman"]);
    }

    #[test]
    fn search_path_resolver_ignores_host_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = SearchPathResolver::new([dir.path()]).expect("resolver");
        assert!(resolver.resolve("sh").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn search_path_resolver_finds_executables() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let bin = dir.path().join("podman");
        std::fs::write(&bin, "#!/bin/sh\n").expect("write");
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let resolver = SearchPathResolver::new([dir.path()]).expect("resolver");
        assert_eq!(resolver.resolve("podman"), Some(bin));
    }

    #[test]
    fn engine_command_uses_resolved_program() {
        let engine = Engine::new(EngineKind::Docker, "/opt/bin/docker");
        assert_eq!(engine.command().get_program(), "/opt/bin/docker");
        assert_eq!(engine.kind(), EngineKind::Docker);
    }
}
