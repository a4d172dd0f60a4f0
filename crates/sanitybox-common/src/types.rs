//! Domain primitive types used across the sanitybox workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SanityError;

/// Identifying tuple of the package under test.
///
/// Supplied by the caller and never modified here; it only feeds
/// human-readable identifiers such as the build id and image tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Publishing namespace.
    pub namespace: String,
    /// Package name within the namespace.
    pub name: String,
    /// Package version string.
    pub version: String,
}

impl PackageMetadata {
    /// Creates metadata from its three components.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Derives the build identifier `namespace-name-version`.
    #[must_use]
    pub fn build_id(&self) -> BuildId {
        BuildId::new(format!("{}-{}-{}", self.namespace, self.name, self.version))
    }
}

impl fmt::Display for PackageMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.namespace, self.name, self.version)
    }
}

/// Identifier of one build, unique per concurrently running test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildId(String);

impl BuildId {
    /// Creates a build ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the engine assigned to a built image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    /// Creates a new image ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to an image produced by one build.
///
/// Valid for the lifetime of the build that created it and released by
/// the image builder's cleanup before the orchestrator returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    /// Engine-assigned image identifier.
    pub id: ImageId,
    /// Tag applied at build time.
    pub tag: String,
}

impl ImageHandle {
    /// Creates a handle from an engine image id and the tag it was built with.
    #[must_use]
    pub fn new(id: ImageId, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
        }
    }

    /// Reference to pass to engine commands: the id, or the tag when the
    /// engine reported no id.
    #[must_use]
    pub fn reference(&self) -> &str {
        if self.id.as_str().is_empty() {
            &self.tag
        } else {
            self.id.as_str()
        }
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reference(), self.tag)
    }
}

/// Container engines this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Daemonless engine from the containers project.
    Podman,
    /// Docker CLI talking to a Docker daemon.
    Docker,
}

impl EngineKind {
    /// Every recognized engine, in the default preference order.
    pub const ALL: [Self; 2] = [Self::Podman, Self::Docker];

    /// Canonical binary name looked up on `PATH`.
    #[must_use]
    pub const fn binary(self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }

    /// Fragments the engine prints when asked to remove an image that no
    /// longer exists.
    #[must_use]
    pub const fn missing_image_markers(self) -> &'static [&'static str] {
        match self {
            Self::Podman => &["image not known", "no such image"],
            Self::Docker => &["No such image", "no such image"],
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for EngineKind {
    type Err = SanityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "podman" => Ok(Self::Podman),
            "docker" => Ok(Self::Docker),
            other => Err(SanityError::Config {
                message: format!("unsupported container engine: {other}"),
            }),
        }
    }
}

/// SHA-256 hash digest used to label images with their archive content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> crate::error::Result<Self> {
        let hex = hex.into();
        if hex.len() != crate::constants::SHA256_HEX_LENGTH
            || !hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(SanityError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}
