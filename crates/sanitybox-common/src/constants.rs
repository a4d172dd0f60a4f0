//! System-wide constants and defaults.

/// Application name used in CLI output, image tags, and labels.
pub const APP_NAME: &str = "sanitybox";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "sbox";

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "SANITYBOX_CONFIG";

/// Default container engine preference order.
pub const DEFAULT_ENGINES: [&str; 2] = ["podman", "docker"];

/// Base image the generated build definition starts from.
pub const DEFAULT_BASE_IMAGE: &str = "quay.io/ansible/default-test-container:latest";

/// In-image location of the copied archive.
pub const DEFAULT_ARCHIVE_DEST: &str = "/archive/archive.tar.gz";

/// Name of the archive inside the build context directory.
pub const CONTEXT_ARCHIVE_NAME: &str = "archive.tar.gz";

/// Name of the generated build definition inside the build context.
pub const CONTEXT_DOCKERFILE_NAME: &str = "Dockerfile";

/// Root under which the archive is unpacked inside the image.
pub const COLLECTIONS_ROOT: &str = "/ansible_collections";

/// Test command executed inside the container.
pub const DEFAULT_TEST_COMMAND: [&str; 4] = ["ansible-test", "sanity", "--color", "no"];

/// Extra `run` flags applied before the image reference.
pub const DEFAULT_RUN_ARGS: [&str; 2] = ["--network", "none"];

/// Repository prefix of every image tag produced by a build.
pub const IMAGE_REPOSITORY: &str = "localhost/sanitybox";

/// Image label carrying the build identifier.
pub const LABEL_BUILD_ID: &str = "io.sanitybox.build-id";

/// Image label carrying the archive digest.
pub const LABEL_ARCHIVE_SHA256: &str = "io.sanitybox.archive-sha256";

/// Tracing target for lines streamed out of the test container.
pub const CONTAINER_LOG_TARGET: &str = "sanitybox::container";

/// Name of the test suite reported in skip messages.
pub const SUITE_NAME: &str = "ansible-test sanity";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// How often a blocked output read re-checks cancellation, in milliseconds.
pub const CANCEL_POLL_INTERVAL_MS: u64 = 200;
