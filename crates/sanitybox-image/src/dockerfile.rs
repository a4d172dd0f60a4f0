//! Rendering of the test image build definition.
//!
//! The image starts from the configured base image, copies the archive in,
//! and unpacks it at `/ansible_collections/<namespace>/<name>`, which is
//! also the working directory of the test command.

use std::fmt::Write as _;

use sanitybox_common::config::SanityConfig;
use sanitybox_common::constants::{COLLECTIONS_ROOT, CONTEXT_ARCHIVE_NAME};
use sanitybox_common::error::BuildError;
use sanitybox_common::types::PackageMetadata;

/// Renders the build definition for `metadata`.
///
/// # Errors
///
/// Returns `BuildError::InvalidMetadata` if a metadata field is empty or
/// contains characters that cannot be placed in a path.
pub fn render(config: &SanityConfig, metadata: &PackageMetadata) -> Result<String, BuildError> {
    check_field("namespace", &metadata.namespace, is_name_char)?;
    check_field("name", &metadata.name, is_name_char)?;
    check_field("version", &metadata.version, is_version_char)?;

    let install_dir = format!(
        "{COLLECTIONS_ROOT}/{}/{}",
        metadata.namespace, metadata.name
    );
    let dest = &config.archive_dest;

    let mut out = String::new();
    let _ = writeln!(out, "FROM {}", config.base_image);
    let _ = writeln!(out, "ENV SANITYBOX_NAMESPACE={} \\", metadata.namespace);
    let _ = writeln!(out, "    SANITYBOX_NAME={} \\", metadata.name);
    let _ = writeln!(out, "    SANITYBOX_VERSION={}", metadata.version);
    let _ = writeln!(out, "COPY {CONTEXT_ARCHIVE_NAME} {dest}");
    let _ = writeln!(out, "RUN mkdir -p {install_dir} \\");
    let _ = writeln!(out, "    && tar -xzf {dest} -C {install_dir}");
    let _ = writeln!(out, "WORKDIR {install_dir}");
    Ok(out)
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

const fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_')
}

fn check_field(field: &str, value: &str, allowed: fn(char) -> bool) -> Result<(), BuildError> {
    if value.is_empty() {
        return Err(BuildError::InvalidMetadata {
            message: format!("{field} is empty"),
        });
    }
    if let Some(bad) = value.chars().find(|c| !allowed(*c)) {
        return Err(BuildError::InvalidMetadata {
            message: format!("{field} '{value}' contains '{bad}'"),
        });
    }
    Ok(())
}
