//! Image tags derived from build identifiers.
//!
//! Engines accept only lowercase `[a-z0-9._-]` in repository components,
//! while build ids come straight from package metadata. Each tag also gets
//! a random suffix so two runs of the same package never share an image.

use sanitybox_common::constants::IMAGE_REPOSITORY;
use sanitybox_common::types::BuildId;

const MAX_COMPONENT_LEN: usize = 128;

/// Builds `localhost/sanitybox/<sanitized-build-id>:<suffix>`.
#[must_use]
pub fn image_tag(build_id: &BuildId, suffix: &str) -> String {
    format!("{IMAGE_REPOSITORY}/{}:{suffix}", sanitize(build_id.as_str()))
}

/// Builds a tag for `build_id` with a fresh random suffix.
#[must_use]
pub fn unique_tag(build_id: &BuildId) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    image_tag(build_id, &uuid[..8])
}

fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    out.truncate(MAX_COMPONENT_LEN);
    let trimmed = out.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    if trimmed.is_empty() {
        "build".to_owned()
    } else {
        trimmed.to_owned()
    }
}
