//! # sanitybox-image
//!
//! Everything that goes into a test image before an engine sees it.
//!
//! Handles:
//! - **Archive**: gzip tarball validation before a build is attempted.
//! - **Hashing**: SHA-256 digest of the archive for image labels.
//! - **Context**: the per-run temporary build directory.
//! - **Dockerfile**: rendering of the build definition.
//! - **Tags**: unique, engine-safe image tags derived from the build id.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod archive;
pub mod context;
pub mod dockerfile;
pub mod hash;
pub mod tag;
