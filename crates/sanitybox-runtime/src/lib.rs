//! Engine detection, image build, container run, and the orchestrator that
//! strings them together for one sanity test.
//!
//! The entry point is [`runner::TestRunner`]. Its three collaborators,
//! [`engine::EngineLocator`], [`build::ImageBuilder`] and
//! [`container::ContainerRunner`], are traits so that each step can be
//! swapped for a deterministic fake.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod build;
pub mod container;
pub mod engine;
pub mod process;
pub mod runner;
