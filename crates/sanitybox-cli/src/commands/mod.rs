//! CLI command definitions and dispatch.

pub mod engines;
pub mod test;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use sanitybox_common::config::SanityConfig;
use sanitybox_common::constants::{BIN_NAME, CONFIG_ENV};

use crate::output::{BOLD, RED, RESET};

/// Exit code for a run whose test command failed.
pub const EXIT_TEST_FAILED: u8 = 1;
/// Exit code for anything that stopped short of a test verdict: bad
/// configuration, a failed build, an engine error.
pub const EXIT_SETUP_FAILED: u8 = 2;

/// sanitybox — ansible-test sanity in a throwaway container.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a test image for an archive and run the sanity suite in it.
    Test(test::TestArgs),
    /// Show which container engine would be used.
    Engines(engines::EnginesArgs),
}

/// Configuration flags shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// JSON configuration file.
    #[arg(long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Container engine to try, in order. Repeat to list several.
    #[arg(long = "engine", value_name = "NAME")]
    pub engines: Vec<String>,

    /// Try docker before any other engine.
    #[arg(long)]
    pub prefer_docker: bool,
}

impl ConfigArgs {
    /// Loads the configuration file, if any, and applies flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result is invalid.
    pub fn resolve(&self) -> anyhow::Result<SanityConfig> {
        let mut config = match &self.config {
            Some(path) => SanityConfig::load(path)?,
            None => SanityConfig::default(),
        };
        if !self.engines.is_empty() {
            config.engines.clone_from(&self.engines);
        }
        if self.prefer_docker {
            config.prefer_docker = true;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// A command that cannot be set up is reported on stderr and exits with
/// [`EXIT_SETUP_FAILED`], never with the test failure code.
#[allow(clippy::print_stderr)]
pub fn execute(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Test(args) => test::execute(args),
        Command::Engines(args) => engines::execute(&args),
    };
    result.unwrap_or_else(|e| {
        tracing::debug!(error = ?e, "command setup failed");
        eprintln!("{RED}{BOLD}error:{RESET} {e:#}");
        ExitCode::from(EXIT_SETUP_FAILED)
    })
}
