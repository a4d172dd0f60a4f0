//! `sbox engines` — Show container engine detection.

use std::process::ExitCode;

use clap::Args;
use sanitybox_runtime::engine::{BinaryResolver, EngineChoice, EngineLocator, PathEngineLocator, PathResolver};

use super::ConfigArgs;
use crate::output::{BOLD, DIM, GREEN, RESET, YELLOW};

/// Arguments for the `engines` command.
#[derive(Args, Debug)]
pub struct EnginesArgs {
    #[command(flatten)]
    #[allow(missing_docs)]
    pub config: ConfigArgs,
}

/// Executes the `engines` command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
#[allow(clippy::print_stdout)]
pub fn execute(args: &EnginesArgs) -> anyhow::Result<ExitCode> {
    let config = args.config.resolve()?;
    let locator = PathEngineLocator::from_config(&config);

    println!("ENGINE\tSUPPORTED\tPATH");
    for name in locator.candidates() {
        let path = PathResolver
            .resolve(name)
            .map_or_else(|| "-".to_owned(), |p| p.display().to_string());
        let supported = if config.is_supported(name) { "yes" } else { "no" };
        println!("{name}\t{supported}\t{path}");
    }
    println!();

    match locator.detect() {
        EngineChoice::Found(engine) if config.is_supported(&engine.name) => {
            println!("{GREEN}{BOLD}using{RESET} {} {DIM}({}){RESET}", engine.name, engine.program.display());
        }
        EngineChoice::Found(engine) => {
            println!("{YELLOW}{BOLD}unsupported{RESET} {}, sanity tests would be skipped", engine.name);
        }
        EngineChoice::None { .. } => {
            println!("{YELLOW}{BOLD}none found{RESET}, sanity tests would be skipped");
        }
    }
    Ok(ExitCode::SUCCESS)
}
