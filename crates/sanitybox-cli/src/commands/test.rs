//! `sbox test` — Run the sanity suite for one archive.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use sanitybox_common::error::SanityError;
use sanitybox_common::types::PackageMetadata;
use sanitybox_runtime::process::CancelToken;
use sanitybox_runtime::runner::{SanityReport, TestRunner};

use super::{ConfigArgs, EXIT_SETUP_FAILED, EXIT_TEST_FAILED};
use crate::output::{self, BOLD, DIM, GREEN, RED, RESET, YELLOW};

/// Lines of container output repeated after a failure.
const FAILURE_TAIL: usize = 20;

/// Arguments for the `test` command.
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Path to the collection archive (.tar.gz).
    pub archive: PathBuf,

    /// Collection namespace.
    #[arg(long)]
    pub namespace: String,

    /// Collection name.
    #[arg(long)]
    pub name: String,

    /// Collection version.
    #[arg(long = "package-version", value_name = "VERSION")]
    pub version: String,

    /// Kill the test container after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub config: ConfigArgs,
}

/// Executes the `test` command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the Ctrl+C handler
/// cannot be installed.
pub fn execute(args: TestArgs) -> anyhow::Result<ExitCode> {
    let mut config = args.config.resolve()?;
    if args.timeout.is_some() {
        config.run_timeout_secs = args.timeout;
        config.validate()?;
    }

    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted, stopping");
        handler_token.cancel();
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let metadata = PackageMetadata::new(args.namespace, args.name, args.version);
    let runner = TestRunner::new(&args.archive, metadata.clone(), &config).with_cancel_token(&token);

    let result = runner.run();
    if args.json {
        print_json(&result)?;
    } else {
        print_human(&metadata, &result);
    }

    Ok(match &result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) if e.is_test_failure() => ExitCode::from(EXIT_TEST_FAILED),
        Err(_) => ExitCode::from(EXIT_SETUP_FAILED),
    })
}

#[allow(clippy::print_stdout)]
fn print_json(result: &Result<SanityReport, SanityError>) -> anyhow::Result<()> {
    let value = match result {
        Ok(report) => serde_json::to_value(report)?,
        Err(e) => output::failure_json(e),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[allow(clippy::print_stderr)]
fn print_human(metadata: &PackageMetadata, result: &Result<SanityReport, SanityError>) {
    eprintln!();
    match result {
        Ok(SanityReport::Passed(outcome)) => {
            eprintln!(
                "  {GREEN}{BOLD}PASSED{RESET} {metadata} {DIM}({} lines in {}){RESET}",
                outcome.lines.len(),
                output::format_duration(outcome.duration)
            );
        }
        Ok(SanityReport::Skipped(notice)) => {
            eprintln!(
                "  {YELLOW}{BOLD}SKIPPED{RESET} {metadata} {DIM}(no usable engine: {}){RESET}",
                notice.engine
            );
        }
        Err(e) => {
            let label = if e.is_test_failure() { "FAILED" } else { "ERROR" };
            eprintln!("  {RED}{BOLD}{label}{RESET} {metadata}: {e}");
            let tail = output::tail(e.output(), FAILURE_TAIL);
            if !tail.is_empty() {
                eprintln!();
                for line in tail {
                    eprintln!("    {DIM}{line}{RESET}");
                }
            }
        }
    }
}
