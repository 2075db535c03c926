//! spx-restore - Automated restore testing for backup appliances
//!
//! Authenticates to the appliance, mounts the latest image of every volume
//! read-only, checks a known file for expected content, and unmounts it
//! again, reporting pass/fail per volume.

pub mod appliance;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
pub mod report;
pub mod restore;
pub mod signal;

use std::io;
use std::sync::Arc;

use anyhow::Context;

use crate::appliance::HttpAppliance;
use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::error::ExitCode;
use crate::progress::{JobProgress, NoProgress, Progress};
use crate::report::{JsonReport, TextReport};
use crate::restore::RestoreTester;

/// Run one restore test as described by the command line.
///
/// # Errors
///
/// Returns an error for configuration problems, authentication failure,
/// appliance errors, job failures, timeouts and interruption. The caller maps
/// it to an exit code with [`ExitCode::for_error`].
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_cli(&cli);
    config.validate()?;
    log::debug!("Effective configuration: {:?}", config);

    let shutdown = signal::install_handler()?;

    let appliance = HttpAppliance::authenticate(config.client_config(), &cli.username, &cli.password)?;

    let progress: Arc<dyn JobProgress> = if cli.quiet || cli.output == OutputFormat::Json {
        Arc::new(NoProgress)
    } else {
        Arc::new(Progress::new(false))
    };

    let tester = RestoreTester::new(appliance, config.restore_options(cli.encryption_key.clone()))
        .with_progress(progress)
        .with_shutdown_flag(shutdown.get_flag());

    let report = tester.run().context("Restore test aborted")?;

    match cli.output {
        OutputFormat::Json => JsonReport::new(&report).write_to(&mut io::stdout().lock())?,
        OutputFormat::Text => {
            if !cli.quiet {
                print!("{}", TextReport::new(&report, !cli.no_color).render());
            }
        }
    }

    Ok(report.exit_code())
}
