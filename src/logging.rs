//! Logging infrastructure for spx-restore.
//!
//! This module provides structured logging using the `log` facade and `env_logger` backend.
//! Log levels are determined by (in priority order):
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. CLI flags: `--quiet` (error only) or `--verbose` (debug/trace)
//! 3. Default: info level
//!
//! Records go to stderr, so `--output json` on stdout stays machine-readable.
//! The HTTP stack (`reqwest`, `hyper`, `rustls`) is held at warn unless
//! tracing is requested with `-vv`.
//!
//! # Example
//!
//! ```rust,no_run
//! use spx_restore::logging::init_logging;
//!
//! // Initialize with default (info) level
//! init_logging(0, false);
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Crates whose logs are capped unless tracing.
const NOISY_DEPENDENCIES: &[&str] = &["reqwest", "hyper", "hyper_util", "rustls"];

/// Initialize the logging subsystem based on CLI verbosity flags.
///
/// Safe to call more than once; only the first call installs a logger.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from CLI (0=normal, 1=debug, 2+=trace)
/// * `quiet` - If true, only show errors (overridden by RUST_LOG)
pub fn init_logging(verbose: u8, quiet: bool) {
    let use_env = env::var("RUST_LOG").is_ok();
    let level = determine_level(verbose, quiet);

    let mut builder = Builder::new();

    if use_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level);
        let dependency_level = dependency_level(level);
        for module in NOISY_DEPENDENCIES {
            builder.filter_module(module, dependency_level);
        }
    }

    configure_format(&mut builder, verbose);

    if builder.try_init().is_err() {
        return;
    }

    if use_env {
        log::debug!(
            "Logging initialized from RUST_LOG environment variable: {:?}",
            env::var("RUST_LOG").ok()
        );
    } else {
        log::debug!("Logging initialized at level: {:?}", level);
    }
}

/// Determine the log level from CLI flags.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Level for HTTP stack crates given the application level.
fn dependency_level(level: LevelFilter) -> LevelFilter {
    if level == LevelFilter::Trace {
        LevelFilter::Debug
    } else {
        level.min(LevelFilter::Warn)
    }
}

/// Configure the log format based on build type and verbosity.
///
/// - Debug builds: timestamp and level, plus module path with `-v`
/// - Release builds: compact format (level + message only)
fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_seconds();
            let level = record.level();
            let level_style = buf.default_level_style(level);

            if verbose >= 1 {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} {}",
                    timestamp,
                    level,
                    record.args()
                )
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let level_style = buf.default_level_style(level);
            writeln!(
                buf,
                "{level_style}{:<5}{level_style:#} {}",
                level,
                record.args()
            )
        });
    }
}
