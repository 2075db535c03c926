//! Command-line interface definitions for spx-restore.
//!
//! There are no subcommands: every invocation runs one restore test against
//! the appliance. Only the credentials are required; everything else
//! overrides the layered configuration (see [`crate::config`]).
//!
//! # Example
//!
//! ```bash
//! # Test the latest image of every volume with defaults
//! spx-restore -u admin -p secret
//!
//! # Encrypted images, custom check file, JSON report
//! spx-restore -u admin -p secret -k backupkey \
//!     --test-file "canary.txt" --test-string "canary" --output json
//!
//! # Verbose mode for debugging
//! spx-restore -v -u admin -p secret
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Test file restores of the latest backup images for each volume.
///
/// Mounts the newest image of every volume on the backup appliance, checks
/// a known file for expected content, and unmounts it again.
#[derive(Debug, Parser)]
#[command(name = "spx-restore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Appliance admin username
    #[arg(short, long, env = "SPX_RESTORE_USERNAME")]
    pub username: String,

    /// Appliance admin password
    #[arg(short, long, env = "SPX_RESTORE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Backup encryption key
    #[arg(short = 'k', long)]
    pub encryption_key: Option<String>,

    /// Appliance host name
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Appliance API port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Full API root, overriding --host and --port (e.g. https://spx:13581/spx)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Where each snapshot is mounted
    #[arg(short, long, value_name = "PATH")]
    pub mountpoint: Option<String>,

    /// File, relative to the mountpoint, checked in every snapshot
    #[arg(long, value_name = "FILE")]
    pub test_file: Option<PathBuf>,

    /// Content the test file must contain
    #[arg(long, value_name = "TEXT")]
    pub test_string: Option<String>,

    /// Seconds to wait for each mount job
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Milliseconds between job status polls (must be greater than zero)
    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Save changes made while mounted as an incremental on unmount
    #[arg(long)]
    pub save_changes: bool,

    /// Validate the appliance TLS certificate
    ///
    /// Off by default because appliances use self-signed certificates.
    #[arg(long)]
    pub verify_tls: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Print fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,
}

/// Output format for the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON report for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
