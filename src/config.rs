//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML file (`--config`, else `config.toml` in the platform config dir)
//! 3. Environment variables prefixed with `SPX_RESTORE_`
//! 4. CLI flags ([`Config::apply_cli`])
//!
//! # Example
//!
//! ```toml
//! host = "spx.example.local"
//! mountpoint = "S:"
//! test_file = "restore-canary.txt"
//! test_string = "canary"
//! job_timeout_secs = 600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::appliance::ClientConfig;
use crate::cli::Cli;
use crate::restore::{
    RestoreOptions, DEFAULT_MOUNTPOINT, DEFAULT_TEST_FILE, DEFAULT_TEST_STRING,
};

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "SPX_RESTORE_";

/// Default appliance host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default appliance API port.
pub const DEFAULT_PORT: u16 = 13581;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Appliance host name
    pub host: String,
    /// Appliance API port
    pub port: u16,
    /// Full API root; overrides `host` and `port` when set
    pub base_url: Option<String>,
    /// Validate the appliance TLS certificate
    pub verify_tls: bool,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
    /// Where each snapshot is mounted
    pub mountpoint: String,
    /// File checked inside each snapshot
    pub test_file: PathBuf,
    /// Content the test file must contain
    pub test_string: String,
    /// Seconds allowed for each mount job
    pub job_timeout_secs: u64,
    /// Milliseconds between job polls
    pub poll_interval_ms: u64,
    /// Save changes made while mounted as an incremental
    pub save_changes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            base_url: None,
            verify_tls: false,
            request_timeout_secs: 30,
            mountpoint: DEFAULT_MOUNTPOINT.to_string(),
            test_file: PathBuf::from(DEFAULT_TEST_FILE),
            test_string: DEFAULT_TEST_STRING.to_string(),
            job_timeout_secs: 300,
            poll_interval_ms: 1000,
            save_changes: false,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be parsed or extracted.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A value is out of range.
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

impl Config {
    /// Load configuration from the default file location and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer is malformed or
    /// `explicit_path` does not exist.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::load_from_path(path)
            }
            None => match Self::default_path() {
                Some(path) => Self::load_from_path(&path),
                None => Self::figment(None)
                    .extract()
                    .map_err(|e| ConfigError::Load(Box::new(e))),
            },
        }
    }

    /// Load configuration from a specific TOML file plus the environment.
    ///
    /// A missing file contributes nothing; defaults and environment still
    /// apply.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file or an environment value
    /// cannot be parsed.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading configuration from {}", path.display());
        Self::figment(Some(path))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Default platform-specific configuration path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "spx-restore", "spx-restore")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply CLI flag overrides on top of the loaded layers.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host.clone_from(host);
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(base_url) = &cli.base_url {
            self.base_url = Some(base_url.clone());
        }
        if let Some(mountpoint) = &cli.mountpoint {
            self.mountpoint.clone_from(mountpoint);
        }
        if let Some(test_file) = &cli.test_file {
            self.test_file.clone_from(test_file);
        }
        if let Some(test_string) = &cli.test_string {
            self.test_string.clone_from(test_string);
        }
        if let Some(timeout) = cli.timeout {
            self.job_timeout_secs = timeout;
        }
        if let Some(interval) = cli.poll_interval {
            self.poll_interval_ms = interval;
        }
        if cli.save_changes {
            self.save_changes = true;
        }
        if cli.verify_tls {
            self.verify_tls = true;
        }
    }

    /// Check values that would make a run meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_none() && self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "host",
                reason: "must not be empty",
            });
        }
        if self.base_url.is_none() && self.port == 0 {
            return Err(ConfigError::Invalid {
                field: "port",
                reason: "must be greater than zero",
            });
        }
        if self
            .base_url
            .as_deref()
            .is_some_and(|url| !url.starts_with("https://") && !url.starts_with("http://"))
        {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: "must start with http:// or https://",
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be greater than zero",
            });
        }
        if self.job_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "job_timeout_secs",
                reason: "must be greater than zero",
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.test_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "test_file",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    /// API root, e.g. `https://localhost:13581/spx`.
    #[must_use]
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}:{}/spx", self.host, self.port),
        }
    }

    /// HTTP client settings derived from this configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url())
            .with_verify_tls(self.verify_tls)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    /// Restore options derived from this configuration.
    #[must_use]
    pub fn restore_options(&self, encryption_key: Option<String>) -> RestoreOptions {
        RestoreOptions::default()
            .with_mountpoint(self.mountpoint.clone())
            .with_encryption_key(encryption_key)
            .with_test_file(self.test_file.clone(), self.test_string.clone())
            .with_job_timeout(Duration::from_secs(self.job_timeout_secs))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_save_changes(self.save_changes)
    }
}
