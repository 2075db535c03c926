//! Restore-and-verify workflow.
//!
//! For every volume the appliance knows about, the latest image is mounted
//! read-only, a known file is checked for expected content, and the image is
//! unmounted again before the next volume is touched.
//!
//! # Architecture
//!
//! - [`select`]: latest image per drive letter
//! - [`poll`]: bounded job polling
//! - [`verify`]: content check against the mounted snapshot
//! - [`tester`]: [`RestoreTester`], which sequences the above
//!
//! # Example
//!
//! ```no_run
//! use spx_restore::appliance::{ClientConfig, HttpAppliance};
//! use spx_restore::restore::{RestoreOptions, RestoreTester};
//!
//! let appliance = HttpAppliance::authenticate(
//!     ClientConfig::new("https://localhost:13581/spx"),
//!     "admin",
//!     "secret",
//! )
//! .unwrap();
//!
//! let tester = RestoreTester::new(appliance, RestoreOptions::default());
//! let report = tester.run().unwrap();
//! println!("{} of {} volumes verified", report.passed(), report.volumes.len());
//! ```

pub mod poll;
pub mod select;
pub mod tester;
pub mod verify;

use std::path::PathBuf;
use std::time::Duration;

use crate::appliance::ApplianceError;

// Re-export main types
pub use poll::WaitPolicy;
pub use select::{latest_images, LatestImage};
pub use tester::RestoreTester;
pub use verify::{verification_path, verify_content};

/// Default mountpoint for restored snapshots.
pub const DEFAULT_MOUNTPOINT: &str = "R:";
/// Default file checked inside each snapshot.
pub const DEFAULT_TEST_FILE: &str = "Test 1.txt";
/// Default content expected in the test file.
pub const DEFAULT_TEST_STRING: &str = "Data";
/// Default time allowed for a mount job.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);
/// Default delay between job polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for one restore test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Where each snapshot is mounted
    pub mountpoint: String,
    /// Key for encrypted images
    pub encryption_key: Option<String>,
    /// File, relative to the mountpoint, that is checked
    pub test_file: PathBuf,
    /// Content the test file must contain
    pub test_string: String,
    /// Time allowed for each mount job
    pub job_timeout: Duration,
    /// Delay between job polls
    pub poll_interval: Duration,
    /// Persist changes made while mounted as an incremental
    pub save_changes: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            mountpoint: DEFAULT_MOUNTPOINT.to_string(),
            encryption_key: None,
            test_file: PathBuf::from(DEFAULT_TEST_FILE),
            test_string: DEFAULT_TEST_STRING.to_string(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            save_changes: false,
        }
    }
}

impl RestoreOptions {
    /// Set the mountpoint.
    #[must_use]
    pub fn with_mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        self.mountpoint = mountpoint.into();
        self
    }

    /// Set the encryption key.
    #[must_use]
    pub fn with_encryption_key(mut self, key: Option<String>) -> Self {
        self.encryption_key = key;
        self
    }

    /// Set the file to check and the content it must contain.
    #[must_use]
    pub fn with_test_file(mut self, file: impl Into<PathBuf>, expected: impl Into<String>) -> Self {
        self.test_file = file.into();
        self.test_string = expected.into();
        self
    }

    /// Set the job timeout.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set whether changes are saved on unmount.
    #[must_use]
    pub fn with_save_changes(mut self, save_changes: bool) -> Self {
        self.save_changes = save_changes;
        self
    }
}

/// Conditions that abort a restore test run.
///
/// Verification mismatches are not errors; they are recorded per volume in
/// the run report.
#[derive(thiserror::Error, Debug)]
pub enum RestoreError {
    /// The appliance could not be queried.
    #[error(transparent)]
    Appliance(#[from] ApplianceError),

    /// The appliance reported a negative job status.
    #[error("Job {job_id} failed to complete (status {status})")]
    JobFailed {
        /// Job identifier
        job_id: String,
        /// Status code reported by the appliance
        status: i64,
    },

    /// A mount request did not return a usable job id.
    #[error("Mount of {image} returned no job id")]
    MissingJobId {
        /// Image that was being mounted
        image: String,
    },

    /// The mount job did not complete within the allotted time.
    #[error(
        "The mount operation for volume {drive} failed to complete in {}s",
        .timeout.as_secs()
    )]
    MountTimedOut {
        /// Volume being restored
        drive: String,
        /// Job that was polled
        job_id: String,
        /// Time allowed
        timeout: Duration,
    },

    /// The unmount produced no result.
    #[error(
        "The unmount operation for volume {mountpoint} failed to complete in the specified time"
    )]
    UnmountFailed {
        /// Volume being restored
        drive: String,
        /// Mountpoint the image was exposed at
        mountpoint: String,
    },

    /// The run was stopped by a shutdown request.
    #[error("Restore test interrupted by user")]
    Interrupted,
}

impl RestoreError {
    /// Whether the error is a job failure or timeout, as opposed to a
    /// transport or authentication problem.
    #[must_use]
    pub fn is_job_abort(&self) -> bool {
        matches!(
            self,
            Self::JobFailed { .. }
                | Self::MissingJobId { .. }
                | Self::MountTimedOut { .. }
                | Self::UnmountFailed { .. }
        )
    }
}
