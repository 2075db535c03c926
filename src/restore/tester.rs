//! The restore test orchestrator.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::appliance::{parse_job_id, Appliance, MountRequest, UnmountRequest};
use crate::progress::{JobProgress, NoProgress};
use crate::report::{RunReport, VolumeOutcome, VolumeReport};

use super::poll::{self, WaitPolicy};
use super::select::{self, LatestImage};
use super::verify;
use super::{RestoreError, RestoreOptions};

/// Drives mount, verify and unmount for every volume on the appliance.
///
/// Volumes are processed strictly one at a time: each image is unmounted
/// before the next one is mounted at the same mountpoint.
pub struct RestoreTester<A> {
    appliance: A,
    options: RestoreOptions,
    progress: Arc<dyn JobProgress>,
    shutdown: Arc<AtomicBool>,
}

impl<A: Appliance> RestoreTester<A> {
    /// Create a tester over an authenticated appliance.
    #[must_use]
    pub fn new(appliance: A, options: RestoreOptions) -> Self {
        Self {
            appliance,
            options,
            progress: Arc::new(NoProgress),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report job polling to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn JobProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop the run when `flag` is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Newest image per drive letter, ordered by drive letter.
    ///
    /// # Errors
    ///
    /// Returns [`RestoreError::Appliance`] if the image list cannot be fetched.
    pub fn latest_images(&self) -> Result<BTreeMap<String, LatestImage>, RestoreError> {
        let images = self.appliance.list_images()?;
        log::debug!("Appliance reported {} images", images.len());
        Ok(select::latest_images(&images))
    }

    /// Ask the appliance to mount an image and return the job id.
    ///
    /// # Errors
    ///
    /// - [`RestoreError::Appliance`] if the request fails
    /// - [`RestoreError::MissingJobId`] if the response carries no job id
    pub fn mount(
        &self,
        image_path: &str,
        mountpoint: &str,
        read_only: bool,
        encryption_key: Option<&str>,
    ) -> Result<String, RestoreError> {
        let request = MountRequest {
            img: image_path.to_string(),
            mountpoint: mountpoint.to_string(),
            read_only,
            use_existing_buffer: true,
            password: encryption_key.map(str::to_string),
        };
        let job_id = parse_job_id(&self.appliance.mount_image(&request)?);
        if job_id.is_empty() {
            return Err(RestoreError::MissingJobId {
                image: image_path.to_string(),
            });
        }
        log::debug!("Mount of {} started as job {}", image_path, job_id);
        Ok(job_id)
    }

    /// Poll a job until it completes or `timeout` runs out.
    ///
    /// Polls are spaced by the configured poll interval; see [`WaitPolicy`]
    /// for how the budget is derived.
    ///
    /// # Errors
    ///
    /// - [`RestoreError::JobFailed`] on a negative status
    /// - [`RestoreError::Interrupted`] on shutdown
    /// - [`RestoreError::Appliance`] if a poll fails
    pub fn wait_for_job(&self, job_id: &str, timeout: Duration) -> Result<bool, RestoreError> {
        let policy = WaitPolicy::new(timeout, self.options.poll_interval);
        poll::wait_for_job(
            &self.appliance,
            job_id,
            &policy,
            self.progress.as_ref(),
            &self.shutdown,
        )
    }

    /// Check a file for a literal substring.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read.
    pub fn verify_content(&self, file_path: &Path, expected: &str) -> io::Result<bool> {
        verify::verify_content(file_path, expected)
    }

    /// Unmount the image mounted for `volume_letter`.
    ///
    /// Returns the appliance response, or `None` if nothing is mounted for
    /// that volume.
    ///
    /// # Errors
    ///
    /// Returns [`RestoreError::Appliance`] if listing or unmounting fails.
    pub fn unmount(
        &self,
        volume_letter: &str,
        save_changes: bool,
    ) -> Result<Option<String>, RestoreError> {
        let mounted = self.appliance.mounted_images()?;
        let Some(target) = mounted.iter().find(|m| m.matches_volume(volume_letter)) else {
            log::warn!("No mounted image found for volume {}", volume_letter);
            return Ok(None);
        };

        log::debug!(
            "Unmounting volume {} (vol_num {}, generate_incremental={})",
            volume_letter,
            target.vol_num,
            save_changes
        );
        let response = self.appliance.unmount_image(
            &target.vol_num,
            &UnmountRequest {
                generate_incremental: save_changes,
            },
        )?;
        Ok(Some(response))
    }

    /// Restore and verify every volume.
    ///
    /// Verification failures are recorded and the run moves on. Job failures,
    /// timeouts, appliance errors and interruption end the run.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`RestoreError`].
    pub fn run(&self) -> Result<RunReport, RestoreError> {
        let start = Instant::now();
        let mut report = RunReport::new();

        let images = self.latest_images()?;
        if images.is_empty() {
            log::warn!("The appliance reported no images to restore");
        }

        for (drive, image) in &images {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(RestoreError::Interrupted);
            }
            let outcome = self.restore_volume(drive, image)?;
            report.volumes.push(VolumeReport {
                drive: drive.clone(),
                uuid: image.uuid.clone(),
                image: image.path.clone(),
                outcome,
            });
        }

        report.finish(start.elapsed());
        log::info!(
            "{} of {} volumes verified",
            report.passed(),
            report.volumes.len()
        );
        Ok(report)
    }

    fn restore_volume(
        &self,
        drive: &str,
        image: &LatestImage,
    ) -> Result<VolumeOutcome, RestoreError> {
        let options = &self.options;
        log::info!("Mounting volume {} using image file: {}", drive, image.path);

        let job_id = self.mount(
            &image.path,
            &options.mountpoint,
            true,
            options.encryption_key.as_deref(),
        )?;

        self.progress
            .on_wait_start(&job_id, &format!("Mounting {drive}"));
        let waited = self.wait_for_job(&job_id, options.job_timeout);
        self.progress
            .on_wait_end(&job_id, matches!(waited, Ok(true)));

        match waited {
            Ok(true) => {}
            Ok(false) => {
                log::error!("Mount of volume {} did not complete", drive);
                return Err(RestoreError::MountTimedOut {
                    drive: drive.to_string(),
                    job_id,
                    timeout: options.job_timeout,
                });
            }
            Err(RestoreError::Interrupted) => {
                log::warn!(
                    "Interrupted while mounting volume {}; {} may still be mounted",
                    drive,
                    options.mountpoint
                );
                return Err(RestoreError::Interrupted);
            }
            Err(e) => return Err(e),
        }

        let outcome = self.check_volume();

        match self.unmount(drive, options.save_changes)? {
            Some(response) if !response.trim().is_empty() => {
                log::info!(
                    "Successfully unmounted image {} from volume {}.",
                    image.path,
                    options.mountpoint
                );
            }
            _ => {
                log::error!("Unmount of volume {} produced no result", drive);
                return Err(RestoreError::UnmountFailed {
                    drive: drive.to_string(),
                    mountpoint: options.mountpoint.clone(),
                });
            }
        }

        Ok(outcome)
    }

    /// Verify the test file on the currently mounted snapshot.
    fn check_volume(&self) -> VolumeOutcome {
        let options = &self.options;
        let path = verify::verification_path(&options.mountpoint, &options.test_file);
        let test_file = options.test_file.display();

        match self.verify_content(&path, &options.test_string) {
            Ok(true) => {
                log::info!("Data verification of {} was successful.", test_file);
                VolumeOutcome::Verified
            }
            Ok(false) => {
                log::warn!(
                    "Data verification failed when examining {} for {}.",
                    test_file,
                    options.test_string
                );
                VolumeOutcome::Mismatch
            }
            Err(e) => {
                log::error!("Could not read {}: {}", path.display(), e);
                VolumeOutcome::Unreadable {
                    error: e.to_string(),
                }
            }
        }
    }
}
