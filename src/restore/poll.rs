//! Bounded polling of appliance jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::appliance::{Appliance, JobState};
use crate::progress::JobProgress;

use super::RestoreError;

/// How long to wait for a job, and how often to ask.
///
/// The poll budget is `ceil(timeout / interval)`, never less than one. A
/// zero interval polls back-to-back with the budget of a one-second
/// interval, so `timeout = 3s` always means three polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Total time allowed
    pub timeout: Duration,
    /// Delay between polls
    pub interval: Duration,
}

impl WaitPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Maximum number of polls before giving up.
    #[must_use]
    pub fn max_polls(&self) -> u64 {
        let step = if self.interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.interval
        };
        let polls = self.timeout.as_nanos().div_ceil(step.as_nanos());
        u64::try_from(polls).unwrap_or(u64::MAX).max(1)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(super::DEFAULT_JOB_TIMEOUT, super::DEFAULT_POLL_INTERVAL)
    }
}

/// Poll `job_id` until it completes, fails, or the budget runs out.
///
/// Returns `Ok(true)` once status 100 is seen and `Ok(false)` when every poll
/// came back pending. No sleep follows a terminal status or the last poll.
///
/// # Errors
///
/// - [`RestoreError::JobFailed`] as soon as a negative status is seen
/// - [`RestoreError::Interrupted`] if `shutdown` is raised between polls
/// - [`RestoreError::Appliance`] if a poll request fails
pub fn wait_for_job<A: Appliance + ?Sized>(
    appliance: &A,
    job_id: &str,
    policy: &WaitPolicy,
    progress: &dyn JobProgress,
    shutdown: &AtomicBool,
) -> Result<bool, RestoreError> {
    let max_polls = policy.max_polls();
    log::debug!(
        "Waiting for job {} (up to {} polls every {:?})",
        job_id,
        max_polls,
        policy.interval
    );

    for poll in 1..=max_polls {
        if shutdown.load(Ordering::SeqCst) {
            return Err(RestoreError::Interrupted);
        }

        let job = appliance.job(job_id)?;
        progress.on_poll(job_id, poll, job.state);
        log::trace!("Job {} poll {}: {:?}", job_id, poll, job.state);

        match job.state {
            JobState::Complete => {
                log::debug!("Job {} complete after {} polls", job_id, poll);
                return Ok(true);
            }
            JobState::Failed(status) => {
                log::error!("Job {} failed with status {}", job_id, status);
                return Err(RestoreError::JobFailed {
                    job_id: job_id.to_string(),
                    status,
                });
            }
            JobState::Pending(_) => {}
        }

        if poll < max_polls && !policy.interval.is_zero() {
            thread::sleep(policy.interval);
        }
    }

    log::warn!("Job {} still pending after {} polls", job_id, max_polls);
    Ok(false)
}
