//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements [`JobProgress`]
//! to show a spinner while an appliance job is polled. The restore workflow
//! only ever talks to the trait, so tests and JSON output can pass
//! [`NoProgress`] instead.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::appliance::JobState;

/// Progress callback for appliance jobs.
///
/// Implement this trait to observe job polling during a restore test.
pub trait JobProgress: Send + Sync {
    /// Called before the first poll of a job.
    ///
    /// # Arguments
    ///
    /// * `job_id` - Job being waited on
    /// * `label` - What the job does (e.g. "Mounting C:")
    fn on_wait_start(&self, job_id: &str, label: &str);

    /// Called after each poll.
    ///
    /// # Arguments
    ///
    /// * `job_id` - Job being waited on
    /// * `poll` - Poll number (1-based)
    /// * `state` - State reported by the appliance
    fn on_poll(&self, job_id: &str, poll: u64, state: JobState);

    /// Called when waiting stops, whatever the reason.
    ///
    /// # Arguments
    ///
    /// * `job_id` - Job that was waited on
    /// * `completed` - Whether the job reached status 100
    fn on_wait_end(&self, job_id: &str, completed: bool);
}

/// A [`JobProgress`] that reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl JobProgress for NoProgress {
    fn on_wait_start(&self, _job_id: &str, _label: &str) {}

    fn on_poll(&self, _job_id: &str, _poll: u64, _state: JobState) {}

    fn on_wait_end(&self, _job_id: &str, _completed: bool) {}
}

/// Spinner-based progress reporter.
pub struct Progress {
    spinner: Mutex<Option<ProgressBar>>,
    label: Mutex<String>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no spinner is displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use spx_restore::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            spinner: Mutex::new(None),
            label: Mutex::new(String::new()),
            quiet,
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }
}

impl JobProgress for Progress {
    fn on_wait_start(&self, job_id: &str, label: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(Self::spinner_style());
        pb.set_message(format!("{label} (job {job_id})"));
        pb.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut current) = self.label.lock() {
            *current = label.to_string();
        }
        if let Ok(mut spinner) = self.spinner.lock() {
            *spinner = Some(pb);
        }
    }

    fn on_poll(&self, job_id: &str, poll: u64, state: JobState) {
        if self.quiet {
            return;
        }

        let label = self.label.lock().map(|l| l.clone()).unwrap_or_default();
        if let Ok(spinner) = self.spinner.lock() {
            if let Some(ref pb) = *spinner {
                pb.set_message(format!(
                    "{label} (job {job_id}, poll {poll}, {})",
                    describe_state(state)
                ));
            }
        }
    }

    fn on_wait_end(&self, _job_id: &str, completed: bool) {
        if self.quiet {
            return;
        }

        let label = self.label.lock().map(|l| l.clone()).unwrap_or_default();
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(pb) = spinner.take() {
                if completed {
                    pb.finish_and_clear();
                } else {
                    pb.abandon_with_message(format!("{label}: did not complete"));
                }
            }
        }
    }
}

/// Short human-readable form of a job state.
fn describe_state(state: JobState) -> String {
    match state {
        JobState::Pending(status) => format!("{status}%"),
        JobState::Complete => "complete".to_string(),
        JobState::Failed(status) => format!("failed ({status})"),
    }
}
