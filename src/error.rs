//! Structured error handling and exit codes.

use serde::Serialize;

use crate::restore::RestoreError;

/// Exit codes for the spx-restore application.
///
/// - 0: Success (every volume verified)
/// - 1: General error (authentication, transport or configuration failure)
/// - 2: Verification failed (run completed, at least one volume failed)
/// - 3: Aborted (a job failed or timed out; remaining volumes skipped)
/// - 4: No images (the appliance reported nothing to restore)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: every restored volume passed verification.
    Success = 0,
    /// General error: authentication, transport or configuration failure.
    GeneralError = 1,
    /// Verification failed: at least one volume is missing the expected content.
    VerificationFailed = 2,
    /// Aborted: an appliance job failed or did not complete in time.
    Aborted = 3,
    /// No images: the appliance has no images to restore.
    NoImages = 4,
    /// Interrupted: run was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "SR000",
            Self::GeneralError => "SR001",
            Self::VerificationFailed => "SR002",
            Self::Aborted => "SR003",
            Self::NoImages => "SR004",
            Self::Interrupted => "SR130",
        }
    }

    /// Choose the exit code for an error that ended the run.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if let Some(restore) = err.downcast_ref::<RestoreError>() {
            return match restore {
                RestoreError::Interrupted => Self::Interrupted,
                e if e.is_job_abort() => Self::Aborted,
                _ => Self::GeneralError,
            };
        }
        Self::GeneralError
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "SR001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
