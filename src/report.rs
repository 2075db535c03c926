//! Restore test results and their text/JSON rendering.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "started_at": "2026-10-19T08:00:00Z",
//!   "elapsed_ms": 5123,
//!   "volumes": [
//!     {
//!       "drive": "C:",
//!       "uuid": "5f0c...",
//!       "image": "C_VOL-b001-i004.spi",
//!       "outcome": { "result": "verified" }
//!     }
//!   ],
//!   "summary": { "volumes": 1, "passed": 1, "failed": 0 }
//! }
//! ```

use std::fmt::Write as _;
use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use yansi::Paint;

use crate::error::ExitCode;

/// Verification result for one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VolumeOutcome {
    /// The test file contains the expected content
    Verified,
    /// The test file was read but the expected content is absent
    Mismatch,
    /// The test file could not be read
    Unreadable {
        /// I/O error message
        error: String,
    },
}

impl VolumeOutcome {
    /// Whether the volume passed verification.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Result for one restored volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeReport {
    /// Drive letter of the volume
    pub drive: String,
    /// Image that was mounted
    pub uuid: String,
    /// Image file path on the appliance
    pub image: String,
    /// Verification outcome
    pub outcome: VolumeOutcome,
}

/// Results of a complete restore test run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run in milliseconds
    pub elapsed_ms: u64,
    /// One entry per restored volume, in restore order
    pub volumes: Vec<VolumeReport>,
}

impl RunReport {
    /// Create an empty report stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed_ms: 0,
            volumes: Vec::new(),
        }
    }

    /// Record the run duration.
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    }

    /// Number of volumes that passed verification.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.volumes
            .iter()
            .filter(|v| v.outcome.is_verified())
            .count()
    }

    /// Number of volumes that failed verification.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.volumes.len() - self.passed()
    }

    /// Exit code summarizing the run.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.volumes.is_empty() {
            ExitCode::NoImages
        } else if self.failed() > 0 {
            ExitCode::VerificationFailed
        } else {
            ExitCode::Success
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals included in JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Volumes restored
    pub volumes: usize,
    /// Volumes verified
    pub passed: usize,
    /// Volumes that failed verification
    pub failed: usize,
}

/// JSON rendering of a [`RunReport`].
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    summary: JsonSummary,
}

impl<'a> JsonReport<'a> {
    /// Wrap a report for JSON output.
    #[must_use]
    pub fn new(report: &'a RunReport) -> Self {
        Self {
            report,
            summary: JsonSummary {
                volumes: report.volumes.len(),
                passed: report.passed(),
                failed: report.failed(),
            },
        }
    }

    /// Serialize to a pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty-printed JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        let json = self.to_json_pretty()?;
        writeln!(writer, "{json}")?;
        Ok(())
    }
}

/// Plain-text summary of a [`RunReport`].
pub struct TextReport<'a> {
    report: &'a RunReport,
    color: bool,
}

impl<'a> TextReport<'a> {
    /// Create a text renderer.
    #[must_use]
    pub fn new(report: &'a RunReport, color: bool) -> Self {
        Self { report, color }
    }

    /// Render the summary table.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for volume in &self.report.volumes {
            let status = match &volume.outcome {
                VolumeOutcome::Verified => self.paint("PASS", true),
                VolumeOutcome::Mismatch => self.paint("FAIL", false),
                VolumeOutcome::Unreadable { .. } => self.paint("ERROR", false),
            };
            let _ = write!(out, "{status:<5} {} {}", volume.drive, volume.image);
            if let VolumeOutcome::Unreadable { error } = &volume.outcome {
                let _ = write!(out, " ({error})");
            }
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{} of {} volumes verified in {:.1}s",
            self.report.passed(),
            self.report.volumes.len(),
            self.report.elapsed_ms as f64 / 1000.0
        );
        out
    }

    fn paint(&self, label: &str, ok: bool) -> String {
        if !self.color {
            return label.to_string();
        }
        if ok {
            label.green().bold().to_string()
        } else {
            label.red().bold().to_string()
        }
    }
}
