//! Typed records exchanged with the appliance API.
//!
//! Responses are validated here, at the deserialization boundary. A body
//! missing a required field fails with a schema error instead of surfacing
//! deep inside the restore workflow.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Job status code reported when an appliance job has finished.
pub const JOB_COMPLETE: i64 = 100;

/// Credentials exchanged for a session token.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Appliance admin username
    pub username: &'a str,
    /// Appliance admin password
    pub password: &'a str,
}

/// Body returned by a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Token sent back in the `Authorization` header
    pub token: String,
}

/// One point-in-time snapshot of one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Unique identifier of the image
    pub uuid: String,
    /// Volume the snapshot was taken from (e.g. `C:`)
    pub drive_letter: String,
    /// Path of the image file on the appliance
    pub filename: String,
    /// Snapshot time as reported by the appliance
    pub snapshot_time: SnapshotTime,
}

impl Image {
    /// Create an image record.
    #[must_use]
    pub fn new(
        uuid: impl Into<String>,
        drive_letter: impl Into<String>,
        filename: impl Into<String>,
        snapshot_time: i64,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            drive_letter: drive_letter.into(),
            filename: filename.into(),
            snapshot_time: SnapshotTime::from_secs(snapshot_time),
        }
    }
}

/// Snapshot time in epoch seconds, fractional part kept.
///
/// Ordering is exact down to the nanosecond, so two snapshots taken within
/// the same second still compare correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SnapshotTime {
    secs: i64,
    nanos: u32,
}

impl SnapshotTime {
    const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// A whole-second snapshot time.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// Convert fractional epoch seconds.
    ///
    /// Returns `None` for non-finite values or values outside the `i64`
    /// second range.
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (whole, nanos) = (
            whole as i64,
            ((secs - whole) * f64::from(Self::NANOS_PER_SEC)).round() as u32,
        );
        if nanos >= Self::NANOS_PER_SEC {
            return Some(Self::from_secs(whole.checked_add(1)?));
        }
        Some(Self { secs: whole, nanos })
    }

    /// Whole seconds, rounded down.
    #[must_use]
    pub const fn as_secs(self) -> i64 {
        self.secs
    }

    /// Fractional part in nanoseconds.
    #[must_use]
    pub const fn subsec_nanos(self) -> u32 {
        self.nanos
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_secs_f64(self) -> f64 {
        self.secs as f64 + f64::from(self.nanos) / f64::from(Self::NANOS_PER_SEC)
    }
}

impl From<i64> for SnapshotTime {
    fn from(secs: i64) -> Self {
        Self::from_secs(secs)
    }
}

impl fmt::Display for SnapshotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            write!(f, "{}", self.secs)
        } else {
            let frac = format!("{:09}", self.nanos);
            write!(f, "{}.{}", self.secs, frac.trim_end_matches('0'))
        }
    }
}

impl Serialize for SnapshotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.nanos == 0 {
            serializer.serialize_i64(self.secs)
        } else {
            serializer.serialize_f64(self.as_secs_f64())
        }
    }
}

impl<'de> Deserialize<'de> for SnapshotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match raw_number(deserializer)? {
            RawNumber::Int(secs) => Ok(Self::from_secs(secs)),
            RawNumber::Float(secs) => Self::from_secs_f64(secs)
                .ok_or_else(|| de::Error::custom(format!("snapshot time out of range: {secs}"))),
        }
    }
}

/// Request body for `POST /v1/mounted_image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountRequest {
    /// Image file to mount
    pub img: String,
    /// Where the snapshot is exposed
    pub mountpoint: String,
    /// Mount without write access
    pub read_only: bool,
    /// Reuse any existing write buffer for the image
    pub use_existing_buffer: bool,
    /// Encryption key for encrypted images, `null` otherwise
    pub password: Option<String>,
}

/// A volume currently mounted on the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MountedImage {
    /// Identifier used to unmount the volume
    #[serde(deserialize_with = "string_or_int")]
    pub vol_num: String,
    /// Drive the mounted snapshot belongs to
    pub snap_drive: String,
    /// Image file backing the mount
    #[serde(default)]
    pub img: Option<String>,
    /// Where the snapshot is exposed
    #[serde(default)]
    pub mountpoint: Option<String>,
    /// Whether the mount is read-only
    #[serde(default)]
    pub read_only: Option<bool>,
    /// Whether the mounted image is encrypted
    #[serde(default)]
    pub encrypted: Option<bool>,
}

impl MountedImage {
    /// Whether this mount belongs to the given volume.
    ///
    /// Only the first character is compared, so `C`, `C:` and `C:\` all
    /// match a `snap_drive` of `C:`. The comparison ignores ASCII case.
    #[must_use]
    pub fn matches_volume(&self, volume_letter: &str) -> bool {
        match (self.snap_drive.chars().next(), volume_letter.chars().next()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(&b),
            _ => false,
        }
    }
}

/// Request body for `DELETE /v1/mounted_image/{vol_num}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnmountRequest {
    /// Persist changes made during the mount as an incremental
    pub generate_incremental: bool,
}

/// Body returned by `GET /v1/chore/{job_id}`.
///
/// The status may arrive as an integer, a float or a numeric string.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct JobStatusBody {
    /// State classified from the raw status code
    #[serde(rename = "status", deserialize_with = "job_state")]
    pub state: JobState,
}

/// State of an asynchronous appliance job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum JobState {
    /// Still running; carries the raw status code (normally 0-99)
    Pending(i64),
    /// Finished successfully (status 100)
    Complete,
    /// The appliance reported a failure (negative status)
    Failed(i64),
}

impl JobState {
    /// Classify a raw status code.
    #[must_use]
    pub fn from_status(status: i64) -> Self {
        if status == JOB_COMPLETE {
            Self::Complete
        } else if status < 0 {
            Self::Failed(status)
        } else {
            Self::Pending(status)
        }
    }

    /// Classify a fractional status code.
    ///
    /// Only exactly 100 is complete. Negative values fail and are rounded
    /// down so they stay negative; progress values are truncated.
    #[must_use]
    pub fn from_status_f64(status: f64) -> Option<Self> {
        if !status.is_finite() {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let state = if status == JOB_COMPLETE as f64 {
            Self::Complete
        } else if status < 0.0 {
            Self::Failed(status.floor() as i64)
        } else {
            Self::Pending(status.trunc() as i64)
        };
        Some(state)
    }
}

/// An appliance job and its last observed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Job identifier returned by the mount/unmount call
    pub id: String,
    /// Last polled state
    pub state: JobState,
}

impl Job {
    /// Build a job from a raw status code.
    #[must_use]
    pub fn new(id: impl Into<String>, status: i64) -> Self {
        Self {
            id: id.into(),
            state: JobState::from_status(status),
        }
    }
}

/// Normalize a job id returned as raw response text.
///
/// The appliance answers with the id as a bare string or as a JSON string
/// literal, sometimes followed by a newline.
#[must_use]
pub fn parse_job_id(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

/// A JSON number or numeric string, integers kept exact.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RawNumber {
    Int(i64),
    Float(f64),
}

fn raw_number<'de, D>(deserializer: D) -> Result<RawNumber, D::Error>
where
    D: Deserializer<'de>,
{
    struct NumberVisitor;

    impl Visitor<'_> for NumberVisitor {
        type Value = RawNumber;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number or a numeric string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawNumber, E> {
            Ok(RawNumber::Int(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawNumber, E> {
            i64::try_from(v)
                .map(RawNumber::Int)
                .map_err(|_| E::custom(format!("integer out of range: {v}")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawNumber, E> {
            if v.is_finite() {
                Ok(RawNumber::Float(v))
            } else {
                Err(E::custom(format!("number out of range: {v}")))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<RawNumber, E> {
            let trimmed = v.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Ok(RawNumber::Int(int));
            }
            match trimmed.parse::<f64>() {
                Ok(float) if float.is_finite() => Ok(RawNumber::Float(float)),
                _ => Err(E::custom(format!("not a numeric string: '{v}'"))),
            }
        }
    }

    deserializer.deserialize_any(NumberVisitor)
}

fn job_state<'de, D>(deserializer: D) -> Result<JobState, D::Error>
where
    D: Deserializer<'de>,
{
    match raw_number(deserializer)? {
        RawNumber::Int(status) => Ok(JobState::from_status(status)),
        RawNumber::Float(status) => JobState::from_status_f64(status)
            .ok_or_else(|| de::Error::custom(format!("invalid job status: {status}"))),
    }
}

fn string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl Visitor<'_> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or an integer")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
