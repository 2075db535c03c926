//! Client side of the backup appliance API.
//!
//! This module provides:
//! - Typed records for every request and response body ([`types`])
//! - The [`Appliance`] trait the restore workflow is written against
//! - [`HttpAppliance`], the token-authenticated HTTP implementation ([`http`])
//!
//! # Example
//!
//! ```no_run
//! use spx_restore::appliance::{Appliance, ClientConfig, HttpAppliance};
//!
//! let config = ClientConfig::new("https://localhost:13581/spx");
//! let appliance = HttpAppliance::authenticate(config, "admin", "secret").unwrap();
//! for image in appliance.list_images().unwrap() {
//!     println!("{} {}", image.drive_letter, image.filename);
//! }
//! ```

pub mod http;
pub mod types;

// Re-export main types
pub use http::{ClientConfig, HttpAppliance};
pub use types::{
    parse_job_id, Image, Job, JobState, MountRequest, MountedImage, SnapshotTime, UnmountRequest,
    JOB_COMPLETE,
};

/// Operations the restore workflow needs from the appliance.
///
/// Authentication happens when an implementation is constructed, so every
/// method here runs against an established session.
pub trait Appliance {
    /// List every image known to the appliance.
    fn list_images(&self) -> Result<Vec<Image>, ApplianceError>;

    /// Request a mount and return the raw response text (the job id).
    fn mount_image(&self, request: &MountRequest) -> Result<String, ApplianceError>;

    /// Poll the state of a job.
    fn job(&self, job_id: &str) -> Result<Job, ApplianceError>;

    /// List the volumes currently mounted.
    fn mounted_images(&self) -> Result<Vec<MountedImage>, ApplianceError>;

    /// Unmount a volume and return the raw response text.
    fn unmount_image(
        &self,
        vol_num: &str,
        request: &UnmountRequest,
    ) -> Result<String, ApplianceError>;
}

impl<A: Appliance + ?Sized> Appliance for &A {
    fn list_images(&self) -> Result<Vec<Image>, ApplianceError> {
        (**self).list_images()
    }

    fn mount_image(&self, request: &MountRequest) -> Result<String, ApplianceError> {
        (**self).mount_image(request)
    }

    fn job(&self, job_id: &str) -> Result<Job, ApplianceError> {
        (**self).job(job_id)
    }

    fn mounted_images(&self) -> Result<Vec<MountedImage>, ApplianceError> {
        (**self).mounted_images()
    }

    fn unmount_image(
        &self,
        vol_num: &str,
        request: &UnmountRequest,
    ) -> Result<String, ApplianceError> {
        (**self).unmount_image(vol_num, request)
    }
}

/// Errors raised while talking to the appliance.
#[derive(thiserror::Error, Debug)]
pub enum ApplianceError {
    /// The appliance could not be reached during login.
    #[error("Authentication failed: appliance unreachable at {url}: {source}")]
    Unreachable {
        /// Login URL
        url: String,
        /// The underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// The appliance rejected the credentials.
    #[error("Authentication failed ({status}): {body}")]
    AuthRejected {
        /// HTTP status code
        status: u16,
        /// Response body as sent by the appliance
        body: String,
    },

    /// A request after login failed at the transport level.
    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        /// Endpoint path, e.g. `/v1/image`
        endpoint: String,
        /// The underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// The appliance answered with a non-success status.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        /// Endpoint path
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// A response body did not match the expected record.
    #[error("Unexpected response from {endpoint}: {source}")]
    Schema {
        /// Endpoint path
        endpoint: String,
        /// The underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// An identifier returned by the appliance cannot be used in a URL path.
    #[error("Cannot address {endpoint} with identifier '{id}'")]
    InvalidId {
        /// Endpoint path the identifier was meant for
        endpoint: String,
        /// The offending identifier
        id: String,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApplianceError {
    /// Whether this error happened while logging in.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::AuthRejected { .. })
    }
}
