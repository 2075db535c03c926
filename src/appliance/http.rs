//! Token-authenticated HTTP implementation of [`Appliance`].
//!
//! All calls are blocking. The client is built once from an explicit
//! [`ClientConfig`]; certificate verification is a field of that
//! configuration rather than process-wide state.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use super::types::{
    Image, Job, JobStatusBody, LoginRequest, LoginResponse, MountRequest, MountedImage,
    UnmountRequest,
};
use super::{Appliance, ApplianceError};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, e.g. `https://localhost:13581/spx`
    pub base_url: String,
    /// Validate the appliance certificate.
    ///
    /// Off by default: appliances ship self-signed certificates, and the
    /// tool is meant to be pointed at a known host.
    pub verify_tls: bool,
    /// Timeout applied to each request
    pub request_timeout: Duration,
    /// User-Agent header
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a configuration for the given API root with default settings.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            verify_tls: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: format!("spx-restore/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set whether the appliance certificate is validated.
    #[must_use]
    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL for an endpoint path such as `/v1/image`.
    #[must_use]
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

/// An authenticated session. Lives as long as the process; never revoked.
#[derive(Clone)]
struct Session {
    base_url: String,
    token: String,
}

impl Session {
    /// Value of the `Authorization` header.
    fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// URL of `endpoint` with `id` appended as one percent-encoded path
    /// segment, so `/`, `?` and `#` in an id cannot change the resource.
    fn id_url(&self, endpoint: &str, id: &str) -> Result<Url, ApplianceError> {
        let invalid = || ApplianceError::InvalidId {
            endpoint: endpoint.to_string(),
            id: id.to_string(),
        };
        if matches!(id, "" | "." | "..") {
            return Err(invalid());
        }
        let mut url = Url::parse(&self.url(endpoint)).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// HTTP client for the appliance API.
#[derive(Debug)]
pub struct HttpAppliance {
    client: Client,
    session: Session,
}

impl HttpAppliance {
    /// Exchange credentials for a token and return a ready client.
    ///
    /// # Errors
    ///
    /// - [`ApplianceError::Unreachable`] if the login request cannot be sent
    /// - [`ApplianceError::AuthRejected`] if the appliance answers anything
    ///   other than `200 OK`
    /// - [`ApplianceError::Schema`] if the login body has no token
    pub fn authenticate(
        config: ClientConfig,
        username: &str,
        password: &str,
    ) -> Result<Self, ApplianceError> {
        let client = build_client(&config)?;
        if !config.verify_tls {
            log::debug!(
                "TLS certificate verification disabled for {}",
                config.base_url
            );
        }

        let url = config.endpoint_url("/auth/login");
        log::debug!("Authenticating as '{}' at {}", username, url);

        let response = client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .map_err(|source| ApplianceError::Unreachable {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|source| ApplianceError::Unreachable { url, source })?;

        if status != StatusCode::OK {
            return Err(ApplianceError::AuthRejected {
                status: status.as_u16(),
                body,
            });
        }

        let login: LoginResponse = decode("/auth/login", &body)?;
        log::info!("Authenticated to {}", config.base_url);

        Ok(Self {
            client,
            session: Session {
                base_url: config.base_url,
                token: login.token,
            },
        })
    }

    /// Send an authenticated request and return the body of a 2xx response.
    fn send(&self, endpoint: &str, builder: RequestBuilder) -> Result<String, ApplianceError> {
        let response = builder
            .header(AUTHORIZATION, self.session.authorization())
            .send()
            .map_err(|source| ApplianceError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|source| ApplianceError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        log::trace!("{} -> {} ({} bytes)", endpoint, status, body.len());

        if !status.is_success() {
            return Err(ApplianceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApplianceError> {
        let body = self.send(endpoint, self.client.get(self.session.url(endpoint)))?;
        decode(endpoint, &body)
    }
}

impl Appliance for HttpAppliance {
    fn list_images(&self) -> Result<Vec<Image>, ApplianceError> {
        self.get_json("/v1/image")
    }

    fn mount_image(&self, request: &MountRequest) -> Result<String, ApplianceError> {
        let endpoint = "/v1/mounted_image";
        self.send(
            endpoint,
            self.client.post(self.session.url(endpoint)).json(request),
        )
    }

    fn job(&self, job_id: &str) -> Result<Job, ApplianceError> {
        let endpoint = format!("/v1/chore/{job_id}");
        let url = self.session.id_url("/v1/chore", job_id)?;
        let body = self.send(&endpoint, self.client.get(url))?;
        let status: JobStatusBody = decode(&endpoint, &body)?;
        Ok(Job {
            id: job_id.to_string(),
            state: status.state,
        })
    }

    fn mounted_images(&self) -> Result<Vec<MountedImage>, ApplianceError> {
        self.get_json("/v1/mounted_image")
    }

    fn unmount_image(
        &self,
        vol_num: &str,
        request: &UnmountRequest,
    ) -> Result<String, ApplianceError> {
        let endpoint = format!("/v1/mounted_image/{vol_num}");
        let url = self.session.id_url("/v1/mounted_image", vol_num)?;
        self.send(&endpoint, self.client.delete(url).json(request))
    }
}

/// Builds the blocking client used for every request.
fn build_client(config: &ClientConfig) -> Result<Client, ApplianceError> {
    Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.clone())
        .danger_accept_invalid_certs(!config.verify_tls)
        .build()
        .map_err(ApplianceError::Client)
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, ApplianceError> {
    serde_json::from_str(body).map_err(|source| ApplianceError::Schema {
        endpoint: endpoint.to_string(),
        source,
    })
}
