use std::path::PathBuf;

use reqwest::header::{HeaderName, InvalidHeaderName};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::CredentialHeader;

fn default_login_path() -> String {
    "/base/access_token".to_owned()
}

fn default_refresh_path() -> String {
    "/base/refresh_token".to_owned()
}

fn default_logout_path() -> String {
    "/base/logout".to_owned()
}

fn default_header() -> String {
    "token".to_owned()
}

fn default_max_renewals() -> usize {
    1
}

/// An error building a client from its configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration could not be parsed
    #[error("unable to parse configuration")]
    Parse(#[from] serde_json::Error),
    /// The credential header name is not a valid HTTP header name
    #[error("invalid credential header name")]
    InvalidHeader(#[from] InvalidHeaderName),
    /// An endpoint URL could not be built from the base URL and path
    #[error("invalid endpoint URL")]
    InvalidUrl(#[from] url::ParseError),
    /// The credentials file could not be opened
    #[error("unable to open credentials file")]
    CredentialsFile(#[from] std::io::Error),
}

/// Settings for an [`ApiClient`](crate::ApiClient)
///
/// Only `base_url` is required when deserializing.
///
/// ```
/// use authgate_reqwest::AuthConfig;
///
/// let config = AuthConfig::from_json(r#"{ "base_url": "https://example.com/api/v1" }"#)?;
/// assert_eq!(config.refresh_path, "/base/refresh_token");
/// assert_eq!(
///     config.endpoint_url(&config.refresh_path)?.as_str(),
///     "https://example.com/api/v1/base/refresh_token"
/// );
/// # Ok::<(), authgate_reqwest::ConfigError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The URL every API path is relative to
    pub base_url: Url,
    /// The path of the login endpoint
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// The path of the refresh endpoint
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// The path of the logout endpoint
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// The header carrying the access token
    #[serde(default = "default_header")]
    pub header: String,
    /// Send the access token as a bearer token
    ///
    /// When set, the token is sent as `<header>: Bearer <token>`, which is
    /// usually paired with `"header": "authorization"`.
    #[serde(default)]
    pub bearer: bool,
    /// How many times a single request may be renewed and replayed
    #[serde(default = "default_max_renewals")]
    pub max_renewals: usize,
    /// Where to persist credentials; kept in memory when absent
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

impl AuthConfig {
    /// Default settings for an API at `base_url`
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            login_path: default_login_path(),
            refresh_path: default_refresh_path(),
            logout_path: default_logout_path(),
            header: default_header(),
            bearer: false,
            max_renewals: default_max_renewals(),
            credentials_file: None,
        }
    }

    /// Parses settings from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the login path
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Sets the refresh path
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Sets the logout path
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    /// Sets the header carrying the access token
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Sends the access token as `Authorization: Bearer <token>`
    pub fn with_bearer(mut self) -> Self {
        self.header = "authorization".to_owned();
        self.bearer = true;
        self
    }

    /// Sets how many times a single request may be renewed and replayed
    pub fn with_max_renewals(mut self, max_renewals: usize) -> Self {
        self.max_renewals = max_renewals;
        self
    }

    /// Persists credentials to `path`
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Builds the URL of `path` relative to the base URL
    ///
    /// The path is appended to the base URL's path rather than replacing it.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
    }

    /// The header described by these settings
    pub fn credential_header(&self) -> Result<CredentialHeader, ConfigError> {
        let name = HeaderName::from_bytes(self.header.to_ascii_lowercase().as_bytes())?;
        Ok(if self.bearer {
            CredentialHeader::named_bearer(name)
        } else {
            CredentialHeader::named(name)
        })
    }
}
