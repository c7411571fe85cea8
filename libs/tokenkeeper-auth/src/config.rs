use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokenkeeper_utils::{SecretString, duration_serde};
use url::Url;

use crate::client::check_endpoint;
use crate::error::AuthError;
use crate::identity::Identity;
use crate::persist::DEFAULT_FILE_MODE;
use crate::scheduler::DEFAULT_REFRESH_INTERVAL;
use crate::transport::{DEFAULT_MAX_BODY_SIZE, DEFAULT_REQUEST_TIMEOUT, TransportOptions};

pub const DEFAULT_URL: &str = "https://auth.tado.com/oauth/token";
pub const DEFAULT_CLIENT_ID: &str = "public-api-preview";
pub const DEFAULT_SCOPE: &str = "home.user";
pub const DEFAULT_TOKEN_PATH: &str = "/tmp/bearer.dat";

/// Nominal access-token lifetime of the default auth server.
const NOMINAL_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// Settings for one keeper: account, endpoint, token file, timers.
///
/// Every field has a default except the credentials (`username`,
/// `password`, `client_secret`), which [`validate`](Self::validate)
/// requires. Serializing redacts the secrets.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeeperConfig {
    /// Token endpoint URL.
    pub url: String,
    pub username: String,
    pub password: SecretString,
    pub client_id: String,
    pub client_secret: SecretString,
    pub scope: String,
    /// File that receives the raw access token.
    pub bearer_token: PathBuf,
    /// Unix permission bits for the token file.
    pub file_mode: u32,
    #[serde(with = "duration_serde")]
    pub refresh_interval: Duration,
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Permit a plain `http://` endpoint (local mock servers only).
    pub allow_insecure_http: bool,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            username: String::new(),
            password: SecretString::default(),
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            client_secret: SecretString::default(),
            scope: DEFAULT_SCOPE.to_owned(),
            bearer_token: PathBuf::from(DEFAULT_TOKEN_PATH),
            file_mode: DEFAULT_FILE_MODE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            allow_insecure_http: false,
        }
    }
}

impl fmt::Debug for KeeperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeeperConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("scope", &self.scope)
            .field("bearer_token", &self.bearer_token)
            .field("file_mode", &format_args!("{:#o}", self.file_mode))
            .field("refresh_interval", &self.refresh_interval)
            .field("request_timeout", &self.request_timeout)
            .field("allow_insecure_http", &self.allow_insecure_http)
            .finish()
    }
}

impl KeeperConfig {
    /// Check that the configuration can drive a keeper.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the URL is invalid or uses a
    /// disallowed scheme, a credential is empty, the token path is empty,
    /// or a timer is zero.
    pub fn validate(&self) -> Result<(), AuthError> {
        let endpoint = self.endpoint()?;
        check_endpoint(&endpoint, self.allow_insecure_http)?;

        for (name, empty) in [
            ("username", self.username.trim().is_empty()),
            ("password", self.password.is_empty()),
            ("client_id", self.client_id.trim().is_empty()),
            ("client_secret", self.client_secret.is_empty()),
        ] {
            if empty {
                return Err(AuthError::Config(format!("{name} must not be empty")));
            }
        }
        if self.bearer_token.as_os_str().is_empty() {
            return Err(AuthError::Config("bearer_token path must not be empty".into()));
        }
        if self.refresh_interval.is_zero() {
            return Err(AuthError::Config("refresh_interval must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(AuthError::Config("request_timeout must be positive".into()));
        }

        if self.refresh_interval >= NOMINAL_TOKEN_LIFETIME {
            tracing::warn!(
                refresh_interval_secs = self.refresh_interval.as_secs(),
                "refresh_interval is not shorter than the usual 10 minute token lifetime"
            );
        }
        Ok(())
    }

    /// Parsed token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if `url` does not parse.
    pub fn endpoint(&self) -> Result<Url, AuthError> {
        Url::parse(&self.url).map_err(|e| AuthError::Config(format!("invalid url '{}': {e}", self.url)))
    }

    /// Identity for the auth client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if `url` does not parse.
    pub fn identity(&self) -> Result<Identity, AuthError> {
        Ok(Identity {
            endpoint: self.endpoint()?,
            username: self.username.clone(),
            password: self.password.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scope: self.scope.clone(),
        })
    }

    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            request_timeout: self.request_timeout,
            allow_insecure_http: self.allow_insecure_http,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}
