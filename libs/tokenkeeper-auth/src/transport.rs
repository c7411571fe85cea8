//! Minimal HTTP transport for the token endpoint.
//!
//! One request shape only: a form-encoded POST whose body is read in full.
//! Failures are classified here so the auth client only ever sees
//! [`AuthError::Connection`] or [`AuthError::ResponseRead`] from this layer.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use url::Url;
use zeroize::Zeroizing;

use crate::error::AuthError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Token responses are a few hundred bytes; anything far larger is not one.
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024;

const USER_AGENT_VALUE: &str = concat!("tokenkeeper/", env!("CARGO_PKG_VERSION"));

/// Knobs for the token endpoint transport.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Bound applied separately to the request and to reading the body.
    pub request_timeout: Duration,
    /// Permit `http://` endpoints. Only meant for local mock servers.
    pub allow_insecure_http: bool,
    pub max_body_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            allow_insecure_http: false,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl TransportOptions {
    /// Plain HTTP and a short timeout, for tests against `httpmock`.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            allow_insecure_http: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Status and fully-read body of a token endpoint response.
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

pub(crate) struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: Duration,
    max_body_size: usize,
}

impl HttpTransport {
    pub(crate) fn new(options: &TransportOptions) -> Result<Self, AuthError> {
        let provider = rustls::crypto::CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)
            .map_err(|e| AuthError::Config(format!("TLS setup failed: {e}")))?;
        let https = if options.allow_insecure_http {
            tracing::warn!("plain HTTP token endpoints allowed; use only with local mock servers");
            builder.https_or_http().enable_http1().build()
        } else {
            builder.https_only().enable_http1().build()
        };

        // Ticks are minutes apart; idle connections never outlive one.
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build::<_, Full<Bytes>>(https);

        Ok(Self {
            client,
            request_timeout: options.request_timeout,
            max_body_size: options.max_body_size,
        })
    }

    /// POST `form` to `url` and read the whole response body.
    ///
    /// The HTTP status is returned, not judged: the caller decides from the
    /// body whether the exchange worked. The form buffer is handed to hyper
    /// without a copy and wiped when the request body is dropped; bytes that
    /// hyper stages in its own write buffer are outside that guarantee.
    pub(crate) async fn post_form(
        &self,
        url: &Url,
        form: Zeroizing<String>,
    ) -> Result<RawResponse, AuthError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Full::new(form_bytes(form)))
            .map_err(|e| AuthError::Config(format!("invalid token request for {url}: {e}")))?;

        let response = match tokio::time::timeout(self.request_timeout, self.client.request(request))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(AuthError::Connection {
                    url: url.to_string(),
                    reason: error_chain(&e),
                });
            }
            Err(_) => {
                return Err(AuthError::Connection {
                    url: url.to_string(),
                    reason: format!(
                        "request timed out after {}ms",
                        self.request_timeout.as_millis()
                    ),
                });
            }
        };

        let status = response.status();
        let body = Limited::new(response.into_body(), self.max_body_size);
        let body = match tokio::time::timeout(self.request_timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                return Err(AuthError::ResponseRead {
                    url: url.to_string(),
                    reason: error_chain(&*e),
                });
            }
            Err(_) => {
                return Err(AuthError::ResponseRead {
                    url: url.to_string(),
                    reason: format!(
                        "body read timed out after {}ms",
                        self.request_timeout.as_millis()
                    ),
                });
            }
        };

        tracing::debug!(%url, %status, bytes = body.len(), "token endpoint responded");
        Ok(RawResponse { status, body })
    }
}

/// Owns an encoded form body; the secret bytes are zeroized on drop.
struct FormBuffer(Zeroizing<String>);

impl AsRef<[u8]> for FormBuffer {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

fn form_bytes(form: Zeroizing<String>) -> Bytes {
    Bytes::from_owner(FormBuffer(form))
}

/// Render an error and its sources as `outer: inner: root`.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        current = cause.source();
    }
    out
}
