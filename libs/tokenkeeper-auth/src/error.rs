use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while obtaining, refreshing, or persisting a token.
///
/// Messages name the endpoint URL or file path plus the underlying cause.
/// Secret values (password, client secret, tokens) never reach the
/// formatted output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The token endpoint could not be reached (refused, DNS, TLS, timeout).
    #[error("could not connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    /// The response arrived but its body could not be read in full.
    #[error("failed to read response from {url}: {reason}")]
    ResponseRead { url: String, reason: String },

    /// The body is not a token response.
    ///
    /// `declined` carries the server's own error payload when it sent one.
    #[error("malformed token response from {url}: {reason}")]
    MalformedResponse {
        url: String,
        reason: String,
        declined: Option<ServerDeclined>,
    },

    /// Writing the token file failed.
    #[error("failed to write token file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration or HTTP client setup.
    #[error("token keeper config error: {0}")]
    Config(String),
}

/// Error payload returned by the authorization server
/// (`{"error": ..., "error_description": ...}`).
///
/// Advisory: it is logged when seen, and it only fails an exchange when the
/// same body carries no usable token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server declined the request: {error} ({description})")]
pub struct ServerDeclined {
    pub error: String,
    pub description: String,
}
