use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tokenkeeper_utils::SecretString;
use url::Url;
use zeroize::Zeroizing;

use crate::error::AuthError;
use crate::identity::Identity;
use crate::scheduler::TokenRefresher;
use crate::token::{ServerErrorBody, TokenResponse, TokenState};
use crate::transport::{HttpTransport, TransportOptions};

/// Which OAuth2 grant a token request uses.
enum Grant<'a> {
    Password,
    RefreshToken(&'a SecretString),
}

impl Grant<'_> {
    fn grant_type(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::RefreshToken(_) => "refresh_token",
        }
    }
}

/// Performs the password-grant and refresh-grant exchanges against the
/// configured token endpoint.
pub struct AuthClient {
    identity: Arc<Identity>,
    transport: HttpTransport,
}

impl AuthClient {
    /// Build a client for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the endpoint scheme is not allowed
    /// by `options` or the TLS stack cannot be initialised.
    pub fn new(identity: Arc<Identity>, options: &TransportOptions) -> Result<Self, AuthError> {
        check_endpoint(&identity.endpoint, options.allow_insecure_http)?;
        let transport = HttpTransport::new(options)?;
        Ok(Self {
            identity,
            transport,
        })
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    /// Exchange username and password for a fresh token pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Connection`], [`AuthError::ResponseRead`] or
    /// [`AuthError::MalformedResponse`] as classified by the shared response
    /// protocol.
    pub async fn authenticate(&self) -> Result<TokenState, AuthError> {
        self.exchange(&Grant::Password).await
    }

    /// Exchange `refresh_token` for a fresh token pair.
    ///
    /// # Errors
    ///
    /// Same classification as [`authenticate`](Self::authenticate).
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenState, AuthError> {
        self.exchange(&Grant::RefreshToken(refresh_token)).await
    }

    async fn exchange(&self, grant: &Grant<'_>) -> Result<TokenState, AuthError> {
        let url = &self.identity.endpoint;
        let form = self.form_body(grant)?;

        tracing::debug!(%url, grant_type = grant.grant_type(), "requesting token");
        let result = self
            .transport
            .post_form(url, form)
            .await
            .and_then(|raw| interpret_response(url, raw.status, &raw.body));

        match &result {
            Ok(state) => tracing::debug!(
                %url,
                grant_type = grant.grant_type(),
                expires_in = state.expires_in,
                "token exchange succeeded"
            ),
            Err(e) => tracing::warn!(
                %url,
                grant_type = grant.grant_type(),
                error = %e,
                "token exchange failed"
            ),
        }
        result
    }

    fn form_body(&self, grant: &Grant<'_>) -> Result<Zeroizing<String>, AuthError> {
        let id = &*self.identity;
        let mut fields: Vec<(&str, &str)> = vec![
            ("client_id", id.client_id.as_str()),
            ("client_secret", id.client_secret.expose()),
            ("grant_type", grant.grant_type()),
            ("scope", id.scope.as_str()),
        ];
        match grant {
            Grant::Password => {
                fields.push(("username", id.username.as_str()));
                fields.push(("password", id.password.expose()));
            }
            Grant::RefreshToken(token) => fields.push(("refresh_token", token.expose())),
        }

        serde_urlencoded::to_string(&fields)
            .map(Zeroizing::new)
            .map_err(|e| AuthError::Config(format!("form encoding failed: {e}")))
    }
}

#[async_trait]
impl TokenRefresher for AuthClient {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenState, AuthError> {
        AuthClient::refresh(self, refresh_token).await
    }
}

/// Reject endpoints the transport would refuse anyway, before any request.
pub(crate) fn check_endpoint(url: &Url, allow_insecure_http: bool) -> Result<(), AuthError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_insecure_http => Ok(()),
        "http" => Err(AuthError::Config(format!(
            "token endpoint {url} uses plain HTTP; set allow_insecure_http to permit it"
        ))),
        other => Err(AuthError::Config(format!(
            "token endpoint {url} has unsupported scheme '{other}'"
        ))),
    }
}

/// Turn a token endpoint response body into a [`TokenState`].
///
/// A server error payload is logged but does not decide the outcome on its
/// own: if the same body also parses as a token response, the exchange
/// succeeds.
// TODO: decide with the auth server owners whether a body carrying both an
// `error` and tokens should fail the exchange; kept lenient for now.
pub(crate) fn interpret_response(
    url: &Url,
    status: StatusCode,
    body: &[u8],
) -> Result<TokenState, AuthError> {
    let declined = ServerErrorBody::probe(body);
    if let Some(d) = &declined {
        tracing::warn!(
            %url,
            %status,
            error = %d.error,
            description = %d.description,
            "authorization server returned an error"
        );
    }

    match serde_json::from_slice::<TokenResponse>(body) {
        Ok(response) => Ok(response.into()),
        Err(e) => Err(AuthError::MalformedResponse {
            url: url.to_string(),
            reason: format!("HTTP {status}: {e}"),
            declined,
        }),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tracing_test::traced_test;

    fn identity(endpoint: &str) -> Arc<Identity> {
        Arc::new(Identity {
            endpoint: Url::parse(endpoint).unwrap(),
            username: "alice".into(),
            password: SecretString::new("pa55word"),
            client_id: "public-api-preview".into(),
            client_secret: SecretString::new("client-s3cret"),
            scope: "home.user".into(),
        })
    }

    fn client_for(server: &MockServer) -> AuthClient {
        AuthClient::new(
            identity(&server.url("/oauth/token")),
            &TransportOptions::for_testing(),
        )
        .unwrap()
    }

    fn test_url() -> Url {
        Url::parse("https://auth.example.com/oauth/token").unwrap()
    }

    // ---- request shape ------------------------------------------------------

    #[tokio::test]
    async fn authenticate_sends_password_grant() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .body_includes("grant_type=password")
                .body_includes("username=alice")
                .body_includes("password=pa55word")
                .body_includes("client_id=public-api-preview")
                .body_includes("client_secret=client-s3cret")
                .body_includes("scope=home.user")
                .body_excludes("refresh_token");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"AT1","refresh_token":"RT1"}"#);
        });

        let state = client_for(&server).authenticate().await.unwrap();

        assert_eq!(state.access_token.expose(), "AT1");
        assert_eq!(state.refresh_token.expose(), "RT1");
        mock.assert();
    }

    #[tokio::test]
    async fn refresh_sends_refresh_grant_without_credentials() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .body_includes("grant_type=refresh_token")
                .body_includes("refresh_token=RT1")
                .body_includes("client_id=public-api-preview")
                .body_includes("client_secret=client-s3cret")
                .body_includes("scope=home.user")
                .body_excludes("username")
                .body_excludes("pa55word");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"AT2","refresh_token":"RT2","token_type":"bearer","expires_in":599}"#);
        });

        let state = client_for(&server)
            .refresh(&SecretString::new("RT1"))
            .await
            .unwrap();

        assert_eq!(state.access_token.expose(), "AT2");
        assert_eq!(state.refresh_token.expose(), "RT2");
        assert_eq!(state.token_type.as_deref(), Some("bearer"));
        assert_eq!(state.expires_in, Some(599));
        mock.assert();
    }

    #[tokio::test]
    async fn form_values_are_url_encoded() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .body_includes("refresh_token=a%2Bb%2Fc%3D");
            then.status(200)
                .body(r#"{"access_token":"AT","refresh_token":"RT"}"#);
        });

        client_for(&server)
            .refresh(&SecretString::new("a+b/c="))
            .await
            .unwrap();
        mock.assert();
    }

    // ---- response protocol --------------------------------------------------

    #[tokio::test]
    #[traced_test]
    async fn error_only_body_is_malformed_and_logged() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(400)
                .header("content-type", "application/json")
                .body(r#"{"error":"invalid_grant","error_description":"bad token"}"#);
        });

        let err = client_for(&server)
            .refresh(&SecretString::new("stale"))
            .await
            .unwrap_err();

        match err {
            AuthError::MalformedResponse { declined, .. } => {
                let declined = declined.expect("server error should be attached");
                assert_eq!(declined.error, "invalid_grant");
                assert_eq!(declined.description, "bad token");
            }
            other => panic!("expected MalformedResponse, got: {other}"),
        }
        assert!(logs_contain("invalid_grant"));
        assert!(logs_contain("bad token"));
    }

    #[tokio::test]
    #[traced_test]
    async fn error_with_valid_tokens_still_succeeds() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(200).body(
                r#"{"error":"slow_down","error_description":"rate limited","access_token":"AT9","refresh_token":"RT9"}"#,
            );
        });

        let state = client_for(&server).authenticate().await.unwrap();

        assert_eq!(state.access_token.expose(), "AT9");
        assert_eq!(state.refresh_token.expose(), "RT9");
        assert!(logs_contain("slow_down"));
    }

    #[tokio::test]
    async fn server_error_with_empty_body_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(500);
        });

        let err = client_for(&server).authenticate().await.unwrap_err();

        assert!(
            matches!(err, AuthError::MalformedResponse { ref reason, declined: None, .. } if reason.contains("500")),
            "expected MalformedResponse, got: {err}"
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_connection_error() {
        let client = AuthClient::new(
            identity("http://127.0.0.1:1/oauth/token"),
            &TransportOptions::for_testing(),
        )
        .unwrap();

        let err = client.authenticate().await.unwrap_err();
        assert!(
            matches!(err, AuthError::Connection { .. }),
            "expected Connection error, got: {err}"
        );
    }

    #[test]
    fn interpret_accepts_minimal_token_body() {
        let state = interpret_response(
            &test_url(),
            StatusCode::OK,
            br#"{"access_token":"AT","refresh_token":"RT"}"#,
        )
        .unwrap();
        assert_eq!(state.access_token.expose(), "AT");
        assert!(state.token_type.is_none());
        assert!(state.expires_in.is_none());
    }

    #[test]
    fn interpret_keeps_tokens_when_hints_have_odd_types() {
        let state = interpret_response(
            &test_url(),
            StatusCode::OK,
            br#"{"access_token":"AT","refresh_token":"RT","expires_in":"599"}"#,
        )
        .unwrap();
        assert_eq!(state.refresh_token.expose(), "RT");
        assert_eq!(state.expires_in, Some(599));

        let state = interpret_response(
            &test_url(),
            StatusCode::OK,
            br#"{"access_token":"AT","refresh_token":"RT","token_type":7,"expires_in":599.5}"#,
        )
        .unwrap();
        assert_eq!(state.access_token.expose(), "AT");
        assert!(state.token_type.is_none());
        assert_eq!(state.expires_in, Some(599));
    }

    #[test]
    #[traced_test]
    fn interpret_reports_error_with_null_description() {
        let err = interpret_response(
            &test_url(),
            StatusCode::BAD_REQUEST,
            br#"{"error":"invalid_grant","error_description":null}"#,
        )
        .unwrap_err();

        match err {
            AuthError::MalformedResponse { declined, .. } => {
                assert_eq!(declined.unwrap().error, "invalid_grant");
            }
            other => panic!("expected MalformedResponse, got {other}"),
        }
        assert!(logs_contain("invalid_grant"));
    }

    #[test]
    fn interpret_rejects_non_json() {
        let err =
            interpret_response(&test_url(), StatusCode::BAD_GATEWAY, b"<html>502</html>").unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse { .. }));
        assert!(err.to_string().contains("https://auth.example.com/oauth/token"));
    }

    #[test]
    fn error_messages_never_contain_secrets() {
        let err = interpret_response(
            &test_url(),
            StatusCode::UNAUTHORIZED,
            br#"{"error":"invalid_client"}"#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains("pa55word"));
        assert!(!msg.contains("client-s3cret"));
    }

    // ---- endpoint checks ----------------------------------------------------

    #[test]
    fn plain_http_rejected_unless_allowed() {
        let url = Url::parse("http://auth.example.com/token").unwrap();
        assert!(check_endpoint(&url, false).is_err());
        assert!(check_endpoint(&url, true).is_ok());
        assert!(check_endpoint(&test_url(), false).is_ok());
    }

    #[test]
    fn unsupported_scheme_rejected() {
        let url = Url::parse("ftp://auth.example.com/token").unwrap();
        let err = check_endpoint(&url, true).unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn new_rejects_http_endpoint_by_default() {
        let result = AuthClient::new(
            identity("http://auth.example.com/token"),
            &TransportOptions::default(),
        );
        assert!(matches!(result, Err(AuthError::Config(_))));
    }
}
