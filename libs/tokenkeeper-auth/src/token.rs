use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokenkeeper_utils::SecretString;

use crate::error::ServerDeclined;

/// The token pair from the latest successful exchange.
///
/// Only ever replaced as a whole; `expires_in` is informational and plays
/// no part in scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
}

/// Wire shape of a successful token response.
///
/// `Deserialize`-only so tokens cannot be serialized back into logs.
/// Unknown fields (`scope`, `jti`, ...) are ignored, and the two hint fields
/// never fail the parse: a value of an unexpected type becomes `None`.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default, deserialize_with = "lenient_token_type")]
    token_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_expires_in")]
    expires_in: Option<u64>,
}

fn lenient_token_type<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Accepts `599`, `599.5` and `"599"`.
fn lenient_expires_in<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_seconds)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_seconds))
        }
        _ => None,
    })
}

// Range-checked above the cast.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn whole_seconds(secs: f64) -> Option<u64> {
    (secs.is_finite() && secs >= 0.0 && secs < u64::MAX as f64).then(|| secs.trunc() as u64)
}

impl From<TokenResponse> for TokenState {
    fn from(r: TokenResponse) -> Self {
        Self {
            access_token: SecretString::from(r.access_token),
            refresh_token: SecretString::from(r.refresh_token),
            token_type: r.token_type,
            expires_in: r.expires_in,
        }
    }
}

/// Wire shape of the server's error payload. Either field may be `null`.
#[derive(Deserialize, Default)]
pub(crate) struct ServerErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "error_description")]
    description: Option<String>,
}

impl ServerErrorBody {
    /// Probe a body for a server error. Anything unparseable or with an
    /// empty `error` field counts as "no error".
    pub(crate) fn probe(body: &[u8]) -> Option<ServerDeclined> {
        let parsed: Self = serde_json::from_slice(body).unwrap_or_default();
        let error = parsed.error.filter(|e| !e.is_empty())?;
        Some(ServerDeclined {
            error,
            description: parsed.description.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_response() {
        let json = r#"{"access_token":"AT","token_type":"bearer","refresh_token":"RT","expires_in":599,"scope":"home.user","jti":"x"}"#;
        let state: TokenState = serde_json::from_str::<TokenResponse>(json).unwrap().into();
        assert_eq!(state.access_token.expose(), "AT");
        assert_eq!(state.refresh_token.expose(), "RT");
        assert_eq!(state.token_type.as_deref(), Some("bearer"));
        assert_eq!(state.expires_in, Some(599));
    }

    #[test]
    fn refresh_token_is_required() {
        let json = r#"{"access_token":"AT"}"#;
        assert!(serde_json::from_str::<TokenResponse>(json).is_err());
    }

    #[test]
    fn token_state_debug_is_redacted() {
        let state = TokenState {
            access_token: SecretString::new("eyJhbGciOi"),
            refresh_token: SecretString::new("rt-value"),
            token_type: None,
            expires_in: None,
        };
        let dbg = format!("{state:?}");
        assert!(!dbg.contains("eyJhbGciOi"));
        assert!(!dbg.contains("rt-value"));
    }

    #[test]
    fn probe_finds_server_error() {
        let body = br#"{"error":"invalid_grant","error_description":"bad token"}"#;
        let declined = ServerErrorBody::probe(body).unwrap();
        assert_eq!(declined.error, "invalid_grant");
        assert_eq!(declined.description, "bad token");
    }

    #[test]
    fn hint_fields_of_unexpected_type_do_not_fail_the_parse() {
        let cases: [(&str, Option<&str>, Option<u64>); 6] = [
            (r#""expires_in":"599""#, None, Some(599)),
            (r#""expires_in":599.5"#, None, Some(599)),
            (r#""expires_in":-1"#, None, None),
            (r#""expires_in":{"secs":599}"#, None, None),
            (r#""token_type":7"#, None, None),
            (r#""token_type":null,"expires_in":null"#, None, None),
        ];
        for (extra, token_type, expires_in) in cases {
            let json = format!(r#"{{"access_token":"AT","refresh_token":"RT",{extra}}}"#);
            let state: TokenState = serde_json::from_str::<TokenResponse>(&json)
                .unwrap_or_else(|e| panic!("{extra}: {e}"))
                .into();
            assert_eq!(state.access_token.expose(), "AT");
            assert_eq!(state.token_type.as_deref(), token_type, "{extra}");
            assert_eq!(state.expires_in, expires_in, "{extra}");
        }
    }

    #[test]
    fn probe_tolerates_null_description() {
        let body = br#"{"error":"invalid_grant","error_description":null}"#;
        let declined = ServerErrorBody::probe(body).unwrap();
        assert_eq!(declined.error, "invalid_grant");
        assert_eq!(declined.description, "");

        let body = br#"{"error":"invalid_client"}"#;
        assert_eq!(ServerErrorBody::probe(body).unwrap().error, "invalid_client");
    }

    #[test]
    fn probe_ignores_empty_or_foreign_bodies() {
        assert!(ServerErrorBody::probe(br#"{"error":null}"#).is_none());
        assert!(ServerErrorBody::probe(br#"{"error":""}"#).is_none());
        assert!(ServerErrorBody::probe(br#"{"access_token":"AT"}"#).is_none());
        assert!(ServerErrorBody::probe(b"").is_none());
        assert!(ServerErrorBody::probe(b"<html>oops</html>").is_none());
    }
}
