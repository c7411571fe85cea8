use std::fmt;

use tokenkeeper_utils::SecretString;
use url::Url;

/// Static account identity used for every exchange.
///
/// Built once from configuration and never mutated afterwards. `Debug`
/// prints the username and client id but never the password or client
/// secret.
#[derive(Clone)]
pub struct Identity {
    pub endpoint: Url,
    pub username: String,
    pub password: SecretString,
    pub client_id: String,
    pub client_secret: SecretString,
    pub scope: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("endpoint", &self.endpoint.as_str())
            .field("username", &self.username)
            .field("password", &self.password)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("scope", &self.scope)
            .finish()
    }
}
