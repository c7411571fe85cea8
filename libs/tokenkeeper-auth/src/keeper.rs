use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::AuthClient;
use crate::config::KeeperConfig;
use crate::error::AuthError;
use crate::persist::TokenPersister;
use crate::scheduler::{RefreshScheduler, SchedulerHandle};
use crate::store::CredentialStore;

/// Startup sequence for one account.
///
/// [`start`](Self::start) authenticates, writes the first token, and only
/// then hands the credential store to the refresh scheduler. If either of
/// the first two steps fails nothing is spawned.
pub struct TokenKeeper {
    client: AuthClient,
    persister: TokenPersister,
    refresh_interval: Duration,
}

impl TokenKeeper {
    #[must_use]
    pub fn new(client: AuthClient, persister: TokenPersister, refresh_interval: Duration) -> Self {
        Self {
            client,
            persister,
            refresh_interval,
        }
    }

    /// Validate `config` and build the client and persister it describes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] for invalid settings or if the HTTP
    /// client cannot be built.
    pub fn from_config(config: &KeeperConfig) -> Result<Self, AuthError> {
        config.validate()?;
        let identity = Arc::new(config.identity()?);
        let client = AuthClient::new(identity, &config.transport_options())?;
        let persister = TokenPersister::new(&config.bearer_token).with_mode(config.file_mode);
        Ok(Self::new(client, persister, config.refresh_interval))
    }

    /// Authenticate, persist the first access token, start refreshing.
    ///
    /// The returned handle's scheduler stops when `cancel` is cancelled.
    ///
    /// # Errors
    ///
    /// Any exchange or persistence error from the initial step.
    pub async fn start(self, cancel: CancellationToken) -> Result<SchedulerHandle, AuthError> {
        let endpoint = self.client.identity().endpoint.clone();
        tracing::info!(
            url = %endpoint,
            username = %self.client.identity().username,
            path = %self.persister.path().display(),
            "authenticating"
        );

        let state = self.client.authenticate().await?;
        self.persister.persist(&state.access_token)?;
        tracing::info!(url = %endpoint, "initial access token stored");

        let store = CredentialStore::new(Arc::clone(self.client.identity()), state);
        Ok(RefreshScheduler::new(self.client, self.persister, self.refresh_interval)
            .spawn_with_cancel(store, cancel))
    }
}
