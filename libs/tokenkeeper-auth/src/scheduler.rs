//! Fail-stop background refresh of the token pair.
//!
//! The scheduler owns the [`CredentialStore`] once started. Every tick it
//! exchanges the current refresh token, replaces the whole token state and
//! writes the new access token out. The first failure of either step ends
//! the task for good; there is no retry and no backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokenkeeper_utils::SecretString;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::AuthError;
use crate::store::CredentialStore;
use crate::token::TokenState;

/// Tokens from the default auth server live ten minutes; refresh at ~90%.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(9 * 60);

/// Exchanges a refresh token for a new token pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenState, AuthError>;
}

/// Receives each newly issued access token.
pub trait TokenSink: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AuthError::Io`] when the token could not be stored.
    fn persist(&self, access_token: &SecretString) -> Result<(), AuthError>;
}

#[async_trait]
impl<T: TokenRefresher + ?Sized> TokenRefresher for Arc<T> {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenState, AuthError> {
        (**self).refresh(refresh_token).await
    }
}

impl<T: TokenSink + ?Sized> TokenSink for Arc<T> {
    fn persist(&self, access_token: &SecretString) -> Result<(), AuthError> {
        (**self).persist(access_token)
    }
}

/// Why the scheduler task ended.
#[derive(Debug)]
pub enum SchedulerExit {
    /// The host cancelled it.
    Cancelled,
    /// A refresh or persist failed; the scheduler is stopped for good.
    Failed(AuthError),
    /// The task panicked or was aborted.
    Aborted(String),
}

/// Periodic refresh-then-persist loop.
pub struct RefreshScheduler<R, S> {
    refresher: R,
    sink: S,
    interval: Duration,
}

impl<R, S> RefreshScheduler<R, S>
where
    R: TokenRefresher + 'static,
    S: TokenSink + 'static,
{
    #[must_use]
    pub fn new(refresher: R, sink: S, interval: Duration) -> Self {
        Self {
            refresher,
            sink,
            interval,
        }
    }

    /// Start the loop on the tokio runtime with a fresh cancellation token.
    #[must_use]
    pub fn spawn(self, store: CredentialStore) -> SchedulerHandle {
        self.spawn_with_cancel(store, CancellationToken::new())
    }

    /// Start the loop; cancelling `cancel` (or a parent of it) stops it.
    #[must_use]
    pub fn spawn_with_cancel(
        self,
        store: CredentialStore,
        cancel: CancellationToken,
    ) -> SchedulerHandle {
        let task = tokio::spawn(self.run(store, cancel.clone()));
        SchedulerHandle { cancel, task }
    }

    /// Drive the loop on the current task until cancelled or a tick fails.
    ///
    /// The first tick fires one full interval after the call.
    pub async fn run(self, mut store: CredentialStore, cancel: CancellationToken) -> SchedulerExit {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            url = %store.identity().endpoint,
            "token refresh scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("token refresh scheduler cancelled");
                    return SchedulerExit::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick(&mut store).await {
                tracing::error!(
                    url = %store.identity().endpoint,
                    error = %e,
                    "token refresh failed; scheduler stopped"
                );
                return SchedulerExit::Failed(e);
            }
        }
    }

    async fn tick(&self, store: &mut CredentialStore) -> Result<(), AuthError> {
        let next = self.refresher.refresh(store.current_refresh_token()).await?;
        store.replace_state(next);
        self.sink.persist(store.current_access_token())?;
        tracing::info!(
            expires_in = store.token_state().expires_in,
            "access token refreshed"
        );
        Ok(())
    }
}

/// Handle to a running scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<SchedulerExit>,
}

impl SchedulerHandle {
    /// Token observed by the scheduler; cancelling it stops the loop.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end on its own.
    ///
    /// Cancel-safe: dropping the future leaves the task running. Do not
    /// call again after it has returned.
    pub async fn wait(&mut self) -> SchedulerExit {
        join_exit((&mut self.task).await)
    }

    /// Cancel the task and wait for it to finish.
    pub async fn stop(self) -> SchedulerExit {
        self.cancel.cancel();
        join_exit(self.task.await)
    }
}

fn join_exit(joined: Result<SchedulerExit, tokio::task::JoinError>) -> SchedulerExit {
    joined.unwrap_or_else(|e| SchedulerExit::Aborted(e.to_string()))
}
