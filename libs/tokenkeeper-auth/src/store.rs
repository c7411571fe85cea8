use std::sync::Arc;

use tokenkeeper_utils::SecretString;

use crate::identity::Identity;
use crate::token::TokenState;

/// Owned holder of the identity and the live token state.
///
/// There is no "empty" store: one can only be built from a `TokenState`
/// obtained by a successful exchange, so anything that consumes a store
/// (the refresh scheduler) cannot run before initial authentication.
#[derive(Debug)]
pub struct CredentialStore {
    identity: Arc<Identity>,
    state: TokenState,
}

impl CredentialStore {
    #[must_use]
    pub fn new(identity: Arc<Identity>, state: TokenState) -> Self {
        Self { identity, state }
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    #[must_use]
    pub fn token_state(&self) -> &TokenState {
        &self.state
    }

    #[must_use]
    pub fn current_access_token(&self) -> &SecretString {
        &self.state.access_token
    }

    #[must_use]
    pub fn current_refresh_token(&self) -> &SecretString {
        &self.state.refresh_token
    }

    /// Swap in the result of a newer exchange, returning the old state.
    pub fn replace_state(&mut self, new_state: TokenState) -> TokenState {
        std::mem::replace(&mut self.state, new_state)
    }
}
