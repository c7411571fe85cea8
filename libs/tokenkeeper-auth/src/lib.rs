#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! OAuth2 bearer token keeper.
//!
//! Obtains a token pair with the password grant, keeps it fresh with the
//! refresh grant on a fixed interval, and publishes the current access token
//! to a file for other processes to read.
//!
//! ```ignore
//! use tokenkeeper_auth::{KeeperConfig, TokenKeeper};
//! use tokio_util::sync::CancellationToken;
//!
//! let keeper = TokenKeeper::from_config(&config)?;
//! let handle = keeper.start(CancellationToken::new()).await?;
//!
//! // On shutdown:
//! let exit = handle.stop().await;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod keeper;
pub mod persist;
pub mod scheduler;
pub mod store;
pub mod token;
pub mod transport;

pub use client::AuthClient;
pub use config::KeeperConfig;
pub use error::{AuthError, ServerDeclined};
pub use identity::Identity;
pub use keeper::TokenKeeper;
pub use persist::TokenPersister;
pub use scheduler::{
    RefreshScheduler, SchedulerExit, SchedulerHandle, TokenRefresher, TokenSink,
};
pub use store::CredentialStore;
pub use token::TokenState;
pub use transport::TransportOptions;
pub use tokenkeeper_utils::SecretString;
