use anyhow::{Context, Result};
use tokio::signal;

/// Resolve on the first Ctrl+C or SIGTERM, returning the signal's name.
///
/// # Errors
/// Returns an error if a signal handler cannot be installed.
pub async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::select! {
        name = interrupt() => name,
        name = terminate() => name,
    }
}

async fn interrupt() -> Result<&'static str> {
    signal::ctrl_c()
        .await
        .context("failed to listen for SIGINT")?;
    Ok("SIGINT")
}

#[cfg(unix)]
async fn terminate() -> Result<&'static str> {
    use signal::unix::{SignalKind, signal as unix_signal};

    unix_signal(SignalKind::terminate())
        .context("failed to install SIGTERM handler")?
        .recv()
        .await;
    Ok("SIGTERM")
}

#[cfg(not(unix))]
async fn terminate() -> Result<&'static str> {
    std::future::pending().await
}
