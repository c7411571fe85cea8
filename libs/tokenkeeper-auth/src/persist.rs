use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokenkeeper_utils::SecretString;

use crate::error::AuthError;
use crate::scheduler::TokenSink;

pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Publishes the current access token to a file for other processes.
///
/// The file holds the raw token bytes only. Each write goes to a temporary
/// file next to the target which is then renamed over it, so readers see
/// either the previous token or the new one. The parent directory must be
/// writable, and a symlink at the target path is replaced, not followed.
#[derive(Debug, Clone)]
pub struct TokenPersister {
    path: PathBuf,
    mode: u32,
}

impl TokenPersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// Permission bits applied to the token file (Unix only).
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the token file with `access_token`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Io`] if the temporary file cannot be created,
    /// written, or renamed into place. Nothing is retried.
    pub fn persist(&self, access_token: &SecretString) -> Result<(), AuthError> {
        let io_err = |source| AuthError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".tokenkeeper-")
            .tempfile_in(dir)
            .map_err(io_err)?;
        tmp.write_all(access_token.expose().as_bytes())
            .map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        self.apply_mode(tmp.as_file()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        tracing::debug!(path = %self.path.display(), "token file updated");
        Ok(())
    }

    #[cfg(unix)]
    fn apply_mode(&self, file: &fs::File) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(self.mode))
    }

    #[cfg(not(unix))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn apply_mode(&self, _file: &fs::File) -> std::io::Result<()> {
        Ok(())
    }
}

impl TokenSink for TokenPersister {
    fn persist(&self, access_token: &SecretString) -> Result<(), AuthError> {
        TokenPersister::persist(self, access_token)
    }
}
